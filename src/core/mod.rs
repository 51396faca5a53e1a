//! Core engine modules - workers, loader, cache, timeline, controller
//!
//! Everything here runs on the control thread except the worker threads
//! started by `workers`.

pub mod clock;
pub mod loader;
pub mod reconciler;
pub mod slide_cache;
pub mod slideshow;
pub mod timeline;
pub mod workers;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use loader::LoadWorker;
pub use slide_cache::{CacheStats, SlideCache};
pub use slideshow::{FrameView, Slideshow, StatusReport};
pub use timeline::{PlaybackState, Timeline};
pub use workers::Worker;
