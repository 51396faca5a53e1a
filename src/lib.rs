//! frameloop - always-on photo slideshow engine
//!
//! Re-exports all modules for use by the binary target.

// Core engine (worker, loader, cache, timeline, controller)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod email;
pub mod entities;
pub mod ingest;
pub mod input;
pub mod library;
pub mod paths;
pub mod render;
pub mod runner;
pub mod server;
pub mod store;

// Re-export commonly used types from core
pub use core::slide_cache::SlideCache;
pub use core::slideshow::Slideshow;
pub use core::timeline::Timeline;

// Re-export entities
pub use entities::{Photo, PhotoId, Slide};
