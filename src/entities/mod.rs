//! Entities module - plain data types shared by the engine
//!
//! - `photo`: metadata rows (Photo, PhotoFile)
//! - `slide`: decoded photo + animation state, cache entry variants
//! - `loader`: image decoding behind the `ImageDecoder` trait

pub mod loader;
pub mod photo;
pub mod slide;

pub use loader::{DecodeError, DecodedImage, ImageCrateDecoder, ImageDecoder};
pub use photo::{NewPhoto, Photo, PhotoFile, PhotoId};
pub use slide::{CacheEntry, Slide, Targets, VisualState, ZoomDirection};
