//! Slide - a decoded photo plus its on-screen animation state
//!
//! A slide is created once per successful decode and stays bound to the same
//! photo for its whole life. The cache owns it; the timeline only computes the
//! targets it should ease toward.
//!
//! # Animation model
//!
//! Every visual quantity (rotation, size, zoom, alpha) moves toward its target
//! by a fixed fraction per tick. The first `advance()` after the slide is
//! (re)configured jumps straight to the target so the first drawn frame isn't
//! misplaced. Alpha always eases, so a fresh slide still fades in.

use std::time::Duration;

use super::loader::DecodedImage;
use super::photo::{Photo, PhotoId};

/// Fraction of the remaining distance covered per tick.
pub const SMOOTHING: f32 = 0.3;

/// Zoom factor at the start of a zoom-in (end of a zoom-out).
pub const ZOOM_NEAR: f32 = 0.9;
/// Zoom factor at the end of a zoom-in. Over 1.0 clips off a bit of the edge.
pub const ZOOM_FAR: f32 = 1.3;

/// Direction of the slow "Ken Burns" zoom while a slide is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

impl ZoomDirection {
    /// Even virtual indices zoom in, odd ones zoom out.
    pub fn for_index(index: i64) -> Self {
        if index.rem_euclid(2) == 0 {
            ZoomDirection::In
        } else {
            ZoomDirection::Out
        }
    }

    /// Zoom factor at `t` (0 = slide start, 1 = slide end).
    pub fn zoom_at(self, t: f32) -> f32 {
        let t = match self {
            ZoomDirection::In => t,
            ZoomDirection::Out => 1.0 - t,
        };
        interpolate(ZOOM_NEAR, ZOOM_FAR, t)
    }
}

/// Where a slide should be this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Targets {
    pub rotation: f32,
    pub zoom: f32,
    pub alpha: f32,
}

/// What is actually drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VisualState {
    pub rotation: f32,
    pub width: f32,
    pub height: f32,
    pub zoom: f32,
    pub alpha: f32,
}

/// Decoded, displayable photo.
#[derive(Debug, Clone)]
pub struct Slide {
    photo_id: PhotoId,
    image: DecodedImage,
    ideal_width: f32,
    ideal_height: f32,
    zoom: Option<ZoomDirection>,
    visual: VisualState,
    configured: bool,
    load_time: Duration,
    sequence: u64,
}

impl Slide {
    /// Build a slide for `photo`, fitting it to a `screen` of (width, height).
    pub fn new(
        photo: &Photo,
        image: DecodedImage,
        screen: (u32, u32),
        load_time: Duration,
        sequence: u64,
    ) -> Self {
        let mut slide = Self {
            photo_id: photo.id,
            image,
            ideal_width: 0.0,
            ideal_height: 0.0,
            zoom: None,
            visual: VisualState::default(),
            configured: false,
            load_time,
            sequence,
        };
        slide.compute_ideal_size(photo.rotation, screen);
        slide
    }

    pub fn photo_id(&self) -> PhotoId {
        self.photo_id
    }

    pub fn image(&self) -> &DecodedImage {
        &self.image
    }

    pub fn ideal_size(&self) -> (f32, f32) {
        (self.ideal_width, self.ideal_height)
    }

    pub fn visual(&self) -> VisualState {
        self.visual
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn load_time(&self) -> Duration {
        self.load_time
    }

    /// Decode sequence number this slide came from
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn zoom_direction(&self) -> Option<ZoomDirection> {
        self.zoom
    }

    /// Set the zoom direction if it hasn't been set yet. Returns the direction in effect.
    pub fn ensure_zoom_direction(&mut self, index: i64) -> ZoomDirection {
        *self.zoom.get_or_insert_with(|| ZoomDirection::for_index(index))
    }

    /// Largest size that fits the screen for the given rotation.
    ///
    /// The result is in unrotated image space: for a sideways photo the width
    /// ends up covering the screen height.
    pub fn compute_ideal_size(&mut self, rotation: i32, screen: (u32, u32)) {
        let (screen_w, screen_h) = (screen.0 as f32, screen.1 as f32);
        let mut image_w = self.image.width().max(1) as f32;
        let mut image_h = self.image.height().max(1) as f32;

        let sideways = matches!(rotation.rem_euclid(360), 90 | 270);
        if sideways {
            std::mem::swap(&mut image_w, &mut image_h);
        }

        let (mut width, mut height) = if screen_w * image_h > image_w * screen_h {
            // Screen is wider than the photo
            (image_w * screen_h / image_h, screen_h)
        } else {
            (screen_w, image_h * screen_w / image_w)
        };

        if sideways {
            std::mem::swap(&mut width, &mut height);
        }

        self.ideal_width = width;
        self.ideal_height = height;
    }

    /// Ease toward `targets`, snapping everything but alpha on the first call.
    pub fn advance(&mut self, targets: Targets) {
        let step = if self.configured {
            SMOOTHING
        } else {
            self.configured = true;
            1.0
        };

        let v = &mut self.visual;
        v.rotation = interpolate(v.rotation, targets.rotation, step);
        v.width = interpolate(v.width, self.ideal_width, step);
        v.height = interpolate(v.height, self.ideal_height, step);
        v.zoom = interpolate(v.zoom, targets.zoom, step);
        v.alpha = interpolate(v.alpha, targets.alpha, SMOOTHING);
    }

    /// Forget our position so the next `advance()` snaps again.
    pub fn turn_off(&mut self) {
        self.configured = false;
        self.visual.alpha = 0.0;
    }
}

/// A slot in the slide cache.
#[derive(Debug, Clone)]
pub enum CacheEntry {
    Loaded(Slide),
    /// Decoding failed; kept so the photo isn't retried every tick.
    Broken,
    /// Requested, result not yet drained.
    Pending,
}

impl CacheEntry {
    pub fn slide(&self) -> Option<&Slide> {
        match self {
            CacheEntry::Loaded(slide) => Some(slide),
            _ => None,
        }
    }

    pub fn is_broken(&self) -> bool {
        matches!(self, CacheEntry::Broken)
    }
}

/// Value `t` (0 to 1) of the way from `a` to `b`.
pub fn interpolate(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
