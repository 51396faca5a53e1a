//! Frame output.
//!
//! The control loop hands every `FrameView` to a `Renderer`. Drawing is not
//! part of this crate; `LogRenderer` reports what would be on screen through
//! the log, which is enough to run the show headless.

use log::{debug, info, trace};

use crate::core::slideshow::{FrameView, SlideView};
use crate::entities::PhotoId;

pub trait Renderer {
    fn render(&mut self, frame: &FrameView);
}

/// Logs slide changes at info, overlays at debug and every frame at trace.
#[derive(Debug, Default)]
pub struct LogRenderer {
    shown: Option<PhotoId>,
    paused: bool,
    prompt: Option<String>,
    frames: u64,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for LogRenderer {
    fn render(&mut self, frame: &FrameView) {
        self.frames += 1;

        let current = frame.current.as_ref().map(|s| s.photo_id);
        if current != self.shown {
            if let Some(slide) = &frame.current {
                info!("Showing {}", describe(slide));
            }
            self.shown = current;
        }

        if frame.paused != self.paused {
            info!("{}", if frame.paused { "Paused" } else { "Playing" });
            self.paused = frame.paused;
        }

        let prompt = frame.prompt.as_ref().map(|p| p.address.clone());
        if prompt != self.prompt {
            if let Some(p) = &frame.prompt {
                let suggestions: Vec<&str> = p.suggestions.iter().map(|s| s.address.as_str()).collect();
                debug!(
                    "Email to: {}_ {}{:?}",
                    p.address,
                    if p.error { "(error) " } else { "" },
                    suggestions
                );
            }
            self.prompt = prompt;
        }

        if frame.show_debug && self.frames % 100 == 1 {
            for line in &frame.debug {
                debug!("{}", line);
            }
        }

        trace!(
            "Frame {} t={:.2} idx={} current={:?} next={:?}",
            self.frames,
            frame.time,
            frame.index,
            frame.current.as_ref().map(|s| s.visual),
            frame.next.as_ref().map(|s| s.visual)
        );
    }
}

fn describe(slide: &SlideView) -> String {
    let stars = "*".repeat(slide.rating as usize);
    let mut text = format!("{} {}", slide.photo_id, stars);
    for part in [&slide.label, &slide.display_date] {
        if !part.is_empty() {
            text.push_str(", ");
            text.push_str(part);
        }
    }
    text
}
