//! Timeline - maps elapsed wall-clock time to the photo on screen
//!
//! **Why**: the appliance runs for weeks. Deriving "what to show" from one
//! time accumulator (instead of a slide counter plus timers) keeps every
//! transition, pause and jump consistent with a single number.
//!
//! **Used by**: Slideshow (tick, commands), InsertionReconciler (time shift)
//!
//! # Timing Model
//!
//! - Each slide owns `D` seconds of the timeline; slide `i` covers
//!   `[i*D, (i+1)*D)`.
//! - The last `T` seconds of a slide overlap the first `T` of the next one,
//!   during which they cross-fade.
//! - `time` only advances while Playing. The virtual index is unbounded; it
//!   wraps onto the photo list with Euclidean modulo.
//!
//! # States
//!
//! - **Playing**: time advances.
//! - **Paused**: time frozen; auto-resumes after `max_pause` seconds.
//! - **Prompting**: paused for the email prompt; never auto-resumes.

use log::{debug, info};

use crate::config::ConfigError;
use crate::entities::slide::ZoomDirection;
use crate::entities::Targets;

/// Seconds each slide is on screen (including one transition).
pub const DEFAULT_SLIDE_DURATION: f64 = 14.0;
/// Seconds of cross-fade between consecutive slides.
pub const DEFAULT_TRANSITION: f64 = 2.0;
/// Seconds after which a plain pause resumes by itself.
pub const DEFAULT_MAX_PAUSE: f64 = 300.0;

/// Alpha of the current slide while the email prompt is up.
pub const PROMPT_ALPHA: f32 = 0.2;

/// Fraction of a slide below a boundary still counted as on it. Absorbs
/// float rounding of `index * D` when D is not a whole number of seconds.
const BOUNDARY_SLACK: f64 = 1e-9;

/// Playback state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackState {
    Playing,
    /// Paused by the user at clock time `since`.
    Paused { since: f64 },
    /// Paused while the email prompt is open.
    Prompting,
}

/// Time accumulator + playback state.
#[derive(Debug, Clone)]
pub struct Timeline {
    slide_duration: f64,
    transition: f64,
    max_pause: f64,
    time: f64,
    previous_tick: Option<f64>,
    state: PlaybackState,
}

impl Timeline {
    /// Create timeline; requires `0 < transition < slide_duration`.
    pub fn new(slide_duration: f64, transition: f64, max_pause: f64) -> Result<Self, ConfigError> {
        let valid = slide_duration.is_finite()
            && transition.is_finite()
            && transition > 0.0
            && transition < slide_duration;
        if !valid {
            return Err(ConfigError::InvalidTiming {
                slide_duration,
                transition,
            });
        }

        debug!(
            "Timeline: D={}s, T={}s, max pause {}s",
            slide_duration, transition, max_pause
        );

        Ok(Self {
            slide_duration,
            transition,
            max_pause,
            time: 0.0,
            previous_tick: None,
            state: PlaybackState::Playing,
        })
    }

    /// Advance by the time since the previous tick (if playing).
    ///
    /// The first call only records `now`. A pause older than `max_pause`
    /// resumes here, before time is advanced.
    pub fn update(&mut self, now: f64) {
        let delta = match self.previous_tick {
            Some(previous) => (now - previous).max(0.0),
            None => 0.0,
        };
        self.previous_tick = Some(now);

        if let PlaybackState::Paused { since } = self.state {
            if now - since >= self.max_pause {
                info!("Pause expired after {:.0}s, resuming", now - since);
                self.state = PlaybackState::Playing;
            }
        }

        if self.state == PlaybackState::Playing {
            self.time += delta;
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn slide_duration(&self) -> f64 {
        self.slide_duration
    }

    pub fn transition(&self) -> f64 {
        self.transition
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// True in both Paused and Prompting.
    pub fn is_paused(&self) -> bool {
        self.state != PlaybackState::Playing
    }

    pub fn is_prompting(&self) -> bool {
        self.state == PlaybackState::Prompting
    }

    /// Virtual index of the slide currently on screen.
    pub fn current_index(&self) -> i64 {
        (self.time / self.slide_duration + BOUNDARY_SLACK).floor() as i64
    }

    /// Seconds into the current slide, in `[0, D)`.
    pub fn time_offset(&self) -> f64 {
        (self.time - self.current_index() as f64 * self.slide_duration).max(0.0)
    }

    /// Start time of the slide at virtual `index` (never before 0).
    pub fn start_of(&self, index: i64) -> f64 {
        (index as f64 * self.slide_duration).max(0.0)
    }

    /// Whether the next slide has started fading in.
    pub fn next_visible(&self) -> bool {
        self.time_offset() >= self.slide_duration - self.transition
    }

    /// Offset of the next slide (negative while it fades in).
    pub fn next_offset(&self) -> f64 {
        self.time_offset() - self.slide_duration
    }

    /// Whether labels belong on screen for a slide at `offset`.
    pub fn labels_visible(&self, offset: f64) -> bool {
        if self.is_paused() {
            offset >= 0.0
        } else {
            offset >= 0.0 && offset < self.slide_duration - self.transition
        }
    }

    /// Playing alpha for a slide at `offset`.
    pub fn alpha_at(&self, offset: f64) -> f32 {
        let (d, t) = (self.slide_duration, self.transition);
        let alpha = if offset < 0.0 {
            (offset + t) / t
        } else if offset < d - t {
            1.0
        } else {
            (d - offset) / t
        };
        alpha.clamp(0.0, 1.0) as f32
    }

    /// Where a slide at `offset` should be heading this tick.
    pub fn targets(&self, offset: f64, rotation: f32, zoom: ZoomDirection) -> Targets {
        match self.state {
            PlaybackState::Playing => Targets {
                rotation,
                zoom: zoom.zoom_at((offset / self.slide_duration) as f32),
                alpha: self.alpha_at(offset),
            },
            PlaybackState::Paused { .. } | PlaybackState::Prompting => {
                let shown = if self.is_prompting() { PROMPT_ALPHA } else { 1.0 };
                Targets {
                    rotation,
                    zoom: 1.0,
                    alpha: if offset >= 0.0 { shown } else { 0.0 },
                }
            }
        }
    }

    /// Pause or resume. Ignored while prompting.
    pub fn toggle_pause(&mut self, now: f64) {
        self.state = match self.state {
            PlaybackState::Playing => {
                info!("Paused");
                PlaybackState::Paused { since: now }
            }
            PlaybackState::Paused { .. } => {
                info!("Resumed");
                PlaybackState::Playing
            }
            PlaybackState::Prompting => PlaybackState::Prompting,
        };
    }

    pub fn prompt(&mut self) {
        self.state = PlaybackState::Prompting;
    }

    /// Leave the prompt and resume playing.
    pub fn end_prompt(&mut self) {
        if self.state == PlaybackState::Prompting {
            self.state = PlaybackState::Playing;
        }
    }

    /// Move to the start of the slide `k` positions away (0 = restart this one).
    pub fn jump_relative(&mut self, k: i64) {
        self.time = self.start_of(self.current_index().saturating_add(k));
        debug!("Jump {:+} -> index {}", k, self.current_index());
    }
}

/// Ratings that take the photo off screen right away.
pub fn rating_requires_skip(rating: u8) -> bool {
    matches!(rating, 1 | 2)
}

/// Item at virtual `index`, wrapping with Euclidean modulo.
pub fn photo_at<T>(items: &[T], index: i64) -> Option<&T> {
    if items.is_empty() {
        return None;
    }
    let wrapped = index.rem_euclid(items.len() as i64) as usize;
    items.get(wrapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline() -> Timeline {
        Timeline::new(14.0, 2.0, 300.0).unwrap()
    }

    #[test]
    fn test_timing_validated() {
        assert!(Timeline::new(14.0, 0.0, 300.0).is_err());
        assert!(Timeline::new(14.0, 14.0, 300.0).is_err());
        assert!(Timeline::new(2.0, 3.0, 300.0).is_err());
        assert!(Timeline::new(f64::NAN, 1.0, 300.0).is_err());
        assert!(Timeline::new(3.0, 2.0, 300.0).is_ok());
    }

    #[test]
    fn test_first_update_adds_nothing() {
        let mut tl = timeline();
        tl.update(100.0);
        assert_eq!(tl.time(), 0.0);
        tl.update(101.5);
        assert_eq!(tl.time(), 1.5);
    }

    #[test]
    fn test_index_and_offset() {
        let mut tl = timeline();
        for (time, index) in [(0.0, 0), (13.99, 0), (14.0, 1), (100.0, 7)] {
            tl.set_time(time);
            assert_eq!(tl.current_index(), index);
        }
        tl.set_time(100.0);
        assert!((tl.time_offset() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_photo_at_wraps() {
        let photos = ["a", "b", "c"];
        assert_eq!(photo_at(&photos, 7), Some(&"b"));
        assert_eq!(photo_at(&photos, -1), Some(&"c"));
        assert_eq!(photo_at::<&str>(&[], 3), None);
    }

    #[test]
    fn test_transition_window() {
        let mut tl = timeline();
        tl.set_time(12.5);
        assert!(tl.next_visible());
        assert!((tl.alpha_at(tl.time_offset()) - 0.75).abs() < 1e-6);
        assert!((tl.next_offset() + 1.5).abs() < 1e-9);
        assert!((tl.alpha_at(tl.next_offset()) - 0.25).abs() < 1e-6);

        tl.set_time(11.9);
        assert!(!tl.next_visible());
        assert_eq!(tl.alpha_at(tl.time_offset()), 1.0);
        assert_eq!(tl.alpha_at(-5.0), 0.0);
    }

    #[test]
    fn test_paused_time_frozen() {
        let mut tl = timeline();
        tl.update(0.0);
        tl.update(5.0);
        tl.toggle_pause(5.0);
        tl.update(60.0);
        assert_eq!(tl.time(), 5.0);
        assert!(tl.is_paused());

        tl.toggle_pause(60.0);
        tl.update(61.0);
        assert_eq!(tl.time(), 6.0);
    }

    #[test]
    fn test_pause_expires() {
        let mut tl = timeline();
        tl.update(0.0);
        tl.toggle_pause(0.0);
        tl.update(299.0);
        assert!(tl.is_paused());
        tl.update(300.0);
        assert_eq!(tl.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_prompt_never_expires() {
        let mut tl = timeline();
        tl.update(0.0);
        tl.prompt();
        tl.update(10_000.0);
        assert!(tl.is_prompting());
        tl.toggle_pause(10_000.0);
        assert!(tl.is_prompting());
        tl.end_prompt();
        assert_eq!(tl.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_paused_targets() {
        let mut tl = timeline();
        tl.toggle_pause(0.0);
        let t = tl.targets(3.0, 90.0, ZoomDirection::In);
        assert_eq!((t.zoom, t.alpha, t.rotation), (1.0, 1.0, 90.0));
        assert_eq!(tl.targets(-1.0, 0.0, ZoomDirection::In).alpha, 0.0);

        tl.prompt();
        assert_eq!(tl.targets(3.0, 0.0, ZoomDirection::Out).alpha, PROMPT_ALPHA);
    }

    #[test]
    fn test_playing_zoom_targets() {
        let tl = timeline();
        let start = tl.targets(0.0, 0.0, ZoomDirection::In);
        assert!((start.zoom - 0.9).abs() < 1e-6);
        let end = tl.targets(14.0, 0.0, ZoomDirection::Out);
        assert!((end.zoom - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_jump_relative() {
        let mut tl = timeline();
        tl.set_time(30.0); // index 2, offset 2
        tl.jump_relative(1);
        assert_eq!(tl.time(), 42.0);
        tl.jump_relative(-1);
        assert_eq!(tl.time(), 28.0);
        tl.set_time(33.0);
        tl.jump_relative(0);
        assert_eq!(tl.time(), 28.0);

        tl.set_time(5.0);
        tl.jump_relative(-3);
        assert_eq!(tl.time(), 0.0);
    }

    #[test]
    fn test_jump_fractional_duration() {
        let mut tl = Timeline::new(3.3, 1.0, 300.0).unwrap();
        for expected in 1..=50 {
            tl.jump_relative(1);
            assert_eq!(tl.current_index(), expected);
            assert!(tl.time_offset() < 1e-6);
        }
        for expected in (0..50).rev() {
            tl.jump_relative(-1);
            assert_eq!(tl.current_index(), expected);
        }
    }

    #[test]
    fn test_boundary_counts_as_next_slide() {
        let mut tl = Timeline::new(3.3, 1.0, 300.0).unwrap();
        for index in 0..400 {
            tl.set_time(index as f64 * 3.3);
            assert_eq!(tl.current_index(), index);
            assert!(tl.time_offset() >= 0.0);
        }
    }

    #[test]
    fn test_jump_far_saturates() {
        let mut tl = timeline();
        tl.jump_relative(i64::MAX);
        tl.jump_relative(1);
        assert!(tl.current_index() > 0);
        tl.jump_relative(i64::MIN);
        assert_eq!(tl.time(), 0.0);
    }

    #[test]
    fn test_rating_skip() {
        assert!(rating_requires_skip(1));
        assert!(rating_requires_skip(2));
        for rating in 3..=5 {
            assert!(!rating_requires_skip(rating));
        }
    }

    #[test]
    fn test_labels_visible() {
        let tl = timeline();
        assert!(tl.labels_visible(5.0));
        assert!(!tl.labels_visible(12.5));
        assert!(!tl.labels_visible(-1.0));
    }
}
