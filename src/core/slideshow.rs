//! Slideshow controller - owns the photo list and drives one tick at a time.
//!
//! Per tick:
//! 1. Prefetch the next few slides (hits are touched, so they outlive old ones)
//! 2. Advance the timeline
//! 3. Resolve the current slide, and the next one inside the transition window
//! 4. Ease those slides toward their targets; turn off every other slide
//! 5. Return a `FrameView` for the renderer
//!
//! Commands (`apply`) edit the photo on screen, move the timeline or drive the
//! email prompt. Store writes that fail are logged and the in-memory edit
//! stays.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use log::{debug, info, trace, warn};
use serde::Serialize;

use super::clock::Clock;
use super::reconciler::insert_live_photo;
use super::slide_cache::{CacheStats, SlideCache};
use super::timeline::{Timeline, photo_at, rating_requires_skip};
use crate::config::{ConfigError, EmailIdentity, Settings};
use crate::email::EmailSender;
use crate::entities::{CacheEntry, Photo, PhotoId, VisualState};
use crate::input::{Command, EmailKey};
use crate::library::{self, LabelRules, LibraryError};
use crate::store::{PhotoStore, StoreError};

/// Most addresses offered by the email prompt.
pub const MAX_SUGGESTED_EMAILS: usize = 8;

/// Slides listed either side of the current one in the debug overlay.
const DEBUG_SPAN: i64 = 5;

/// One completion offered by the email prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub address: String,
    /// This photo already went to this address.
    pub already_sent: bool,
}

/// Email prompt state. `address` holds comma-separated recipients as typed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmailPrompt {
    pub address: String,
    pub suggestions: Vec<Suggestion>,
    /// Last submit failed.
    pub error: bool,
}

impl EmailPrompt {
    /// The recipient being typed (after the last comma), trimmed.
    pub fn last_component(&self) -> &str {
        self.address.rsplit(',').next().unwrap_or_default().trim()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.address
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    /// Replace the recipient being typed with `address`.
    fn complete(&mut self, address: &str) {
        match self.address.rfind(',') {
            None => self.address = format!("{}, ", address),
            Some(i) => {
                self.address.truncate(i + 1);
                self.address.push(' ');
                self.address.push_str(address);
                self.address.push_str(", ");
            }
        }
        self.error = false;
    }
}

/// One visible slide.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideView {
    pub photo_id: PhotoId,
    pub index: i64,
    pub label: String,
    pub display_date: String,
    pub rating: u8,
    /// Seconds into the slide (negative while fading in).
    pub offset: f64,
    pub labels_visible: bool,
    pub visual: VisualState,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameView {
    pub index: i64,
    pub time: f64,
    pub current: Option<SlideView>,
    pub next: Option<SlideView>,
    pub paused: bool,
    pub prompt: Option<EmailPrompt>,
    pub show_debug: bool,
    pub show_aux_panel: bool,
    /// Debug overlay lines (empty unless `show_debug`).
    pub debug: Vec<String>,
}

/// Photo on screen, for status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoStatus {
    pub id: PhotoId,
    pub label: String,
    pub display_date: String,
    pub rating: u8,
    pub rotation: i32,
    pub pathname: String,
}

/// Snapshot answered to `GET /api/status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusReport {
    pub index: i64,
    pub photo_count: usize,
    pub photo: Option<PhotoStatus>,
    pub paused: bool,
    pub prompting: bool,
    pub show_debug: bool,
    pub show_aux_panel: bool,
    pub ingesting: bool,
    pub cache_len: usize,
    pub cache_capacity: usize,
    pub pending: usize,
    pub decodes: u64,
    pub cache: CacheStats,
}

/// The slideshow controller. Lives on the control thread.
pub struct Slideshow {
    photos: Vec<Photo>,
    timeline: Timeline,
    cache: SlideCache,
    store: Box<dyn PhotoStore>,
    email: Box<dyn EmailSender>,
    email_from: Option<EmailIdentity>,
    clock: Rc<dyn Clock>,
    root: PathBuf,
    rules: LabelRules,
    prefetch: usize,
    show_debug: bool,
    show_aux_panel: bool,
    prompt: EmailPrompt,
}

impl Slideshow {
    pub fn new(
        photos: Vec<Photo>,
        settings: &Settings,
        cache: SlideCache,
        store: Box<dyn PhotoStore>,
        email: Box<dyn EmailSender>,
        clock: Rc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let timeline = Timeline::new(
            settings.slide_duration_s,
            settings.transition_s,
            settings.max_pause_s,
        )?;
        info!(
            "Slideshow: {} photos, cache {}, prefetch {}",
            photos.len(),
            cache.capacity(),
            settings.prefetch_count()
        );

        Ok(Self {
            photos,
            timeline,
            cache,
            store,
            email,
            email_from: settings.email_from.first().cloned(),
            clock,
            root: settings.root_dir.clone(),
            rules: LabelRules::from_settings(settings),
            prefetch: settings.prefetch_count(),
            show_debug: settings.show_debug,
            show_aux_panel: false,
            prompt: EmailPrompt::default(),
        })
    }

    /// Run one tick at clock time `now`.
    pub fn tick(&mut self, now: f64) -> FrameView {
        self.prefetch();
        self.timeline.update(now);

        let index = self.timeline.current_index();
        let current = self.move_slide(index, self.timeline.time_offset());
        let next = if self.timeline.next_visible() {
            self.move_slide(index.saturating_add(1), self.timeline.next_offset())
        } else {
            None
        };

        // Anything not drawn this tick snaps into place when it comes back
        let shown: Vec<PhotoId> = current.iter().chain(next.iter()).map(|s| s.photo_id).collect();
        for slide in self.cache.slides_mut() {
            if !shown.contains(&slide.photo_id()) {
                slide.turn_off();
            }
        }

        FrameView {
            index,
            time: self.timeline.time(),
            current,
            next,
            paused: self.timeline.is_paused(),
            prompt: self.timeline.is_prompting().then(|| self.prompt.clone()),
            show_debug: self.show_debug,
            show_aux_panel: self.show_aux_panel,
            debug: if self.show_debug { self.debug_lines() } else { Vec::new() },
        }
    }

    /// Request the upcoming slides.
    fn prefetch(&mut self) {
        let index = self.timeline.current_index();
        for i in 0..self.prefetch as i64 {
            if let Some(photo) = photo_at(&self.photos, index.saturating_add(i)) {
                // get() touches hits
                self.cache.get(photo, true);
            }
        }
    }

    /// Ease the slide at virtual `index` toward its targets.
    fn move_slide(&mut self, index: i64, offset: f64) -> Option<SlideView> {
        let photo = photo_at(&self.photos, index)?;
        self.cache.get(photo, true)?;

        let slide = self.cache.slide_mut(photo.id)?;
        let zoom = slide.ensure_zoom_direction(index);
        slide.advance(self.timeline.targets(offset, photo.rotation as f32, zoom));

        Some(SlideView {
            photo_id: photo.id,
            index,
            label: photo.label.clone(),
            display_date: photo.display_date.clone(),
            rating: photo.rating,
            offset,
            labels_visible: self.timeline.labels_visible(offset),
            visual: slide.visual(),
        })
    }

    /// Handle a key press. While the email prompt is open keys are typing.
    ///
    /// Returns the command the key mapped to, if any.
    pub fn handle_key(&mut self, key: char) -> Option<Command> {
        let command = if self.timeline.is_prompting() {
            EmailKey::from_char(key).map(Command::EmailKey)
        } else {
            Command::from_key(key)
        };

        match command {
            Some(command) => self.apply(command),
            None => trace!("Unmapped key {:?}", key),
        }
        command
    }

    pub fn apply(&mut self, command: Command) {
        debug!("Command: {:?}", command);
        match command {
            Command::TogglePause => self.timeline.toggle_pause(self.clock.now()),
            Command::Rate(rating) => self.rate(rating),
            Command::Rotate(degrees) => self.rotate(degrees),
            Command::Jump(k) => self.timeline.jump_relative(k),
            Command::PromptEmail => self.prompt_email(),
            Command::ToggleDebug => self.show_debug = !self.show_debug,
            Command::ToggleAuxPanel => self.show_aux_panel = !self.show_aux_panel,
            Command::EmailKey(key) => self.email_key(key),
            // The runner owns the poller and the loop
            Command::ToggleIngest | Command::Quit => {}
        }
    }

    /// Position in `photos` of the slide on screen.
    fn current_position(&self) -> Option<usize> {
        if self.photos.is_empty() {
            return None;
        }
        Some(self.timeline.current_index().rem_euclid(self.photos.len() as i64) as usize)
    }

    /// Like `current_position`, but only if its slide is loaded.
    fn current_loaded(&self) -> Option<usize> {
        let position = self.current_position()?;
        let id = self.photos[position].id;
        self.cache.entry(id).and_then(CacheEntry::slide).map(|_| position)
    }

    fn rate(&mut self, rating: u8) {
        if !(1..=5).contains(&rating) {
            warn!("Ignoring rating {}", rating);
            return;
        }
        let Some(position) = self.current_loaded() else {
            debug!("No slide on screen to rate");
            return;
        };

        let photo = &mut self.photos[position];
        photo.rating = rating;
        info!("Rated {} as {}", photo.file_name(), rating);
        if let Err(e) = self.store.save_photo(photo) {
            warn!("Failed to save rating for {}: {}", photo.id, e);
        }

        if rating_requires_skip(rating) {
            self.timeline.jump_relative(1);
        }
    }

    fn rotate(&mut self, degrees: i32) {
        if let Some(position) = self.current_loaded() {
            let photo = &mut self.photos[position];
            photo.rotation = (photo.rotation.rem_euclid(360) + degrees.rem_euclid(360)) % 360;
            info!("Rotated {} to {}", photo.file_name(), photo.rotation);
            if let Err(e) = self.store.save_photo(photo) {
                warn!("Failed to save rotation for {}: {}", photo.id, e);
            }

            let (id, rotation) = (photo.id, photo.rotation);
            let screen = self.cache.screen();
            if let Some(slide) = self.cache.slide_mut(id) {
                slide.compute_ideal_size(rotation, screen);
            }
        }
        // Restart the slide so the new orientation gets a full showing
        self.timeline.jump_relative(0);
    }

    fn prompt_email(&mut self) {
        if self.photos.is_empty() {
            return;
        }
        info!("Email prompt open");
        self.timeline.prompt();
        self.prompt = EmailPrompt::default();
        self.update_suggestions();
    }

    fn close_prompt(&mut self) {
        self.timeline.end_prompt();
        self.prompt = EmailPrompt::default();
    }

    fn email_key(&mut self, key: EmailKey) {
        if !self.timeline.is_prompting() {
            debug!("Email key {:?} with no prompt open", key);
            return;
        }

        match key {
            EmailKey::Escape => self.close_prompt(),
            EmailKey::Backspace => {
                if self.prompt.address.pop().is_some() {
                    self.update_suggestions();
                }
            }
            EmailKey::Tab => {
                if self.prompt.suggestions.len() == 1 {
                    self.complete_email(0);
                }
            }
            EmailKey::Suggestion(index) => self.complete_email(index),
            EmailKey::Enter => self.submit_email(),
            EmailKey::Char(c) => {
                self.prompt.address.push(c);
                self.update_suggestions();
            }
        }
    }

    fn update_suggestions(&mut self) {
        let Some(position) = self.current_position() else {
            return;
        };
        let photo_id = self.photos[position].id;
        let prefix = self.prompt.last_component();

        let addresses = match self.store.emails_with_prefix(prefix, MAX_SUGGESTED_EMAILS) {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!("Failed to look up email suggestions: {}", e);
                Vec::new()
            }
        };

        let suggestions = addresses
            .into_iter()
            .map(|address| {
                let already_sent = self
                    .store
                    .has_been_emailed_by(photo_id, &address)
                    .unwrap_or_else(|e| {
                        warn!("Failed to look up email history: {}", e);
                        false
                    });
                Suggestion {
                    address,
                    already_sent,
                }
            })
            .collect();
        self.prompt.suggestions = suggestions;
    }

    fn complete_email(&mut self, index: usize) {
        let Some(address) = self.prompt.suggestions.get(index).map(|s| s.address.clone()) else {
            return;
        };
        self.prompt.complete(&address);
        self.update_suggestions();
    }

    fn submit_email(&mut self) {
        let recipients = self.prompt.recipients();
        if recipients.is_empty() {
            self.close_prompt();
            return;
        }

        match self.send_email(&recipients) {
            Ok(()) => self.close_prompt(),
            Err(e) => {
                warn!("Emailing to {:?} failed: {:#}", recipients, e);
                self.prompt.error = true;
            }
        }
    }

    fn send_email(&self, recipients: &[String]) -> anyhow::Result<()> {
        let position = self.current_position().context("No photo on screen")?;
        let photo = &self.photos[position];
        let from = self.email_from.as_ref().context("No sender address configured")?;

        let title = [photo.label.as_str(), photo.display_date.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        info!("Emailing {} to {:?}", photo.absolute_path.display(), recipients);
        self.email.send(from, &title, &photo.absolute_path, recipients)?;

        for address in recipients {
            if let Err(e) = self.store.email_sent(photo.id, address) {
                warn!("Failed to record email to {}: {}", address, e);
            }
        }
        Ok(())
    }

    /// Add a newly arrived file (relative to the photo root) right after the
    /// slide on screen. Returns its position, or `None` if already showing.
    pub fn ingest(&mut self, pathname: &str) -> Result<Option<usize>, LibraryError> {
        let id = library::register_file(self.store.as_ref(), &self.root, &self.rules, pathname)?;
        let Some(mut photo) = self.store.photo_by_id(id)? else {
            return Err(StoreError::NotFound(id).into());
        };
        photo.pathname = PathBuf::from(pathname);
        photo.absolute_path = self.root.join(pathname);

        let position = insert_live_photo(&mut self.photos, &mut self.timeline, photo);
        if position.is_some() {
            // Start decoding before it comes up
            let next = self.timeline.current_index().saturating_add(1);
            if let Some(photo) = photo_at(&self.photos, next) {
                self.cache.get(photo, true);
            }
        }
        Ok(position)
    }

    fn debug_lines(&self) -> Vec<String> {
        let current = self.timeline.current_index();
        let mut lines = Vec::new();
        for index in current.saturating_sub(DEBUG_SPAN)..current.saturating_add(DEBUG_SPAN) {
            let Some(photo) = photo_at(&self.photos, index) else {
                continue;
            };
            let state = match self.cache.entry(photo.id) {
                Some(CacheEntry::Loaded(slide)) => format!(
                    "loaded #{} in {:.0} ms",
                    slide.sequence(),
                    slide.load_time().as_secs_f64() * 1000.0
                ),
                Some(CacheEntry::Broken) => "broken".to_string(),
                Some(CacheEntry::Pending) => "pending".to_string(),
                None => "-".to_string(),
            };
            let marker = if index == current { " (current)" } else { "" };
            lines.push(format!("{}: {} {}{}", index, photo.file_name(), state, marker));
        }

        let stats = self.cache.stats();
        lines.push(format!(
            "cache {}/{}, pending {}, hit rate {:.0}%, evictions {}, broken {}",
            self.cache.len(),
            self.cache.capacity(),
            self.cache.pending_count(),
            stats.hit_rate() * 100.0,
            stats.evictions,
            stats.broken
        ));
        lines
    }

    pub fn status(&self) -> StatusReport {
        let photo = self.current_position().map(|position| {
            let photo = &self.photos[position];
            PhotoStatus {
                id: photo.id,
                label: photo.label.clone(),
                display_date: photo.display_date.clone(),
                rating: photo.rating,
                rotation: photo.rotation,
                pathname: photo.pathname.to_string_lossy().into_owned(),
            }
        });

        StatusReport {
            index: self.timeline.current_index(),
            photo_count: self.photos.len(),
            photo,
            paused: self.timeline.is_paused(),
            prompting: self.timeline.is_prompting(),
            show_debug: self.show_debug,
            show_aux_panel: self.show_aux_panel,
            ingesting: false,
            cache_len: self.cache.len(),
            cache_capacity: self.cache.capacity(),
            pending: self.cache.pending_count(),
            decodes: self.cache.load_sequence(),
            cache: self.cache.stats(),
        }
    }

    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn cache(&self) -> &SlideCache {
        &self.cache
    }

    pub fn store(&self) -> &dyn PhotoStore {
        self.store.as_ref()
    }

    pub fn prompt(&self) -> &EmailPrompt {
        &self.prompt
    }

    /// Stop the decode thread.
    pub fn shutdown(&mut self) {
        self.cache.shutdown();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;
    use std::rc::Rc;

    use super::Slideshow;
    use crate::config::{EmailIdentity, Settings};
    use crate::core::clock::ManualClock;
    use crate::core::loader::LoadWorker;
    use crate::core::loader::testing::ScriptedDecoder;
    use crate::core::slide_cache::SlideCache;
    use crate::email::LogEmailSender;
    use crate::entities::NewPhoto;
    use crate::store::{PhotoStore, SqlitePhotoStore};

    pub fn sender() -> EmailIdentity {
        EmailIdentity {
            name: "Frame".to_string(),
            address: "frame@example.com".to_string(),
        }
    }

    /// Show over `count` in-memory photos with scripted decoding, cache of 4.
    pub fn show_with(count: usize, settings: &Settings) -> (Slideshow, ManualClock) {
        let store = SqlitePhotoStore::open_in_memory().unwrap();
        let mut photos = Vec::new();
        for i in 0..count {
            let id = store
                .create_photo(&NewPhoto {
                    hash_back: format!("hash{}", i),
                    rotation: 0,
                    rating: 3,
                    date: 0,
                    display_date: "May 1, 2020".to_string(),
                    label: format!("Photo {}", i),
                })
                .unwrap();
            let mut photo = store.photo_by_id(id).unwrap().unwrap();
            photo.pathname = PathBuf::from(format!("p{}.jpg", i));
            photo.absolute_path = PathBuf::from(format!("/photos/p{}.jpg", i));
            photos.push(photo);
        }

        let clock = ManualClock::new(1.0);
        let loader = LoadWorker::spawn(ScriptedDecoder::default()).unwrap();
        let cache = SlideCache::new(4, (1920, 1080), loader, Rc::new(clock.clone())).unwrap();
        let show = Slideshow::new(
            photos,
            settings,
            cache,
            Box::new(store),
            Box::new(LogEmailSender),
            Rc::new(clock.clone()),
        )
        .unwrap();
        (show, clock)
    }
}
