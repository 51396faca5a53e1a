//! Slide cache with LRU eviction
//!
//! Structure:
//! - `entries`: HashMap<PhotoId, CacheEntry> holding Loaded or Broken slots
//! - `access`: IndexMap<PhotoId, f64> last-used time per id, in insertion order
//!
//! Eviction removes the entry with the smallest last-used time; ties go to the
//! entry inserted first, so the same call sequence always evicts the same id.
//! Broken entries start at time 0 and are the first to go.
//!
//! Pending state is not stored here. Ids in flight live in the LoadWorker's
//! pending set and are reported as `CacheEntry::Pending` by `entry()`.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, trace};
use serde::Serialize;

use super::clock::Clock;
use super::loader::{LoadResult, LoadWorker};
use crate::config::ConfigError;
use crate::entities::{CacheEntry, Photo, PhotoId, Slide};

/// Smallest usable cache: the current and the next slide.
pub const MIN_CAPACITY: usize = 2;

static PENDING: CacheEntry = CacheEntry::Pending;

/// Cache statistics for the debug overlay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub broken: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

/// Bounded photo id -> slide cache fed by a background LoadWorker.
pub struct SlideCache {
    entries: HashMap<PhotoId, CacheEntry>,
    /// Last-used time per cached id. Only `touch` and inserts write it.
    access: IndexMap<PhotoId, f64>,
    loader: LoadWorker,
    clock: Rc<dyn Clock>,
    capacity: usize,
    screen: (u32, u32),
    stats: CacheStats,
}

impl SlideCache {
    /// Create cache
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries (at least 2)
    /// * `screen` - Display size slides are fitted to
    pub fn new(
        capacity: usize,
        screen: (u32, u32),
        loader: LoadWorker,
        clock: Rc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if capacity < MIN_CAPACITY {
            return Err(ConfigError::CacheTooSmall(capacity));
        }

        debug!(
            "SlideCache created: capacity={}, screen={}x{}",
            capacity, screen.0, screen.1
        );

        Ok(Self {
            entries: HashMap::with_capacity(capacity),
            access: IndexMap::with_capacity(capacity),
            loader,
            clock,
            capacity,
            screen,
            stats: CacheStats::default(),
        })
    }

    /// Look up the slide for `photo`.
    ///
    /// Drains finished decodes first. On a miss with `fetch` set, makes room and
    /// requests a decode; the slide shows up on a later call.
    pub fn get(&mut self, photo: &Photo, fetch: bool) -> Option<&Slide> {
        self.drain();

        match self.entries.get(&photo.id).map(CacheEntry::is_broken) {
            Some(false) => {
                self.stats.hits += 1;
                self.touch(photo.id);
                self.entries.get(&photo.id).and_then(CacheEntry::slide)
            }
            // Known bad: don't retry
            Some(true) => None,
            None => {
                self.stats.misses += 1;
                if fetch && !self.loader.is_pending(photo.id) {
                    self.make_headroom();
                    self.loader.request_load(photo);
                }
                None
            }
        }
    }

    /// Mark `id` as just used. No-op if it isn't cached.
    pub fn touch(&mut self, id: PhotoId) {
        if let Some(last_used) = self.access.get_mut(&id) {
            *last_used = self.clock.now();
        }
    }

    /// Move every finished decode into the cache.
    pub fn drain(&mut self) {
        for result in self.loader.drain_results() {
            self.accept(result);
        }
    }

    /// Entry for `id`, with `Pending` for decodes in flight.
    pub fn entry(&self, id: PhotoId) -> Option<&CacheEntry> {
        match self.entries.get(&id) {
            Some(entry) => Some(entry),
            None if self.loader.is_pending(id) => Some(&PENDING),
            None => None,
        }
    }

    pub fn slide_mut(&mut self, id: PhotoId) -> Option<&mut Slide> {
        match self.entries.get_mut(&id) {
            Some(CacheEntry::Loaded(slide)) => Some(slide),
            _ => None,
        }
    }

    /// All loaded slides, in no particular order.
    pub fn slides_mut(&mut self) -> impl Iterator<Item = &mut Slide> {
        self.entries.values_mut().filter_map(|entry| match entry {
            CacheEntry::Loaded(slide) => Some(slide),
            _ => None,
        })
    }

    pub fn last_used(&self, id: PhotoId) -> Option<f64> {
        self.access.get(&id).copied()
    }

    pub fn contains(&self, id: PhotoId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn screen(&self) -> (u32, u32) {
        self.screen
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn pending_count(&self) -> usize {
        self.loader.pending_count()
    }

    /// Decodes issued so far.
    pub fn load_sequence(&self) -> u64 {
        self.loader.sequence()
    }

    /// Stop the load worker.
    pub fn shutdown(&mut self) {
        self.loader.shutdown();
    }

    fn accept(&mut self, result: LoadResult) {
        let id = result.photo.id;

        // A refresh of a cached id replaces it in place
        if !self.entries.contains_key(&id) {
            self.make_headroom();
        }

        let (entry, last_used) = match result.outcome {
            Ok(image) => {
                let slide = Slide::new(
                    &result.photo,
                    image,
                    self.screen,
                    result.elapsed,
                    result.sequence,
                );
                (CacheEntry::Loaded(slide), self.clock.now())
            }
            Err(_) => {
                self.stats.broken += 1;
                (CacheEntry::Broken, 0.0)
            }
        };

        trace!("Cached {} (broken={})", id, entry.is_broken());
        self.entries.insert(id, entry);
        self.access.insert(id, last_used);
    }

    /// Evict until there is room for one more entry.
    fn make_headroom(&mut self) {
        while self.entries.len() >= self.capacity {
            if !self.evict_lru() {
                break;
            }
        }
    }

    /// Evict the least recently used entry. Returns false if the cache is empty.
    fn evict_lru(&mut self) -> bool {
        // min_by keeps the first of equal elements, i.e. the oldest insertion
        let oldest = self
            .access
            .iter()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(id, _)| *id);

        let Some(id) = oldest else {
            return false;
        };

        self.access.shift_remove(&id);
        self.entries.remove(&id);
        self.stats.evictions += 1;
        debug!("LRU evicted {}", id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::loader::testing::ScriptedDecoder;
    use crate::entities::DecodeError;
    use crate::entities::DecodedImage;
    use crate::entities::photo::test_photo;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    fn cache_with(capacity: usize) -> (SlideCache, ManualClock) {
        let clock = ManualClock::new(10.0);
        let loader = LoadWorker::spawn(ScriptedDecoder::default()).unwrap();
        let cache = SlideCache::new(capacity, (800, 600), loader, Rc::new(clock.clone())).unwrap();
        (cache, clock)
    }

    /// Wait until every request has been decoded and drained.
    fn settle(cache: &mut SlideCache) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while cache.pending_count() > 0 && Instant::now() < deadline {
            cache.drain();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(cache.pending_count(), 0, "decodes did not finish");
    }

    fn load(cache: &mut SlideCache, photo: &Photo) {
        assert!(cache.get(photo, true).is_none());
        settle(cache);
    }

    fn broken_photo(id: i64) -> Photo {
        let mut photo = test_photo(id);
        photo.absolute_path = PathBuf::from(format!("/photos/broken{}.jpg", id));
        photo
    }

    #[test]
    fn test_capacity_validated() {
        let loader = LoadWorker::spawn(ScriptedDecoder::default()).unwrap();
        let err = SlideCache::new(1, (800, 600), loader, Rc::new(ManualClock::new(0.0)));
        assert!(matches!(err, Err(ConfigError::CacheTooSmall(1))));
    }

    #[test]
    fn test_miss_then_hit() {
        let (mut cache, _clock) = cache_with(4);
        let photo = test_photo(1);

        assert!(cache.get(&photo, true).is_none());
        assert!(matches!(cache.entry(photo.id), Some(CacheEntry::Pending)));
        settle(&mut cache);

        let slide = cache.get(&photo, true).expect("slide loaded");
        assert_eq!(slide.photo_id(), photo.id);
        // 40x30 blank fitted into 800x600
        assert_eq!(slide.ideal_size(), (800.0, 600.0));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_no_fetch_does_not_request() {
        let (mut cache, _clock) = cache_with(4);
        assert!(cache.get(&test_photo(1), false).is_none());
        assert_eq!(cache.pending_count(), 0);
        assert!(cache.entry(PhotoId(1)).is_none());
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let (mut cache, clock) = cache_with(3);
        for id in 1..=10 {
            clock.advance(1.0);
            cache.get(&test_photo(id), true);
            assert!(cache.len() <= 3);
            settle(&mut cache);
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.stats().evictions >= 7);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let (mut cache, clock) = cache_with(2);
        let (a, b, c) = (test_photo(1), test_photo(2), test_photo(3));

        load(&mut cache, &a); // last_used 10
        clock.set(11.0);
        load(&mut cache, &b); // last_used 11
        clock.set(12.0);
        assert!(cache.get(&a, true).is_some()); // a -> 12

        clock.set(13.0);
        load(&mut cache, &c);

        assert!(cache.contains(a.id));
        assert!(!cache.contains(b.id));
        assert!(cache.contains(c.id));
        assert_eq!(cache.last_used(a.id), Some(12.0));
    }

    #[test]
    fn test_eviction_ties_go_to_oldest_insert() {
        let (mut cache, _clock) = cache_with(2);
        // Two broken entries both at last_used 0
        load(&mut cache, &broken_photo(1));
        load(&mut cache, &broken_photo(2));
        assert_eq!(cache.last_used(PhotoId(1)), Some(0.0));

        load(&mut cache, &test_photo(3));
        assert!(!cache.contains(PhotoId(1)));
        assert!(cache.contains(PhotoId(2)));
        assert!(cache.contains(PhotoId(3)));
    }

    #[test]
    fn test_broken_is_not_retried() {
        let decoder = ScriptedDecoder::default();
        let calls = decoder.calls.clone();
        let loader = LoadWorker::spawn(decoder).unwrap();
        let mut cache =
            SlideCache::new(4, (800, 600), loader, Rc::new(ManualClock::new(5.0))).unwrap();

        let photo = broken_photo(1);
        load(&mut cache, &photo);
        assert!(cache.entry(photo.id).is_some_and(CacheEntry::is_broken));

        assert!(cache.get(&photo, true).is_none());
        assert!(cache.get(&photo, true).is_none());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(cache.stats().broken, 1);
    }

    #[test]
    fn test_repeated_miss_requests_once() {
        let decoder = ScriptedDecoder::default();
        let calls = decoder.calls.clone();
        let loader = LoadWorker::spawn(decoder).unwrap();
        let mut cache =
            SlideCache::new(4, (800, 600), loader, Rc::new(ManualClock::new(5.0))).unwrap();

        let photo = test_photo(1);
        cache.get(&photo, true);
        cache.get(&photo, true);
        cache.get(&photo, true);
        settle(&mut cache);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(cache.load_sequence(), 1);
    }

    #[test]
    fn test_refresh_replaces_without_eviction() {
        let (mut cache, clock) = cache_with(2);
        load(&mut cache, &test_photo(1));
        clock.advance(1.0);
        load(&mut cache, &test_photo(2));
        assert_eq!(cache.len(), 2);

        // A second result for a cached id
        cache.accept(LoadResult {
            photo: test_photo(1),
            sequence: 99,
            outcome: Ok(DecodedImage::blank(10, 10)),
            elapsed: Duration::ZERO,
        });
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(PhotoId(2)));
        let slide = cache.slide_mut(PhotoId(1)).unwrap();
        assert_eq!(slide.sequence(), 99);

        // And a failure for a cached id turns it broken in place
        cache.accept(LoadResult {
            photo: test_photo(2),
            sequence: 100,
            outcome: Err(DecodeError::Empty),
            elapsed: Duration::ZERO,
        });
        assert_eq!(cache.len(), 2);
        assert!(cache.entry(PhotoId(2)).is_some_and(CacheEntry::is_broken));
    }

    #[test]
    fn test_touch_ignores_unknown_ids() {
        let (mut cache, _clock) = cache_with(2);
        cache.touch(PhotoId(42));
        assert!(cache.last_used(PhotoId(42)).is_none());
        assert!(cache.is_empty());
    }
}
