//! LoadWorker - background image decoding for the slide cache
//!
//! **Why**: decoding a JPEG takes far longer than a frame. The control thread
//! asks for slides ahead of time and picks the results up on a later tick.
//!
//! **Used by**: SlideCache (the only caller of `request_load`/`drain_results`)
//!
//! At most one request per photo id is ever in flight: the id goes into the
//! pending set on `request_load` and leaves it when its result is drained.

use std::collections::HashSet;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use log::{debug, error, trace};

use super::workers::{Worker, panic_message};
use crate::entities::{DecodeError, DecodedImage, ImageDecoder, Photo, PhotoId};

/// One decode job.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub photo: Photo,
    /// Running count of decodes issued by this worker (instrumentation).
    pub sequence: u64,
}

/// Outcome of one decode job.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub photo: Photo,
    pub sequence: u64,
    pub outcome: Result<DecodedImage, DecodeError>,
    pub elapsed: Duration,
}

impl LoadResult {
    pub fn id(&self) -> PhotoId {
        self.photo.id
    }
}

/// Single-thread decoder with request dedupe.
pub struct LoadWorker {
    worker: Worker<LoadRequest, LoadResult>,
    pending: HashSet<PhotoId>,
    sequence: u64,
}

impl LoadWorker {
    /// Start the decode thread.
    pub fn spawn<D: ImageDecoder>(decoder: D) -> io::Result<Self> {
        let worker = Worker::spawn("loader", move |request: LoadRequest| {
            decode_one(&decoder, request)
        })?;

        Ok(Self {
            worker,
            pending: HashSet::new(),
            sequence: 0,
        })
    }

    /// Ask for `photo` to be decoded. No-op (false) if it's already in flight.
    pub fn request_load(&mut self, photo: &Photo) -> bool {
        if self.pending.contains(&photo.id) {
            trace!("Load {} already pending", photo.id);
            return false;
        }

        self.sequence += 1;
        let request = LoadRequest {
            photo: photo.clone(),
            sequence: self.sequence,
        };

        if !self.worker.send(request) {
            return false;
        }
        self.pending.insert(photo.id);
        debug!(
            "Requested load {} ({}), seq {}",
            photo.id,
            photo.file_name(),
            self.sequence
        );
        true
    }

    /// Completed results in completion order. Never blocks.
    pub fn drain_results(&mut self) -> Vec<LoadResult> {
        let results = self.worker.drain();
        for result in &results {
            self.pending.remove(&result.photo.id);
        }
        results
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: PhotoId) -> bool {
        self.pending.contains(&id)
    }

    /// Decodes issued so far.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Stop the thread (bounded join).
    pub fn shutdown(&mut self) {
        self.worker.shutdown();
        self.pending.clear();
    }
}

fn decode_one<D: ImageDecoder>(decoder: &D, request: LoadRequest) -> LoadResult {
    let start = Instant::now();
    let path = request.photo.absolute_path.as_path();

    let outcome = match catch_unwind(AssertUnwindSafe(|| decoder.decode(path))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(DecodeError::Fault(panic_message(payload.as_ref()))),
    };
    let elapsed = start.elapsed();

    match &outcome {
        Ok(image) => debug!(
            "Loaded {} ({}x{}) in {:.0} ms, seq {}",
            request.photo.file_name(),
            image.width(),
            image.height(),
            elapsed.as_secs_f64() * 1000.0,
            request.sequence
        ),
        Err(e) => error!("Failed to load {}: {}", path.display(), e),
    }

    LoadResult {
        photo: request.photo,
        sequence: request.sequence,
        outcome,
        elapsed,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedDecoder;
    use super::*;
    use crate::entities::photo::test_photo;
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;

    fn drain_until(loader: &mut LoadWorker, count: usize) -> Vec<LoadResult> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut results = Vec::new();
        while results.len() < count && Instant::now() < deadline {
            results.extend(loader.drain_results());
            std::thread::sleep(Duration::from_millis(2));
        }
        results
    }

    #[test]
    fn test_request_dedupes_pending_id() {
        let decoder = ScriptedDecoder::default();
        let calls = decoder.calls.clone();
        let mut loader = LoadWorker::spawn(decoder).unwrap();

        let photo = test_photo(1);
        assert!(loader.request_load(&photo));
        assert!(!loader.request_load(&photo));
        assert!(loader.is_pending(photo.id));
        assert_eq!(loader.sequence(), 1);

        let results = drain_until(&mut loader, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.pending_count(), 0);

        // Once drained the id may be requested again
        assert!(loader.request_load(&photo));
        assert_eq!(loader.sequence(), 2);
        loader.shutdown();
    }

    #[test]
    fn test_results_in_request_order() {
        let mut loader = LoadWorker::spawn(ScriptedDecoder::default()).unwrap();
        for id in 1..=4 {
            loader.request_load(&test_photo(id));
        }

        let results = drain_until(&mut loader, 4);
        let ids: Vec<i64> = results.iter().map(|r| r.id().0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        let seqs: Vec<u64> = results.iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        loader.shutdown();
    }

    #[test]
    fn test_failure_and_panic_become_results() {
        let mut loader = LoadWorker::spawn(ScriptedDecoder::default()).unwrap();

        let mut broken = test_photo(1);
        broken.absolute_path = PathBuf::from("/photos/broken.jpg");
        let mut panicky = test_photo(2);
        panicky.absolute_path = PathBuf::from("/photos/panic.jpg");
        let good = test_photo(3);

        loader.request_load(&broken);
        loader.request_load(&panicky);
        loader.request_load(&good);

        let results = drain_until(&mut loader, 3);
        assert_eq!(results.len(), 3);
        assert!(matches!(results[0].outcome, Err(DecodeError::Image(_))));
        assert!(matches!(results[1].outcome, Err(DecodeError::Fault(_))));
        assert!(results[2].outcome.is_ok());
        loader.shutdown();
    }

    #[test]
    fn test_shutdown_clears_pending() {
        let mut loader = LoadWorker::spawn(ScriptedDecoder::default()).unwrap();
        loader.request_load(&test_photo(9));
        loader.shutdown();
        assert_eq!(loader.pending_count(), 0);
        assert!(!loader.request_load(&test_photo(10)));
    }
}
