//! Live photo ingestion from a drop directory.
//!
//! A background poller watches one directory under the photo root. Files that
//! show up there after startup are handed to the control thread as pathnames
//! relative to the root, one per tick, and inserted right after the slide on
//! screen.
//!
//! Fetching is off until switched on, and switches itself off after
//! `max_fetch` so a forgotten toggle doesn't poll forever.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::core::workers::{Poll, Worker};
use crate::library::{is_image, relative_pathname};

/// Wait after a failed poll before trying again.
pub const FAULT_BACKOFF: Duration = Duration::from_secs(60);

/// Commands for the poller thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestCommand {
    SetFetching(bool),
}

/// Poll state, owned by the poller thread.
#[derive(Debug)]
pub struct DropDirWatcher {
    dir: PathBuf,
    root: PathBuf,
    seen: HashSet<PathBuf>,
    fetching_since: Option<Instant>,
    max_fetch: Duration,
}

impl DropDirWatcher {
    /// Watch `dir` (which must be under `root`). Files already there are
    /// considered seen.
    pub fn new(dir: PathBuf, root: PathBuf, max_fetch: Duration) -> Self {
        let mut watcher = Self {
            dir,
            root,
            seen: HashSet::new(),
            fetching_since: None,
            max_fetch,
        };
        match watcher.list_images() {
            Ok(existing) => watcher.seen.extend(existing),
            Err(e) => debug!("Drop directory not readable yet: {:#}", e),
        }
        watcher
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching_since.is_some()
    }

    fn list_images(&self) -> Result<Vec<PathBuf>> {
        let mut images = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.with_context(|| format!("Failed to list {}", self.dir.display()))?;
            if entry.file_type().is_file() && is_image(entry.path()) {
                images.push(entry.into_path());
            }
        }
        images.sort();
        Ok(images)
    }
}

impl Poll for DropDirWatcher {
    type Command = IngestCommand;
    type Output = String;

    fn command(&mut self, command: IngestCommand) {
        match command {
            IngestCommand::SetFetching(true) => {
                info!("Ingestion on: watching {}", self.dir.display());
                self.fetching_since = Some(Instant::now());
            }
            IngestCommand::SetFetching(false) => {
                info!("Ingestion off");
                self.fetching_since = None;
            }
        }
    }

    fn poll(&mut self) -> Result<Vec<String>> {
        let Some(since) = self.fetching_since else {
            return Ok(Vec::new());
        };
        if since.elapsed() >= self.max_fetch {
            info!("Ingestion switched off after {:?}", self.max_fetch);
            self.fetching_since = None;
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for path in self.list_images()? {
            if !self.seen.insert(path.clone()) {
                continue;
            }
            match relative_pathname(&self.root, &path) {
                Some(pathname) => {
                    info!("Received photo {}", pathname);
                    found.push(pathname);
                }
                None => warn!(
                    "Photo {} is not under {}",
                    path.display(),
                    self.root.display()
                ),
            }
        }
        Ok(found)
    }
}

/// Control-thread handle for the ingestion thread.
pub struct IngestPoller {
    worker: Worker<IngestCommand, String>,
    fetching: bool,
    fetching_since: Option<Instant>,
    max_fetch: Duration,
}

impl IngestPoller {
    pub fn spawn(
        dir: &Path,
        root: &Path,
        interval: Duration,
        max_fetch: Duration,
    ) -> io::Result<Self> {
        let watcher = DropDirWatcher::new(dir.to_path_buf(), root.to_path_buf(), max_fetch);
        let worker = Worker::spawn_poller("ingest", interval, FAULT_BACKOFF, watcher)?;
        Ok(Self {
            worker,
            fetching: false,
            fetching_since: None,
            max_fetch,
        })
    }

    pub fn set_fetching(&mut self, fetching: bool) {
        self.fetching = fetching;
        self.fetching_since = fetching.then(Instant::now);
        self.worker.send(IngestCommand::SetFetching(fetching));
    }

    pub fn toggle_fetching(&mut self) {
        self.set_fetching(!self.is_fetching());
    }

    /// Mirrors the thread's own auto-off.
    pub fn is_fetching(&self) -> bool {
        self.fetching && self.fetching_since.is_some_and(|since| since.elapsed() < self.max_fetch)
    }

    /// Next received pathname (relative to the photo root), at most one per call.
    pub fn next_pathname(&self) -> Option<String> {
        self.worker.try_recv()
    }

    pub fn shutdown(&mut self) {
        self.worker.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().to_path_buf();
        let dir = root.join("inbox");
        fs::create_dir_all(&dir).unwrap();
        (temp, root, dir)
    }

    #[test]
    fn test_watcher_emits_new_files_once() {
        let (_temp, root, dir) = setup();
        fs::write(dir.join("old.jpg"), b"old").unwrap();

        let mut watcher = DropDirWatcher::new(dir.clone(), root, Duration::from_secs(3600));
        // Not fetching yet
        fs::write(dir.join("new.jpg"), b"new").unwrap();
        assert!(watcher.poll().unwrap().is_empty());

        watcher.command(IngestCommand::SetFetching(true));
        fs::write(dir.join("note.txt"), b"txt").unwrap();
        assert_eq!(watcher.poll().unwrap(), vec!["inbox/new.jpg".to_string()]);
        assert!(watcher.poll().unwrap().is_empty());
    }

    #[test]
    fn test_watcher_auto_off() {
        let (_temp, root, dir) = setup();
        let mut watcher = DropDirWatcher::new(dir.clone(), root, Duration::ZERO);
        watcher.command(IngestCommand::SetFetching(true));
        fs::write(dir.join("new.jpg"), b"new").unwrap();
        assert!(watcher.poll().unwrap().is_empty());
        assert!(!watcher.is_fetching());
    }

    #[test]
    fn test_watcher_missing_dir_is_fault() {
        let (_temp, root, _dir) = setup();
        let mut watcher =
            DropDirWatcher::new(root.join("missing"), root, Duration::from_secs(3600));
        watcher.command(IngestCommand::SetFetching(true));
        assert!(watcher.poll().is_err());
    }

    #[test]
    fn test_poller_delivers_pathnames() {
        let (_temp, root, dir) = setup();
        let mut poller = IngestPoller::spawn(
            &dir,
            &root,
            Duration::from_millis(5),
            Duration::from_secs(3600),
        )
        .unwrap();
        poller.set_fetching(true);
        assert!(poller.is_fetching());
        fs::write(dir.join("fresh.jpg"), b"fresh").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut got = None;
        while got.is_none() && Instant::now() < deadline {
            got = poller.next_pathname();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(got.as_deref(), Some("inbox/fresh.jpg"));

        poller.toggle_fetching();
        assert!(!poller.is_fetching());
        poller.shutdown();
    }
}
