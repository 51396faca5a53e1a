//! Library builder - turns the photo tree + database into the show's photo list
//!
//! **Why**: photos move around on disk. A photo's identity is the hash of its
//! last KiB (`hash_back`), so a rename or move keeps its rating and rotation.
//!
//! **Used by**: `main` at startup, `Slideshow::ingest` for live photos
//!
//! # Pipeline
//!
//! 1. `scan_tree`: every JPEG under the root, as relative pathnames
//! 2. `register_new_files`: hash unknown pathnames, create or re-label photos
//! 3. rating / age filters on database rows
//! 4. `assign_paths`: keep photos that have a file on disk
//! 5. substring filter, shuffle

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use log::{debug, info, trace, warn};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::config::Settings;
use crate::entities::photo::DEFAULT_RATING;
use crate::entities::{NewPhoto, Photo, PhotoFile, PhotoId};
use crate::store::{PhotoStore, StoreError};

/// Bytes at the end of a file that identify the photo.
pub const HASH_BACK_BYTES: usize = 1024;

/// Missing-file warnings logged before going quiet.
const MAX_NO_FILE_WARNINGS: usize = 10;

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d\d\d\d-\d\d-\d\d(.*)$").expect("valid date regex"));
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d\d\.\d\d\.\d\d(.*)$").expect("valid time regex"));

/// Library errors
#[derive(Debug)]
pub enum LibraryError {
    Io(String),
    Store(StoreError),
    /// Nothing left to show after scanning and filtering.
    Empty,
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryError::Io(e) => write!(f, "I/O error: {}", e),
            LibraryError::Store(e) => write!(f, "{}", e),
            LibraryError::Empty => write!(f, "No photos found"),
        }
    }
}

impl std::error::Error for LibraryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LibraryError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for LibraryError {
    fn from(e: StoreError) -> Self {
        LibraryError::Store(e)
    }
}

/// Whether the pathname is an image we show.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ext == "jpg" || ext == "jpeg"
        })
        .unwrap_or(false)
}

/// Relative '/'-separated pathname of every image under `root`.
pub fn scan_tree(root: &Path, unwanted_dirs: &[String]) -> Result<BTreeSet<String>, LibraryError> {
    if !root.is_dir() {
        return Err(LibraryError::Io(format!(
            "photo root is not a directory: {}",
            root.display()
        )));
    }

    debug!("Scanning photo directories under {}...", root.display());
    let start = std::time::Instant::now();

    let walker = WalkDir::new(root).follow_links(true).into_iter().filter_entry(|entry| {
        let unwanted = entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| unwanted_dirs.iter().any(|d| d == name));
        !unwanted
    });

    let mut pathnames = BTreeSet::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        if let Some(pathname) = relative_pathname(root, entry.path()) {
            pathnames.insert(pathname);
        }
    }

    debug!(
        "There are {} photo files. Scanning took {:.1}s",
        pathnames.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(pathnames)
}

/// `path` relative to `root`, with '/' separators.
pub fn relative_pathname(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Hex SHA-256 of the whole file and of its last `HASH_BACK_BYTES`.
pub fn hash_file(path: &Path) -> Result<(String, String), LibraryError> {
    let bytes = fs::read(path).map_err(|e| LibraryError::Io(format!("{}: {}", path.display(), e)))?;
    Ok(hash_bytes(&bytes))
}

fn hash_bytes(bytes: &[u8]) -> (String, String) {
    let back = &bytes[bytes.len().saturating_sub(HASH_BACK_BYTES)..];
    let hash_all = format!("{:x}", Sha256::digest(bytes));
    let hash_back = format!("{:x}", Sha256::digest(back));
    (hash_all, hash_back)
}

/// Human date ("July 4, 2017") for epoch seconds, in local time.
pub fn display_date(epoch: i64) -> String {
    match Local.timestamp_opt(epoch, 0).single() {
        Some(time) => time.format("%B %-d, %Y").to_string(),
        None => String::new(),
    }
}

/// Rules for turning a pathname into a label.
#[derive(Debug, Clone, Default)]
pub struct LabelRules {
    /// Parts dropped entirely ("Originals")
    pub bad_parts: Vec<String>,
    /// Parts starting with one of these are dropped ("IMG_")
    pub bad_prefixes: Vec<String>,
}

impl LabelRules {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            bad_parts: settings.bad_parts.clone(),
            bad_prefixes: settings.bad_prefixes.clone(),
        }
    }

    /// "Vacation/2019-06-02 Ibiza/Funny_moment.jpg" -> "Vacation, Ibiza, Funny moment"
    pub fn label_from_pathname(&self, pathname: &str) -> String {
        let mut parts: Vec<&str> = pathname.split('/').collect();
        if let Some(last) = parts.pop() {
            let stem = Path::new(last).file_stem().and_then(|s| s.to_str()).unwrap_or(last);
            parts.push(stem);
        }

        parts
            .into_iter()
            .filter(|part| self.keep_part(part))
            .map(clean_part)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn keep_part(&self, part: &str) -> bool {
        if part.is_empty() {
            return false;
        }
        if self.bad_prefixes.iter().any(|prefix| part.starts_with(prefix.as_str())) {
            return false;
        }
        if self.bad_parts.iter().any(|bad| bad == part) {
            return false;
        }
        // Numbers mean nothing, except years
        if is_number(part, 10) && !is_year(part) {
            return false;
        }
        if let Some(rest) = part.strip_prefix('P') {
            if is_number(rest, 10) {
                return false;
            }
        }
        // Message-service media ids
        if let Some(rest) = part.strip_prefix("ME") {
            if part.len() == 34 && is_number(rest, 16) {
                return false;
            }
        }
        true
    }
}

fn clean_part(part: &str) -> String {
    let mut part = part.replace('_', " ");

    if let Some(caps) = DATE_RE.captures(&part) {
        part = caps[1].trim().to_string();
    }
    // Camera uploads put the time right after the date
    if let Some(caps) = TIME_RE.captures(&part) {
        part = caps[1].trim().to_string();
    }

    capitalize(&part)
}

/// Upper-case the first character, leave the rest alone.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_number(s: &str, radix: u32) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_digit(radix))
}

fn is_year(s: &str) -> bool {
    s.len() == 4 && (s.starts_with("19") || s.starts_with("20"))
}

/// Record `pathname` (relative to `root`) as a photo file and return its photo.
///
/// A file whose `hash_back` is already known is a rename or copy: the
/// existing photo keeps its rating and date and only takes the new label.
pub fn register_file(
    store: &dyn PhotoStore,
    root: &Path,
    rules: &LabelRules,
    pathname: &str,
) -> Result<PhotoId, LibraryError> {
    trace!("Computing hash for {}", pathname);
    let absolute = root.join(pathname);
    let (hash_all, hash_back) = hash_file(&absolute)?;
    let label = rules.label_from_pathname(pathname);

    store.save_photo_file(&PhotoFile {
        pathname: pathname.to_string(),
        hash_all,
        hash_back: hash_back.clone(),
    })?;

    match store.photo_by_hash_back(&hash_back)? {
        Some(mut photo) => {
            debug!("Renamed or moved photo: {}", pathname);
            photo.label = label;
            store.save_photo(&photo)?;
            Ok(photo.id)
        }
        None => {
            debug!("New photo: {}", pathname);
            let date = file_mtime(&absolute)?;
            let id = store.create_photo(&NewPhoto {
                hash_back,
                rotation: 0,
                rating: DEFAULT_RATING,
                date,
                display_date: display_date(date),
                label,
            })?;
            Ok(id)
        }
    }
}

fn file_mtime(path: &Path) -> Result<i64, LibraryError> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| LibraryError::Io(format!("{}: {}", path.display(), e)))?;
    let epoch = modified
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(epoch)
}

/// Register every pathname in `tree` the store doesn't know. Returns how many.
pub fn register_new_files(
    store: &dyn PhotoStore,
    root: &Path,
    rules: &LabelRules,
    tree: &BTreeSet<String>,
) -> Result<usize, LibraryError> {
    let known: BTreeSet<String> = store
        .all_photo_files()?
        .into_iter()
        .map(|file| file.pathname)
        .collect();

    let todo: Vec<&String> = tree.difference(&known).collect();
    info!("Analyzing {} new or renamed photos...", todo.len());
    for pathname in &todo {
        register_file(store, root, rules, pathname)?;
    }
    Ok(todo.len())
}

/// Give each photo a pathname that exists in `tree`; drop the ones with none.
pub fn assign_paths(
    store: &dyn PhotoStore,
    photos: Vec<Photo>,
    root: &Path,
    tree: &BTreeSet<String>,
) -> Result<Vec<Photo>, LibraryError> {
    let mut files_by_hash: HashMap<String, Vec<String>> = HashMap::new();
    for file in store.all_photo_files()? {
        files_by_hash.entry(file.hash_back).or_default().push(file.pathname);
    }

    let mut missing = 0;
    let mut good = Vec::with_capacity(photos.len());
    for mut photo in photos {
        let on_disk = files_by_hash
            .get(&photo.hash_back)
            .and_then(|files| files.iter().find(|p| tree.contains(p.as_str())));

        match on_disk {
            Some(pathname) => {
                photo.pathname = PathBuf::from(pathname);
                photo.absolute_path = root.join(pathname);
                good.push(photo);
            }
            None => {
                missing += 1;
                if missing <= MAX_NO_FILE_WARNINGS {
                    warn!("No file on disk for {} ({})", photo.hash_back, photo.label);
                }
            }
        }
    }

    if missing > 0 {
        warn!("Files missing on disk: {}", missing);
    }
    Ok(good)
}

pub fn filter_by_rating(photos: Vec<Photo>, min_rating: u8) -> Vec<Photo> {
    photos.into_iter().filter(|p| p.rating >= min_rating).collect()
}

/// Keep photos whose age (at `now`, epoch seconds) is within the window.
pub fn filter_by_age(
    photos: Vec<Photo>,
    min_days: Option<u32>,
    max_days: Option<u32>,
    now: i64,
) -> Vec<Photo> {
    const DAY: i64 = 24 * 60 * 60;
    let min_age = min_days.map(|d| d as i64 * DAY);
    let max_age = max_days.map(|d| d as i64 * DAY);

    photos
        .into_iter()
        .filter(|p| {
            let age = now - p.date;
            min_age.is_none_or(|min| age >= min) && max_age.is_none_or(|max| age <= max)
        })
        .collect()
}

/// Keep photos whose pathname contains `substring` (all if None or empty).
pub fn filter_by_substring(photos: Vec<Photo>, substring: Option<&str>) -> Vec<Photo> {
    match substring {
        Some(s) if !s.is_empty() => photos
            .into_iter()
            .filter(|p| p.pathname.to_string_lossy().contains(s))
            .collect(),
        _ => photos,
    }
}

/// Full startup pipeline. Returns the shuffled photo list.
pub fn build_library(store: &dyn PhotoStore, settings: &Settings) -> Result<Vec<Photo>, LibraryError> {
    let root = settings.root_dir.as_path();
    let rules = LabelRules::from_settings(settings);

    let tree = scan_tree(root, &settings.unwanted_dirs)?;
    register_new_files(store, root, &rules, &tree)?;

    let photos = store.all_photos()?;
    info!("Total photos: {}", photos.len());
    let photos = filter_by_rating(photos, settings.min_rating);
    info!("Photos after rating filter: {}", photos.len());
    let now = chrono::Utc::now().timestamp();
    let photos = filter_by_age(photos, settings.min_days, settings.max_days, now);
    info!("Photos after date filter: {}", photos.len());
    let photos = assign_paths(store, photos, root, &tree)?;
    info!("Photos after disk filter: {}", photos.len());
    let mut photos = filter_by_substring(photos, settings.includes.as_deref());
    info!("Photos after path filter: {}", photos.len());

    if photos.is_empty() {
        return Err(LibraryError::Empty);
    }

    photos.shuffle(&mut rand::rng());
    Ok(photos)
}
