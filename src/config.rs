//! Persistent settings and their validation.
//!
//! Settings live in `frameloop.json` under the config directory. Missing
//! fields take their defaults, so old files keep loading as fields are added.
//! Command-line flags override individual values after loading.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::timeline::{DEFAULT_MAX_PAUSE, DEFAULT_SLIDE_DURATION, DEFAULT_TRANSITION};

/// Invalid configuration values
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Slide cache must hold at least the current and next slide.
    CacheTooSmall(usize),
    /// Transition must be positive and shorter than the slide duration.
    InvalidTiming { slide_duration: f64, transition: f64 },
    InvalidScreen { width: u32, height: u32 },
    InvalidFps(f32),
    /// A duration setting that must be positive.
    InvalidInterval { name: &'static str, seconds: f64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::CacheTooSmall(n) => {
                write!(f, "Slide cache capacity must be at least 2 (got {})", n)
            }
            ConfigError::InvalidTiming {
                slide_duration,
                transition,
            } => write!(
                f,
                "Need 0 < transition < slide duration (got transition {}s, duration {}s)",
                transition, slide_duration
            ),
            ConfigError::InvalidScreen { width, height } => {
                write!(f, "Invalid screen size {}x{}", width, height)
            }
            ConfigError::InvalidFps(fps) => write!(f, "Invalid frame rate {}", fps),
            ConfigError::InvalidInterval { name, seconds } => {
                write!(f, "{} must be positive (got {}s)", name, seconds)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Sender identity for emailed photos
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailIdentity {
    pub name: String,
    pub address: String,
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Library
    pub root_dir: PathBuf,      // Photo tree
    pub database: Option<PathBuf>, // None = frameloop.db in the data dir
    pub unwanted_dirs: Vec<String>, // Directory names skipped while scanning
    pub bad_parts: Vec<String>,     // Path parts left out of labels
    pub bad_prefixes: Vec<String>,  // Camera file prefixes left out of labels
    pub min_rating: u8,
    pub min_days: Option<u32>,
    pub max_days: Option<u32>,
    pub includes: Option<String>, // Only pathnames containing this

    // Playback
    pub slide_duration_s: f64,
    pub transition_s: f64,
    pub max_pause_s: f64,
    pub cache_capacity: usize,
    pub screen_width: u32,
    pub screen_height: u32,
    pub fps: f32,
    pub show_debug: bool,

    // Ingestion
    pub ingest_dir: Option<PathBuf>, // Drop directory, relative to root_dir if not absolute
    pub ingest_poll_s: f64,
    pub max_ingest_s: f64, // Fetching switches itself off after this long

    // Email
    pub email_from: Vec<EmailIdentity>,

    // REST API Server
    pub api_server_enabled: bool,
    pub api_server_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("photos"),
            database: None,
            unwanted_dirs: [".thumbnails", ".small", "Broken", "Private"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            bad_parts: ["Published", "Originals", "Unsorted"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            bad_prefixes: [
                "DSC_", "PICT", "100_", "IMG_", "P101", "VIP_", "Image", "pick", "dcp_", "DSCF",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            min_rating: 3,
            min_days: None,
            max_days: None,
            includes: None,
            slide_duration_s: DEFAULT_SLIDE_DURATION,
            transition_s: DEFAULT_TRANSITION,
            max_pause_s: DEFAULT_MAX_PAUSE,
            cache_capacity: 4,
            screen_width: 1920,
            screen_height: 1080,
            fps: 30.0,
            show_debug: false,
            ingest_dir: None,
            ingest_poll_s: 60.0,
            max_ingest_s: 8.0 * 60.0 * 60.0,
            email_from: Vec::new(),
            api_server_enabled: false,
            api_server_port: 9876,
        }
    }
}

impl Settings {
    /// Load settings from `path`; a missing file gives defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Check the values the engine can't run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity < 2 {
            return Err(ConfigError::CacheTooSmall(self.cache_capacity));
        }
        let timing_ok = self.transition_s > 0.0 && self.transition_s < self.slide_duration_s;
        if !timing_ok {
            return Err(ConfigError::InvalidTiming {
                slide_duration: self.slide_duration_s,
                transition: self.transition_s,
            });
        }
        if self.screen_width == 0 || self.screen_height == 0 {
            return Err(ConfigError::InvalidScreen {
                width: self.screen_width,
                height: self.screen_height,
            });
        }
        if !(self.fps > 0.0 && self.fps.is_finite()) {
            return Err(ConfigError::InvalidFps(self.fps));
        }
        for (name, seconds) in [
            ("max_pause_s", self.max_pause_s),
            ("ingest_poll_s", self.ingest_poll_s),
            ("max_ingest_s", self.max_ingest_s),
        ] {
            if !(seconds > 0.0 && seconds.is_finite()) {
                return Err(ConfigError::InvalidInterval { name, seconds });
            }
        }
        Ok(())
    }

    /// Slides fetched ahead of the current one each tick.
    pub fn prefetch_count(&self) -> usize {
        self.cache_capacity / 2 + 1
    }

    /// Drop directory resolved against the photo root.
    pub fn resolved_ingest_dir(&self) -> Option<PathBuf> {
        self.ingest_dir.as_ref().map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                self.root_dir.join(dir)
            }
        })
    }
}
