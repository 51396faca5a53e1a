use clap::Parser;
use std::path::PathBuf;

use crate::config::Settings;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "SQLite: rusqlite (bundled)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Always-on photo slideshow
#[derive(Parser, Debug, Default)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Root of the photo tree (overrides settings)
    #[arg(value_name = "ROOT_DIR")]
    pub root_dir: Option<PathBuf>,

    /// Photo database (default: frameloop.db in the data directory)
    #[arg(short = 'd', long = "db", value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// Only show photos rated at least N (1-5)
    #[arg(short = 'r', long = "min-rating", value_name = "N", value_parser = clap::value_parser!(u8).range(1..=5))]
    pub min_rating: Option<u8>,

    /// Only show photos at least N days old
    #[arg(long = "min-days", value_name = "N")]
    pub min_days: Option<u32>,

    /// Only show photos at most N days old
    #[arg(long = "max-days", value_name = "N")]
    pub max_days: Option<u32>,

    /// Only show photos whose path contains this text
    #[arg(short = 'i', long = "includes", value_name = "TEXT")]
    pub includes: Option<String>,

    /// Drop directory watched for new photos (relative to ROOT_DIR unless absolute)
    #[arg(long = "ingest-dir", value_name = "DIR")]
    pub ingest_dir: Option<PathBuf>,

    /// Start with ingestion switched on
    #[arg(long = "ingest")]
    pub ingest: bool,

    /// Enable REST API server
    #[arg(long = "api")]
    pub api: bool,

    /// REST API port (implies --api)
    #[arg(long = "api-port", value_name = "PORT")]
    pub api_port: Option<u16>,

    /// Target ticks per second
    #[arg(long = "fps", value_name = "N")]
    pub fps: Option<f32>,

    /// Start with the debug overlay on
    #[arg(short = 'D', long = "debug-overlay")]
    pub debug_overlay: bool,

    /// Don't read keys from stdin
    #[arg(long = "no-stdin")]
    pub no_stdin: bool,

    /// Enable debug logging to file (default: frameloop.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl Args {
    /// Overlay command-line values on loaded settings. CLI wins.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(root) = &self.root_dir {
            settings.root_dir = root.clone();
        }
        if let Some(db) = &self.database {
            settings.database = Some(db.clone());
        }
        if let Some(rating) = self.min_rating {
            settings.min_rating = rating;
        }
        if self.min_days.is_some() {
            settings.min_days = self.min_days;
        }
        if self.max_days.is_some() {
            settings.max_days = self.max_days;
        }
        if self.includes.is_some() {
            settings.includes = self.includes.clone();
        }
        if self.ingest_dir.is_some() {
            settings.ingest_dir = self.ingest_dir.clone();
        }
        if self.api {
            settings.api_server_enabled = true;
        }
        if let Some(port) = self.api_port {
            settings.api_server_enabled = true;
            settings.api_server_port = port;
        }
        if let Some(fps) = self.fps {
            settings.fps = fps;
        }
        if self.debug_overlay {
            settings.show_debug = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "frameloop", "/mnt/photos", "-r", "4", "--includes", "Beach", "--api-port", "8080", "-vv",
        ])
        .unwrap();
        assert_eq!(args.root_dir, Some(PathBuf::from("/mnt/photos")));
        assert_eq!(args.min_rating, Some(4));
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.log_file, None);

        let mut settings = Settings::default();
        args.apply_to(&mut settings);
        assert_eq!(settings.root_dir, PathBuf::from("/mnt/photos"));
        assert_eq!(settings.min_rating, 4);
        assert_eq!(settings.includes.as_deref(), Some("Beach"));
        assert!(settings.api_server_enabled);
        assert_eq!(settings.api_server_port, 8080);
    }

    #[test]
    fn test_log_flag_optional_value() {
        let args = Args::try_parse_from(["frameloop", "--log"]).unwrap();
        assert_eq!(args.log_file, Some(None));

        let args = Args::try_parse_from(["frameloop", "--log", "show.log"]).unwrap();
        assert_eq!(args.log_file, Some(Some(PathBuf::from("show.log"))));
    }

    #[test]
    fn test_rating_range_checked() {
        assert!(Args::try_parse_from(["frameloop", "-r", "9"]).is_err());
    }

    #[test]
    fn test_no_flags_keep_settings() {
        let mut settings = Settings::default();
        settings.min_rating = 5;
        Args::default().apply_to(&mut settings);
        assert_eq!(settings, {
            let mut expected = Settings::default();
            expected.min_rating = 5;
            expected
        });
    }
}
