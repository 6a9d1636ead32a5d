//! Library configuration.
//!
//! Values normally come from the environment (optionally via a `.env` file)
//! and are then overridden by command line flags.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::LibraryError;

/// Name of the per-user cache directory.
const CACHE_DIR_NAME: &str = "albumshelf";

/// Fallback cache location when the platform has no cache directory.
const FALLBACK_CACHE_DIR: &str = ".cache/albumshelf";

/// Default time between completed background refresh cycles (10 minutes).
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 600;

/// Delay before the first background refresh, to stay out of the way of startup.
const DEFAULT_REFRESH_WARMUP_SECS: u64 = 30;

/// Pause after each directory entry during a background scan.
const DEFAULT_SCAN_THROTTLE_MS: u64 = 20;

/// Period of the foreground refresh tick.
const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Album library configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LibraryConfig {
    /// Directories scanned for albums, in order.
    pub root_dirs: Vec<PathBuf>,
    /// File extensions (with leading dot) classified as audio.
    pub audio_extensions: Vec<String>,
    /// File extensions (with leading dot) classified as images.
    pub image_extensions: Vec<String>,
    /// Time between completed background refresh cycles.
    pub refresh_interval: Duration,
    /// Delay before the first background refresh cycle.
    pub refresh_warmup: Duration,
    /// Pause after each visited entry during background scans.
    pub scan_throttle: Duration,
    /// How often the auto refresher ticks the scheduler.
    pub tick_interval: Duration,
    /// Whether album images are mirrored into the cache directory.
    pub image_cache_enabled: bool,
    /// Directory holding the tree cache file and the image mirror.
    pub cache_dir: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root_dirs: Vec::new(),
            audio_extensions: vec![".mp3".to_string()],
            image_extensions: vec![".png".to_string(), ".jpg".to_string()],
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            refresh_warmup: Duration::from_secs(DEFAULT_REFRESH_WARMUP_SECS),
            scan_throttle: Duration::from_millis(DEFAULT_SCAN_THROTTLE_MS),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            image_cache_enabled: true,
            cache_dir: default_cache_dir(),
        }
    }
}

impl LibraryConfig {
    /// Create a configuration for the given root directories with default settings.
    pub fn new(root_dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            root_dirs: root_dirs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Use a custom cache directory.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Load configuration from `ALBUMSHELF_*` environment variables.
    ///
    /// A `.env` file in the working directory is honoured if present.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, LibraryError> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Some(dirs) = env::var_os("ALBUMSHELF_DIRS") {
            config.root_dirs = env::split_paths(&dirs).collect();
        }
        if let Ok(exts) = env::var("ALBUMSHELF_AUDIO_EXTENSIONS") {
            config.audio_extensions = parse_extensions(&exts)?;
        }
        if let Ok(exts) = env::var("ALBUMSHELF_IMAGE_EXTENSIONS") {
            config.image_extensions = parse_extensions(&exts)?;
        }
        if let Ok(secs) = env::var("ALBUMSHELF_REFRESH_INTERVAL") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                LibraryError::Config(format!("ALBUMSHELF_REFRESH_INTERVAL is not a number: {secs}"))
            })?;
            config.refresh_interval = Duration::from_secs(secs);
        }
        if let Ok(flag) = env::var("ALBUMSHELF_IMAGE_CACHE") {
            config.image_cache_enabled = parse_bool(&flag)?;
        }
        if let Some(dir) = env::var_os("ALBUMSHELF_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Check the settings the library cannot run without.
    pub fn validate(&self) -> Result<(), LibraryError> {
        if self.root_dirs.is_empty() {
            return Err(LibraryError::Config(
                "no library directories configured".to_string(),
            ));
        }
        if self.audio_extensions.is_empty() {
            return Err(LibraryError::Config(
                "no audio extensions configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the file holding the encoded tree.
    pub fn tree_cache_file(&self) -> PathBuf {
        self.cache_dir.join("library.json")
    }

    /// Root of the mirrored image cache.
    pub fn image_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("images")
    }
}

/// Per-user cache directory for the library.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join(CACHE_DIR_NAME))
        .or_else(|| dirs::home_dir().map(|home| home.join(FALLBACK_CACHE_DIR)))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_CACHE_DIR))
}

/// Normalize a user supplied extension: trimmed, with a leading dot.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim();
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}

/// Parse a comma separated extension list. A missing leading dot is added.
fn parse_extensions(value: &str) -> Result<Vec<String>, LibraryError> {
    let exts: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|ext| !ext.is_empty())
        .map(normalize_extension)
        .collect();

    if exts.is_empty() {
        return Err(LibraryError::Config(format!(
            "extension list is empty: {value:?}"
        )));
    }
    Ok(exts)
}

fn parse_bool(value: &str) -> Result<bool, LibraryError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(LibraryError::Config(format!("not a boolean: {other}"))),
    }
}
