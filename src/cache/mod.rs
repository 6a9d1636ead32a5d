//! On-disk cache of the album tree.
//!
//! The tree is stored as a single JSON file in the per-user cache directory.
//! A missing, outdated or unreadable cache is never fatal: it is reported as
//! absent and the library falls back to a fresh scan.

pub mod codec;
pub mod images;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LibraryError;
use crate::models::Group;

pub use codec::{NodeRecord, decode, decode_group, encode, encode_group};
pub use images::ImageCache;

/// Version of the cache file layout. Bump when [`NodeRecord`] changes.
const CACHE_VERSION: u32 = 1;

/// Top-level content of the cache file.
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    root: NodeRecord,
}

/// Reads and writes the encoded album tree.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    /// Create a store writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `root`, replacing any previous cache.
    ///
    /// The file is written next to its final location and then renamed, so a
    /// crash never leaves a half-written cache behind.
    pub fn save(&self, root: &Group) -> Result<(), LibraryError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| LibraryError::io(dir, e))?;
        }

        let file = CacheFile {
            version: CACHE_VERSION,
            root: encode_group(root),
        };
        let json = serde_json::to_vec(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| LibraryError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| LibraryError::io(&self.path, e))?;

        tracing::debug!("Saved library cache to {}", self.path.display());
        Ok(())
    }

    /// Load the cached tree.
    ///
    /// Returns `None` if there is no usable cache. Unreadable or corrupt files
    /// are logged and treated like a missing one.
    pub fn load(&self) -> Option<Group> {
        match self.try_load() {
            Ok(Some(root)) => {
                tracing::info!("Loaded library cache from {}", self.path.display());
                Some(root)
            }
            Ok(None) => {
                tracing::info!("No library cache at {}", self.path.display());
                None
            }
            Err(e) => {
                tracing::warn!(
                    "Discarding library cache {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Load the cached tree, distinguishing a missing file from a broken one.
    pub fn try_load(&self) -> Result<Option<Group>, LibraryError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LibraryError::io(&self.path, e)),
        };

        let file: CacheFile =
            serde_json::from_slice(&data).map_err(|e| LibraryError::Format(e.to_string()))?;
        if file.version != CACHE_VERSION {
            return Err(LibraryError::Format(format!(
                "cache version {} (expected {})",
                file.version, CACHE_VERSION
            )));
        }

        decode_group(file.root).map(Some)
    }
}
