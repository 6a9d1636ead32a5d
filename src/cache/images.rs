//! Mirrored image cache.
//!
//! Album images are copied on demand into a directory whose relative paths
//! shadow the absolute source paths, e.g. `/music/A/cover.jpg` is cached as
//! `<cache>/music/A/cover.jpg`. The janitor removes copies whose source is
//! gone or has a different size. Size is the only staleness check, so a
//! same-size rewrite of an image is not detected.

use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::LibraryError;

/// Directory mirroring album images.
#[derive(Debug, Clone)]
pub struct ImageCache {
    root: PathBuf,
}

impl ImageCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the mirror.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the cached copy of `source`.
    pub fn mirror_path(&self, source: &Path) -> PathBuf {
        let relative: PathBuf = source
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        self.root.join(relative)
    }

    /// Source file shadowed by a path inside the mirror.
    fn source_path(&self, cached: &Path) -> Option<PathBuf> {
        let relative = cached.strip_prefix(&self.root).ok()?;
        Some(Path::new(std::path::MAIN_SEPARATOR_STR).join(relative))
    }

    /// Return the cached copy of `source`, copying it first if the mirror has
    /// no copy of the same size.
    pub fn cached_copy(&self, source: &Path) -> Result<PathBuf, LibraryError> {
        let source_len = fs::metadata(source)
            .map_err(|e| LibraryError::io(source, e))?
            .len();
        let cached = self.mirror_path(source);

        if let Ok(meta) = fs::metadata(&cached)
            && meta.is_file()
            && meta.len() == source_len
        {
            return Ok(cached);
        }

        if let Some(dir) = cached.parent() {
            fs::create_dir_all(dir).map_err(|e| LibraryError::io(dir, e))?;
        }
        fs::copy(source, &cached).map_err(|e| LibraryError::io(&cached, e))?;
        tracing::debug!("Cached image {}", source.display());
        Ok(cached)
    }

    /// Remove stale copies from the mirror.
    ///
    /// A cached file is stale when its source is missing or differs in size;
    /// a cached directory is removed with its content when its source
    /// directory is gone. Returns whether anything was removed.
    pub fn reconcile(&self) -> bool {
        if !self.root.is_dir() {
            return false;
        }

        let mut changed = false;
        let mut entries = WalkDir::new(&self.root).min_depth(1).into_iter();

        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Image cache walk error: {}", e);
                    continue;
                }
            };
            let Some(source) = self.source_path(entry.path()) else {
                continue;
            };

            if entry.file_type().is_dir() {
                if !source.is_dir() {
                    entries.skip_current_dir();
                    match fs::remove_dir_all(entry.path()) {
                        Ok(()) => {
                            tracing::debug!("Removed stale image directory {}", entry.path().display());
                            changed = true;
                        }
                        Err(e) => tracing::warn!(
                            "Failed to remove {}: {}",
                            entry.path().display(),
                            e
                        ),
                    }
                }
                continue;
            }

            let cached_len = entry.metadata().map(|meta| meta.len()).ok();
            let fresh = match fs::metadata(&source) {
                Ok(meta) => meta.is_file() && Some(meta.len()) == cached_len,
                Err(_) => false,
            };
            if fresh {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    tracing::debug!("Removed stale image {}", entry.path().display());
                    changed = true;
                }
                Err(e) => tracing::warn!("Failed to remove {}: {}", entry.path().display(), e),
            }
        }

        if changed {
            tracing::info!("Image cache reconciled: stale entries removed");
        }
        changed
    }
}
