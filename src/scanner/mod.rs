//! Album library scanner.
//!
//! Walks the library directories and builds the album tree. Directories with
//! audio files become albums; directories that only lead to albums become
//! groups; everything else is pruned. Background scans are throttled and can
//! be cancelled through a [`StopSignal`].

pub mod classify;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::LibraryConfig;
use crate::error::LibraryError;
use crate::models::{Album, Group, Node, ROOT_GROUP_NAME, derive_name};

pub use classify::{Classified, ExtensionFilter, FileKind, classify, classify_with};

/// Cooperative cancellation flag shared between a scan and its owner.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the scan to stop at the next entry.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters collected during a scan, for logging.
#[derive(Debug, Default, Clone, Copy)]
struct ScanStats {
    directories: usize,
    albums: usize,
    pruned: usize,
    skipped: usize,
}

/// Album tree scanner.
#[derive(Debug, Clone)]
pub struct Scanner {
    filter: ExtensionFilter,
    throttle: Option<Duration>,
    stop: StopSignal,
}

impl Scanner {
    /// Create an unthrottled scanner.
    pub fn new(filter: ExtensionFilter) -> Self {
        Self {
            filter,
            throttle: None,
            stop: StopSignal::new(),
        }
    }

    /// Create a scanner using the extension lists of `config`.
    pub fn from_config(config: &LibraryConfig) -> Self {
        Self::new(ExtensionFilter::new(
            config.audio_extensions.iter().cloned(),
            config.image_extensions.iter().cloned(),
        ))
    }

    /// Sleep for `delay` after each visited entry.
    pub fn with_throttle(mut self, delay: Duration) -> Self {
        self.throttle = Some(delay);
        self
    }

    /// Abort the scan with [`LibraryError::Cancelled`] once `stop` is raised.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Scan `roots` in order and merge their content below a synthetic root group.
    ///
    /// Relative roots are resolved against the working directory, so every
    /// path in the tree is absolute. A root directory that itself holds audio files becomes a top-level
    /// album. Unreadable entries are logged and skipped. Fails with
    /// [`LibraryError::DuplicateAlbumName`] if two siblings derive the same
    /// name, and with [`LibraryError::Cancelled`] if the stop signal is raised.
    pub fn scan(&self, roots: &[PathBuf]) -> Result<Group, LibraryError> {
        let mut stats = ScanStats::default();
        let mut visited = HashSet::new();
        let mut root = Group::root();
        let mut root_images = Vec::new();

        for dir in roots {
            let absolute = match std::path::absolute(dir) {
                Ok(absolute) => absolute,
                Err(e) => {
                    tracing::warn!("Skipping library directory {}: {}", dir.display(), e);
                    stats.skipped += 1;
                    continue;
                }
            };
            let dir = absolute.as_path();
            if !dir.is_dir() {
                tracing::warn!("Library directory not found: {}", dir.display());
                stats.skipped += 1;
                continue;
            }
            tracing::info!("Scanning library directory {}", dir.display());

            if let Some(canonical) = canonical(dir) {
                visited.insert(canonical);
            }
            stats.directories += 1;
            let listing = self.list(dir)?;

            if !listing.audio_files.is_empty() {
                ignore_subdirectories(dir, &listing.subdirectories);
                let album = self.album(
                    dir,
                    ROOT_GROUP_NAME,
                    listing.audio_files,
                    listing.image_files,
                    &mut stats,
                );
                if let Some(album) = album {
                    root.insert(album.into())?;
                }
                continue;
            }

            root_images.extend(listing.image_files);
            for sub in &listing.subdirectories {
                let node = self.build_node(sub, ROOT_GROUP_NAME, &mut visited, &mut stats)?;
                if let Some(node) = node {
                    root.insert(node)?;
                }
            }
        }

        root.set_images(root_images);
        tracing::info!(
            "Scan complete: {} albums in {} directories ({} pruned, {} skipped)",
            stats.albums,
            stats.directories,
            stats.pruned,
            stats.skipped
        );
        Ok(root)
    }

    /// Build the node for `dir`, or `None` if it holds no album.
    fn build_node(
        &self,
        dir: &Path,
        parent_name: &str,
        visited: &mut HashSet<PathBuf>,
        stats: &mut ScanStats,
    ) -> Result<Option<Node>, LibraryError> {
        if let Some(canonical) = canonical(dir)
            && !visited.insert(canonical)
        {
            tracing::debug!("Skipping already visited directory {}", dir.display());
            return Ok(None);
        }

        tracing::debug!("Scanning {}", dir.display());
        stats.directories += 1;
        let listing = self.list(dir)?;

        if !listing.audio_files.is_empty() {
            ignore_subdirectories(dir, &listing.subdirectories);
            let album = self.album(
                dir,
                parent_name,
                listing.audio_files,
                listing.image_files,
                stats,
            );
            return Ok(album.map(Node::Album));
        }

        let mut group = Group::new(derive_name(parent_name, &segment(dir)));
        for sub in &listing.subdirectories {
            if let Some(node) = self.build_node(sub, group.name(), visited, stats)? {
                group.insert(node)?;
            }
        }

        if group.is_empty() {
            tracing::debug!("Pruning {} (no albums)", dir.display());
            stats.pruned += 1;
            return Ok(None);
        }

        group.set_images(listing.image_files);
        Ok(Some(Node::Group(group)))
    }

    fn album(
        &self,
        dir: &Path,
        parent_name: &str,
        audio_files: Vec<PathBuf>,
        image_files: Vec<PathBuf>,
        stats: &mut ScanStats,
    ) -> Option<Album> {
        let modified = match directory_modified(dir) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!("Skipping album {}: {}", dir.display(), e);
                stats.skipped += 1;
                return None;
            }
        };

        let album = Album::new(
            derive_name(parent_name, &segment(dir)),
            dir,
            audio_files,
            image_files,
            modified,
        )?;
        stats.albums += 1;
        Some(album)
    }

    fn list(&self, dir: &Path) -> Result<Classified, LibraryError> {
        classify_with(dir, &self.filter, || self.pause())
    }

    /// Called after every entry: honours the stop signal and the throttle.
    fn pause(&self) -> Result<(), LibraryError> {
        if self.stop.is_requested() {
            return Err(LibraryError::Cancelled);
        }
        if let Some(delay) = self.throttle {
            std::thread::sleep(delay);
            if self.stop.is_requested() {
                return Err(LibraryError::Cancelled);
            }
        }
        Ok(())
    }
}

/// Album directories are leaves; audio below them is not part of the library.
fn ignore_subdirectories(album_dir: &Path, subdirectories: &[PathBuf]) {
    for sub in subdirectories {
        tracing::warn!(
            "Ignoring {} inside album {}",
            sub.display(),
            album_dir.display()
        );
    }
}

/// Final path segment of `dir`, or the whole path for roots like `/`.
fn segment(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.to_string_lossy().into_owned())
}

fn canonical(dir: &Path) -> Option<PathBuf> {
    fs::canonicalize(dir).ok()
}

fn directory_modified(dir: &Path) -> Result<DateTime<Utc>, LibraryError> {
    let modified = fs::metadata(dir)
        .and_then(|meta| meta.modified())
        .map_err(|e| LibraryError::io(dir, e))?;
    Ok(DateTime::<Utc>::from(modified))
}
