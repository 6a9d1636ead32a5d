//! Album library.
//!
//! [`AudioLibrary`] owns the published album tree and exposes the read API
//! used by the player and UI: ordered album lists, album lookup, next/previous
//! navigation and change notifications. The tree itself is refreshed in the
//! background by a [`RefreshScheduler`].

pub mod index;
pub mod refresh;

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use crate::cache::{CacheStore, ImageCache};
use crate::config::LibraryConfig;
use crate::error::LibraryError;
use crate::models::{Album, Group};
use crate::scanner::Scanner;

pub use index::{FlatIndex, SortOrder};
pub use refresh::{AutoRefresher, RefreshHandle, RefreshScheduler, RefreshState};

/// Buffered notifications per subscriber before old ones are dropped.
const EVENT_CAPACITY: usize = 16;

/// Notifications sent to subscribers after a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryEvent {
    /// A new tree was published and the index rebuilt.
    ContentChanged,
    /// The tree is unchanged but stale cached images were removed.
    ImagesChanged,
}

/// An immutable album tree together with its flat index.
#[derive(Debug)]
pub struct LibrarySnapshot {
    root: Group,
    index: FlatIndex,
}

impl LibrarySnapshot {
    /// Index `root`. Fails if two albums share a name.
    pub fn new(root: Group) -> Result<Self, LibraryError> {
        let index = FlatIndex::build(&root)?;
        Ok(Self { root, index })
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }
}

/// The published snapshot. Replaced as a whole, never mutated.
#[derive(Debug, Clone)]
pub struct SharedSnapshot(Arc<RwLock<Arc<LibrarySnapshot>>>);

impl SharedSnapshot {
    fn new(snapshot: LibrarySnapshot) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(snapshot))))
    }

    /// Current snapshot. Holders keep a consistent view across later swaps.
    pub fn load(&self) -> Arc<LibrarySnapshot> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, snapshot: Arc<LibrarySnapshot>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

/// Album library backed by a cached, periodically refreshed tree.
pub struct AudioLibrary {
    config: LibraryConfig,
    published: SharedSnapshot,
    store: CacheStore,
    images: Option<ImageCache>,
    events: broadcast::Sender<LibraryEvent>,
}

impl AudioLibrary {
    /// Open the library.
    ///
    /// Loads the cached tree if there is a usable one; otherwise scans the
    /// library directories synchronously and caches the result. Fails with
    /// [`LibraryError::EmptyLibrary`] if that scan finds no album.
    pub fn open(config: LibraryConfig) -> Result<Self, LibraryError> {
        config.validate()?;
        let store = CacheStore::new(config.tree_cache_file());

        let snapshot = match Self::load_cached(&store) {
            Some(snapshot) => snapshot,
            None => {
                let root = Scanner::from_config(&config).scan(&config.root_dirs)?;
                if root.album_count() == 0 {
                    return Err(LibraryError::EmptyLibrary);
                }
                let snapshot = LibrarySnapshot::new(root)?;
                if let Err(e) = store.save(snapshot.root()) {
                    tracing::warn!("Failed to save library cache: {}", e);
                }
                snapshot
            }
        };
        tracing::info!("Library ready with {} albums", snapshot.index().len());

        let images = config
            .image_cache_enabled
            .then(|| ImageCache::new(config.image_cache_dir()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            config,
            published: SharedSnapshot::new(snapshot),
            store,
            images,
            events,
        })
    }

    fn load_cached(store: &CacheStore) -> Option<LibrarySnapshot> {
        let root = store.load()?;
        match LibrarySnapshot::new(root) {
            Ok(snapshot) if !snapshot.index().is_empty() => Some(snapshot),
            Ok(_) => {
                tracing::warn!("Cached library is empty; rescanning");
                None
            }
            Err(e) => {
                tracing::warn!("Cached library is invalid ({}); rescanning", e);
                None
            }
        }
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// Current snapshot of the tree and index.
    pub fn snapshot(&self) -> Arc<LibrarySnapshot> {
        self.published.load()
    }

    /// Album names in the given order.
    pub fn album_names(&self, order: SortOrder) -> Vec<String> {
        self.snapshot().index().list(order).to_vec()
    }

    /// Most recently modified album names first, at most `limit`.
    pub fn recent_albums(&self, limit: usize) -> Vec<String> {
        self.snapshot()
            .index()
            .recent(limit)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn album(&self, name: &str) -> Option<Album> {
        self.snapshot().index().album(name).cloned()
    }

    /// Album following `name`; the first album if `name` is unknown.
    pub fn next_album(&self, name: &str, order: SortOrder) -> Option<String> {
        self.snapshot()
            .index()
            .next(name, order)
            .map(str::to_string)
    }

    /// Album preceding `name`, wrapping around.
    pub fn previous_album(&self, name: &str, order: SortOrder) -> Option<String> {
        self.snapshot()
            .index()
            .previous(name, order)
            .map(str::to_string)
    }

    /// Image to show for an album.
    ///
    /// With the image cache enabled this is the mirrored copy, created on
    /// first use. Falls back to the source image if copying fails.
    pub fn cover_image(&self, name: &str) -> Option<PathBuf> {
        let album = self.album(name)?;
        let source = album.cover_image()?;
        let Some(images) = &self.images else {
            return Some(source.to_path_buf());
        };
        match images.cached_copy(source) {
            Ok(cached) => Some(cached),
            Err(e) => {
                tracing::warn!("Failed to cache image for {}: {}", name, e);
                Some(source.to_path_buf())
            }
        }
    }

    /// Receive a [`LibraryEvent`] after every refresh that changed something.
    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.events.subscribe()
    }

    /// Build the scheduler that refreshes this library.
    ///
    /// Only one scheduler should run per library.
    pub fn scheduler(&self) -> RefreshScheduler {
        let mut scanner = Scanner::from_config(&self.config);
        if !self.config.scan_throttle.is_zero() {
            scanner = scanner.with_throttle(self.config.scan_throttle);
        }
        RefreshScheduler::new(
            scanner,
            self.config.root_dirs.clone(),
            self.published.clone(),
            self.store.clone(),
            self.images.clone(),
            self.events.clone(),
            self.config.refresh_warmup,
            self.config.refresh_interval,
        )
    }

    /// Start refreshing in the background on the current Tokio runtime.
    pub fn start_refresh(&self) -> RefreshHandle {
        AutoRefresher::new(self.scheduler(), self.config.tick_interval).start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn config(music: &Path, cache: &Path) -> LibraryConfig {
        LibraryConfig::new([music]).with_cache_dir(cache)
    }

    #[test]
    fn test_open_scans_and_caches() {
        let music = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&music.path().join("A/song.mp3"));
        touch(&music.path().join("B/sub/song.mp3"));

        let library = AudioLibrary::open(config(music.path(), cache.path())).unwrap();
        assert_eq!(library.album_names(SortOrder::Full), vec!["A", "Bsub"]);
        assert_eq!(library.album_names(SortOrder::FirstPerGroup), vec!["Bsub"]);
        assert!(cache.path().join("library.json").exists());
    }

    #[test]
    fn test_open_prefers_cache() {
        let music = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&music.path().join("A/song.mp3"));
        AudioLibrary::open(config(music.path(), cache.path())).unwrap();

        // Not visible until a refresh, because the cache is used.
        touch(&music.path().join("B/song.mp3"));
        let library = AudioLibrary::open(config(music.path(), cache.path())).unwrap();
        assert_eq!(library.album_names(SortOrder::Full), vec!["A"]);
    }

    #[test]
    fn test_open_rescans_corrupt_cache() {
        let music = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&music.path().join("A/song.mp3"));
        fs::write(cache.path().join("library.json"), b"garbage").unwrap();

        let library = AudioLibrary::open(config(music.path(), cache.path())).unwrap();
        assert_eq!(library.album_names(SortOrder::Full), vec!["A"]);
    }

    #[test]
    fn test_open_empty_library_fails() {
        let music = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&music.path().join("Docs/readme.txt"));

        let result = AudioLibrary::open(config(music.path(), cache.path()));
        assert!(matches!(result, Err(LibraryError::EmptyLibrary)));
    }

    #[test]
    fn test_open_without_dirs_fails() {
        let cache = TempDir::new().unwrap();
        let result = AudioLibrary::open(LibraryConfig::default().with_cache_dir(cache.path()));
        assert!(matches!(result, Err(LibraryError::Config(_))));
    }

    #[test]
    fn test_album_lookup_and_navigation() {
        let music = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        for name in ["A", "B", "C"] {
            touch(&music.path().join(name).join("1.mp3"));
        }
        let library = AudioLibrary::open(config(music.path(), cache.path())).unwrap();

        let album = library.album("B").unwrap();
        assert_eq!(album.display_name(), "B");
        assert_eq!(album.audio_files(), &[music.path().join("B/1.mp3")]);
        assert!(library.album("Z").is_none());

        assert_eq!(library.next_album("C", SortOrder::Full).as_deref(), Some("A"));
        assert_eq!(library.previous_album("A", SortOrder::Full).as_deref(), Some("C"));
        assert_eq!(library.next_album("gone", SortOrder::Full).as_deref(), Some("A"));
        assert_eq!(library.recent_albums(20).len(), 3);
    }

    #[test]
    fn test_cover_image_uses_mirror() {
        let music = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&music.path().join("A/1.mp3"));
        touch(&music.path().join("A/cover.jpg"));
        let library = AudioLibrary::open(config(music.path(), cache.path())).unwrap();

        let cover = library.cover_image("A").unwrap();
        assert!(cover.starts_with(cache.path().join("images")));
        assert!(cover.exists());
    }

    #[test]
    fn test_cover_image_without_mirror() {
        let music = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&music.path().join("A/1.mp3"));
        touch(&music.path().join("A/cover.jpg"));
        let mut config = config(music.path(), cache.path());
        config.image_cache_enabled = false;
        let library = AudioLibrary::open(config).unwrap();

        assert_eq!(library.cover_image("A"), Some(music.path().join("A/cover.jpg")));
        assert!(!cache.path().join("images").exists());
    }

    #[test]
    fn test_snapshot_is_frozen() {
        let music = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&music.path().join("A/1.mp3"));
        let library = AudioLibrary::open(config(music.path(), cache.path())).unwrap();

        let before = library.snapshot();
        let replacement = {
            let mut root = Group::root();
            let album = Album::new(
                "Z",
                "/z",
                vec!["/z/1.mp3".into()],
                Vec::new(),
                chrono::Utc::now(),
            )
            .unwrap();
            root.insert(album.into()).unwrap();
            LibrarySnapshot::new(root).unwrap()
        };
        library.published.store(Arc::new(replacement));

        assert_eq!(before.index().list(SortOrder::Full), &["A"]);
        assert_eq!(library.album_names(SortOrder::Full), vec!["Z"]);
    }
}
