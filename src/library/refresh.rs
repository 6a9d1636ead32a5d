//! Background refresh of the album tree.
//!
//! [`RefreshScheduler`] is a small state machine driven by a foreground tick:
//!
//! * `Idle`: once the refresh interval has elapsed, a throttled scan is
//!   launched on the blocking thread pool and the scheduler becomes `Updating`.
//! * `Updating`: the background task scans, compares the candidate tree with
//!   the published one and reconciles the image cache. Its single result is
//!   handed back over a oneshot channel, after which the scheduler is `Done`.
//! * `Done`: the next tick publishes a changed tree (swap, persist, notify)
//!   or drops an unchanged one, then returns to `Idle`.
//!
//! Failed cycles are logged and leave the published tree untouched.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;

use crate::cache::{CacheStore, ImageCache};
use crate::error::LibraryError;
use crate::scanner::{Scanner, StopSignal};

use super::{LibraryEvent, LibrarySnapshot, SharedSnapshot};

/// Externally visible scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Waiting for the next refresh to become due.
    Idle,
    /// A background scan is running.
    Updating,
    /// A background scan finished; the next tick applies its result.
    Done,
}

/// What a background cycle found.
enum CycleOutcome {
    Changed(Arc<LibrarySnapshot>),
    Unchanged,
    Failed(LibraryError),
}

/// Result handed from the background task to the foreground tick.
struct CycleReport {
    outcome: CycleOutcome,
    images_changed: bool,
}

enum Phase {
    Idle {
        due: Instant,
    },
    Updating {
        result: oneshot::Receiver<CycleReport>,
        task: JoinHandle<()>,
    },
}

/// Periodically rescans the library and publishes changed trees.
pub struct RefreshScheduler {
    scanner: Scanner,
    roots: Vec<PathBuf>,
    published: SharedSnapshot,
    store: CacheStore,
    images: Option<ImageCache>,
    events: broadcast::Sender<LibraryEvent>,
    interval: Duration,
    stop: StopSignal,
    phase: Phase,
    cycles_started: u64,
    cycles_completed: u64,
}

impl RefreshScheduler {
    /// Create a scheduler whose first cycle becomes due after `warmup`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scanner: Scanner,
        roots: Vec<PathBuf>,
        published: SharedSnapshot,
        store: CacheStore,
        images: Option<ImageCache>,
        events: broadcast::Sender<LibraryEvent>,
        warmup: Duration,
        interval: Duration,
    ) -> Self {
        let stop = StopSignal::new();
        Self {
            scanner: scanner.with_stop_signal(stop.clone()),
            roots,
            published,
            store,
            images,
            events,
            interval,
            stop,
            phase: Phase::Idle {
                due: Instant::now() + warmup,
            },
            cycles_started: 0,
            cycles_completed: 0,
        }
    }

    pub fn state(&self) -> RefreshState {
        match &self.phase {
            Phase::Idle { .. } => RefreshState::Idle,
            Phase::Updating { task, .. } if task.is_finished() => RefreshState::Done,
            Phase::Updating { .. } => RefreshState::Updating,
        }
    }

    /// Number of background scans launched so far.
    pub fn cycles_started(&self) -> u64 {
        self.cycles_started
    }

    /// Number of cycles whose result has been applied.
    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// Advance the state machine. Never blocks on a scan.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Advance the state machine as if the current time were `now`.
    pub fn tick_at(&mut self, now: Instant) {
        if let Phase::Idle { due } = self.phase {
            if now >= due && !self.stop.is_requested() {
                self.launch();
            }
            return;
        }

        let report = match &mut self.phase {
            Phase::Idle { .. } => return,
            Phase::Updating { result, .. } => match result.try_recv() {
                Ok(report) => Some(report),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Closed) => None,
            },
        };

        match report {
            Some(report) => self.apply(report),
            None => tracing::error!("Background refresh ended without a result"),
        }
        self.cycles_completed += 1;
        self.phase = Phase::Idle {
            due: now + self.interval,
        };
    }

    fn launch(&mut self) {
        let scanner = self.scanner.clone();
        let roots = self.roots.clone();
        let current = self.published.load();
        let images = self.images.clone();
        let (tx, rx) = oneshot::channel();

        tracing::info!("Starting background library refresh");
        let task = tokio::task::spawn_blocking(move || {
            let report = run_cycle(&scanner, &roots, &current, images.as_ref());
            let _ = tx.send(report);
        });

        self.cycles_started += 1;
        self.phase = Phase::Updating { result: rx, task };
    }

    fn apply(&mut self, report: CycleReport) {
        match report.outcome {
            CycleOutcome::Changed(snapshot) => {
                self.published.store(snapshot.clone());
                tracing::info!(
                    "Library changed: {} albums published",
                    snapshot.index().len()
                );
                if let Err(e) = self.store.save(snapshot.root()) {
                    tracing::error!("Failed to save library cache: {}", e);
                }
                let _ = self.events.send(LibraryEvent::ContentChanged);
            }
            CycleOutcome::Unchanged => {
                tracing::debug!("Library unchanged");
                if report.images_changed {
                    let _ = self.events.send(LibraryEvent::ImagesChanged);
                }
            }
            CycleOutcome::Failed(LibraryError::Cancelled) => {
                tracing::info!("Background library refresh cancelled");
            }
            CycleOutcome::Failed(e) => {
                tracing::error!("Background library refresh failed: {}", e);
                if report.images_changed {
                    let _ = self.events.send(LibraryEvent::ImagesChanged);
                }
            }
        }
    }

    /// Stop launching scans, cancel the running one and wait for it to end.
    pub async fn shutdown(&mut self) {
        self.stop.request();
        let phase = std::mem::replace(
            &mut self.phase,
            Phase::Idle {
                due: Instant::now(),
            },
        );
        if let Phase::Updating { task, .. } = phase
            && let Err(e) = task.await
        {
            tracing::error!("Background refresh task panicked: {}", e);
        }
    }
}

/// Scan, compare with `current` and reconcile the image cache.
fn run_cycle(
    scanner: &Scanner,
    roots: &[PathBuf],
    current: &LibrarySnapshot,
    images: Option<&ImageCache>,
) -> CycleReport {
    let outcome = match scanner.scan(roots) {
        Ok(root) if root.album_count() == 0 => CycleOutcome::Failed(LibraryError::EmptyLibrary),
        Ok(root) if root == *current.root() => CycleOutcome::Unchanged,
        Ok(root) => match LibrarySnapshot::new(root) {
            Ok(snapshot) => CycleOutcome::Changed(Arc::new(snapshot)),
            Err(e) => CycleOutcome::Failed(e),
        },
        Err(e) => CycleOutcome::Failed(e),
    };

    let images_changed = match (&outcome, images) {
        (CycleOutcome::Failed(LibraryError::Cancelled), _) | (_, None) => false,
        (_, Some(images)) => images.reconcile(),
    };

    CycleReport {
        outcome,
        images_changed,
    }
}

/// Drives a [`RefreshScheduler`] from a Tokio task.
pub struct AutoRefresher {
    scheduler: RefreshScheduler,
    tick_interval: Duration,
}

impl AutoRefresher {
    pub fn new(scheduler: RefreshScheduler, tick_interval: Duration) -> Self {
        Self {
            scheduler,
            tick_interval,
        }
    }

    /// Start ticking in the background.
    /// Returns a handle that can be used to stop the refresher.
    pub fn start(self) -> RefreshHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(Self::run_tick_loop(
            self.scheduler,
            self.tick_interval,
            shutdown_rx,
        ));
        RefreshHandle { shutdown_tx, task }
    }

    async fn run_tick_loop(
        mut scheduler: RefreshScheduler,
        tick_interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        tracing::info!("Auto-refresh started with tick {:?}", tick_interval);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(tick_interval) => {
                    scheduler.tick();
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Auto-refresh received shutdown signal");
                        break;
                    }
                }
            }
        }

        scheduler.shutdown().await;
        tracing::info!("Auto-refresh stopped");
    }
}

/// Handle for controlling the auto refresher.
pub struct RefreshHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stop the refresher and wait until any running scan has ended.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Auto-refresh task panicked: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::library::{AudioLibrary, SortOrder};
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::broadcast::error::TryRecvError as EventRecvError;

    struct Fixture {
        music: TempDir,
        cache: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let fixture = Self {
                music: TempDir::new().unwrap(),
                cache: TempDir::new().unwrap(),
            };
            fixture.touch("A/1.mp3");
            fixture.touch("B/sub/1.mp3");
            fixture
        }

        fn touch(&self, relative: &str) {
            let path = self.music.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"x").unwrap();
        }

        fn config(&self) -> LibraryConfig {
            let mut config =
                LibraryConfig::new([self.music.path()]).with_cache_dir(self.cache.path());
            config.refresh_warmup = Duration::ZERO;
            config.refresh_interval = Duration::ZERO;
            config.scan_throttle = Duration::ZERO;
            config.tick_interval = Duration::from_millis(5);
            config
        }

        fn cache_file(&self) -> std::path::PathBuf {
            self.cache.path().join("library.json")
        }
    }

    async fn run_cycle(scheduler: &mut RefreshScheduler) {
        let before = scheduler.cycles_completed();
        scheduler.tick();
        assert_ne!(scheduler.state(), RefreshState::Idle);

        let wait = async {
            while scheduler.cycles_completed() == before {
                tokio::time::sleep(Duration::from_millis(5)).await;
                scheduler.tick();
            }
        };
        tokio::time::timeout(Duration::from_secs(10), wait)
            .await
            .expect("refresh cycle timed out");
        assert_eq!(scheduler.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_unchanged_cycle_is_silent() {
        let f = Fixture::new();
        let library = AudioLibrary::open(f.config()).unwrap();
        let mut events = library.subscribe();
        let before = library.snapshot();
        fs::remove_file(f.cache_file()).unwrap();

        let mut scheduler = library.scheduler();
        run_cycle(&mut scheduler).await;

        assert!(matches!(events.try_recv(), Err(EventRecvError::Empty)));
        assert!(!f.cache_file().exists());
        assert!(Arc::ptr_eq(&before, &library.snapshot()));
    }

    #[tokio::test]
    async fn test_new_album_is_published() {
        let f = Fixture::new();
        let library = AudioLibrary::open(f.config()).unwrap();
        let mut events = library.subscribe();
        let before = library.snapshot();

        f.touch("C/1.mp3");
        let mut scheduler = library.scheduler();
        run_cycle(&mut scheduler).await;

        assert_eq!(events.try_recv(), Ok(LibraryEvent::ContentChanged));
        assert_eq!(library.album_names(SortOrder::Full), vec!["A", "Bsub", "C"]);
        assert_eq!(before.index().list(SortOrder::Full), &["A", "Bsub"]);

        let cached = CacheStore::new(f.cache_file()).load().unwrap();
        assert_eq!(&cached, library.snapshot().root());
    }

    #[tokio::test]
    async fn test_second_cycle_after_change_is_silent() {
        let f = Fixture::new();
        let library = AudioLibrary::open(f.config()).unwrap();
        let mut events = library.subscribe();

        f.touch("C/1.mp3");
        let mut scheduler = library.scheduler();
        run_cycle(&mut scheduler).await;
        assert_eq!(events.try_recv(), Ok(LibraryEvent::ContentChanged));

        run_cycle(&mut scheduler).await;
        assert!(matches!(events.try_recv(), Err(EventRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_duplicate_name_keeps_published_tree() {
        let f = Fixture::new();
        let other = TempDir::new().unwrap();
        fs::create_dir_all(other.path().join("D")).unwrap();
        fs::write(other.path().join("D/1.mp3"), b"x").unwrap();

        let mut config = f.config();
        config.root_dirs.push(other.path().to_path_buf());
        let library = AudioLibrary::open(config).unwrap();
        let mut events = library.subscribe();
        let before = library.snapshot();

        fs::create_dir_all(other.path().join("A")).unwrap();
        fs::write(other.path().join("A/1.mp3"), b"x").unwrap();
        let mut scheduler = library.scheduler();
        run_cycle(&mut scheduler).await;

        assert!(matches!(events.try_recv(), Err(EventRecvError::Empty)));
        assert!(Arc::ptr_eq(&before, &library.snapshot()));
        assert_eq!(library.album_names(SortOrder::Full), vec!["A", "Bsub", "D"]);
    }

    #[tokio::test]
    async fn test_emptied_library_keeps_published_tree() {
        let f = Fixture::new();
        let library = AudioLibrary::open(f.config()).unwrap();
        let before = library.snapshot();

        fs::remove_dir_all(f.music.path().join("A")).unwrap();
        fs::remove_dir_all(f.music.path().join("B")).unwrap();
        let mut scheduler = library.scheduler();
        run_cycle(&mut scheduler).await;

        assert!(Arc::ptr_eq(&before, &library.snapshot()));

        // Recovers once albums appear again.
        f.touch("E/1.mp3");
        run_cycle(&mut scheduler).await;
        assert_eq!(library.album_names(SortOrder::Full), vec!["E"]);
    }

    #[tokio::test]
    async fn test_warmup_delays_first_cycle() {
        let f = Fixture::new();
        let mut config = f.config();
        config.refresh_warmup = Duration::from_secs(3600);
        let library = AudioLibrary::open(config).unwrap();

        let mut scheduler = library.scheduler();
        scheduler.tick();
        assert_eq!(scheduler.state(), RefreshState::Idle);
        assert_eq!(scheduler.cycles_started(), 0);

        scheduler.tick_at(Instant::now() + Duration::from_secs(3601));
        assert_eq!(scheduler.cycles_started(), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_interval_applies_after_cycle() {
        let f = Fixture::new();
        let mut config = f.config();
        config.refresh_interval = Duration::from_secs(3600);
        let library = AudioLibrary::open(config).unwrap();

        let mut scheduler = library.scheduler();
        run_cycle(&mut scheduler).await;
        scheduler.tick();
        assert_eq!(scheduler.state(), RefreshState::Idle);
        assert_eq!(scheduler.cycles_started(), 1);
    }

    #[tokio::test]
    async fn test_single_scan_in_flight_and_shutdown() {
        let f = Fixture::new();
        for i in 0..20 {
            f.touch(&format!("Many/{i:02}.mp3"));
        }
        let mut config = f.config();
        config.scan_throttle = Duration::from_millis(50);
        let library = AudioLibrary::open(config).unwrap();
        let mut events = library.subscribe();
        let before = library.snapshot();

        let mut scheduler = library.scheduler();
        scheduler.tick();
        scheduler.tick();
        scheduler.tick();
        assert_eq!(scheduler.state(), RefreshState::Updating);
        assert_eq!(scheduler.cycles_started(), 1);

        scheduler.shutdown().await;
        assert_eq!(scheduler.state(), RefreshState::Idle);

        // Stopped schedulers never launch again.
        scheduler.tick();
        assert_eq!(scheduler.cycles_started(), 1);
        assert!(matches!(events.try_recv(), Err(EventRecvError::Empty)));
        assert!(Arc::ptr_eq(&before, &library.snapshot()));
    }

    #[tokio::test]
    async fn test_stale_image_notifies_images_changed() {
        let f = Fixture::new();
        f.touch("A/cover.jpg");
        let library = AudioLibrary::open(f.config()).unwrap();
        let mut events = library.subscribe();
        let cached = library.cover_image("A").unwrap();

        fs::write(f.music.path().join("A/cover.jpg"), b"resized").unwrap();
        let mut scheduler = library.scheduler();
        run_cycle(&mut scheduler).await;

        assert_eq!(events.try_recv(), Ok(LibraryEvent::ImagesChanged));
        assert!(!cached.exists());
    }

    #[tokio::test]
    async fn test_auto_refresher_publishes_and_stops() {
        let f = Fixture::new();
        let library = AudioLibrary::open(f.config()).unwrap();
        let mut events = library.subscribe();

        f.touch("C/1.mp3");
        let handle = library.start_refresh();
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("no refresh event")
            .unwrap();
        handle.stop().await;

        assert_eq!(event, LibraryEvent::ContentChanged);
        assert!(library.album_names(SortOrder::Full).contains(&"C".to_string()));
    }
}
