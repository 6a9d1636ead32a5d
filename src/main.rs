//! Album library command line tool.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use albumshelf::config::normalize_extension;
use albumshelf::{AudioLibrary, LibraryConfig, LibraryError, SortOrder};

/// Browse a music collection organised as album directories.
#[derive(Parser)]
#[command(name = "albumshelf")]
#[command(about = "Scan music directories into an album library")]
struct Cli {
    /// Directory for the library cache and image mirror
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Audio file extension, e.g. ".mp3" (repeatable)
    #[arg(long = "audio-ext", global = true)]
    audio_ext: Vec<String>,

    /// Image file extension, e.g. ".jpg" (repeatable)
    #[arg(long = "image-ext", global = true)]
    image_ext: Vec<String>,

    /// Seconds between background refreshes
    #[arg(long, global = true)]
    interval: Option<u64>,

    /// Do not mirror album images into the cache directory
    #[arg(long, global = true)]
    no_image_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the library and print every album with its files
    Scan {
        /// Library directories (defaults to ALBUMSHELF_DIRS)
        dirs: Vec<PathBuf>,

        /// Print file names relative to the album directory
        #[arg(long)]
        relative: bool,
    },

    /// List album names
    List {
        /// Library directories (defaults to ALBUMSHELF_DIRS)
        dirs: Vec<PathBuf>,

        /// Ordering: full, date or first-per-group
        #[arg(short, long, default_value = "full")]
        order: SortOrder,

        /// Only show the N most recently modified albums
        #[arg(long)]
        recent: Option<usize>,
    },

    /// Keep the library fresh and report changes until interrupted
    Watch {
        /// Library directories (defaults to ALBUMSHELF_DIRS)
        dirs: Vec<PathBuf>,
    },
}

impl Cli {
    /// Environment configuration with command line overrides applied.
    fn config(&self, dirs: &[PathBuf]) -> Result<LibraryConfig, LibraryError> {
        let mut config = LibraryConfig::from_env()?;
        self.apply_overrides(&mut config, dirs);
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut LibraryConfig, dirs: &[PathBuf]) {
        if !dirs.is_empty() {
            config.root_dirs = dirs.to_vec();
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        if !self.audio_ext.is_empty() {
            config.audio_extensions = normalize_extensions(&self.audio_ext);
        }
        if !self.image_ext.is_empty() {
            config.image_extensions = normalize_extensions(&self.image_ext);
        }
        if let Some(secs) = self.interval {
            config.refresh_interval = Duration::from_secs(secs);
        }
        if self.no_image_cache {
            config.image_cache_enabled = false;
        }
    }
}

fn normalize_extensions(exts: &[String]) -> Vec<String> {
    exts.iter()
        .filter(|ext| !ext.trim().is_empty())
        .map(|ext| normalize_extension(ext))
        .collect()
}

fn open_library(cli: &Cli, dirs: &[PathBuf]) -> AudioLibrary {
    let library = cli
        .config(dirs)
        .and_then(AudioLibrary::open);
    match library {
        Ok(library) => library,
        Err(LibraryError::EmptyLibrary) => {
            eprintln!("No albums found. Check the library directories and audio extensions.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to open library: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_albums(library: &AudioLibrary, relative: bool) {
    let names = library.album_names(SortOrder::Full);
    for name in &names {
        let Some(album) = library.album(name) else {
            continue;
        };
        println!("{}", name);
        println!("  Path:  {}", album.path().display());
        match library.cover_image(name) {
            Some(cover) => println!("  Cover: {}", cover.display()),
            None => println!("  Cover: none ({})", album.display_name()),
        }
        if relative {
            for file in album.relative_audio_files() {
                println!("    {}", file.display());
            }
        } else {
            for file in album.audio_files() {
                println!("    {}", file.display());
            }
        }
    }
    println!("\n{} albums", names.len());
}

async fn watch(library: AudioLibrary) {
    let mut events = library.subscribe();
    let handle = library.start_refresh();
    tracing::info!(
        "Watching {} albums, refreshing every {:?}",
        library.snapshot().index().len(),
        library.config().refresh_interval
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    tracing::info!(
                        "{:?}: {} albums",
                        event,
                        library.snapshot().index().len()
                    );
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Missed {} library events", missed);
                }
                Err(RecvError::Closed) => break,
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
        }
    }

    tracing::info!("Shutting down");
    handle.stop().await;
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "albumshelf=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &cli.command {
        Commands::Scan { dirs, relative } => {
            let library = open_library(&cli, dirs);
            print_albums(&library, *relative);
        }
        Commands::List {
            dirs,
            order,
            recent,
        } => {
            let library = open_library(&cli, dirs);
            let names = match recent {
                Some(limit) => library.recent_albums(*limit),
                None => library.album_names(*order),
            };
            for name in names {
                println!("{}", name);
            }
        }
        Commands::Watch { dirs } => {
            let library = open_library(&cli, dirs);
            watch(library).await;
        }
    }
}
