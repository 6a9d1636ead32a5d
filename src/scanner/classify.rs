//! Directory entry classification.
//!
//! Splits a directory listing into audio files, image files and
//! sub-directories using extension allow-lists.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::LibraryError;

/// Names starting with this marker are hidden and never classified.
pub const HIDDEN_MARKER: char = '.';

/// Kind of a classified file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Audio,
    Image,
}

/// Extension allow-lists for audio and image files.
///
/// Extensions include the leading dot and match case-sensitively.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    audio: HashSet<String>,
    image: HashSet<String>,
}

impl ExtensionFilter {
    pub fn new<A, I>(audio: A, image: I) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            audio: audio.into_iter().map(Into::into).collect(),
            image: image.into_iter().map(Into::into).collect(),
        }
    }

    /// Classify a file by name. Audio wins if an extension is in both lists.
    pub fn kind(&self, file_name: &str) -> Option<FileKind> {
        let ext = Path::new(file_name).extension()?.to_str()?;
        let ext = format!(".{ext}");
        if self.audio.contains(&ext) {
            Some(FileKind::Audio)
        } else if self.image.contains(&ext) {
            Some(FileKind::Image)
        } else {
            None
        }
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::new([".mp3"], [".png", ".jpg"])
    }
}

/// Result of classifying one directory. All lists are sorted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Classified {
    pub audio_files: Vec<PathBuf>,
    pub image_files: Vec<PathBuf>,
    pub subdirectories: Vec<PathBuf>,
}

/// Classify the entries of `dir`.
///
/// Unreadable entries are logged and skipped.
pub fn classify(dir: &Path, filter: &ExtensionFilter) -> Classified {
    // The hook never fails, so neither does the listing.
    classify_with(dir, filter, || Ok(())).unwrap_or_default()
}

/// Classify the entries of `dir`, calling `on_entry` after each visited entry.
///
/// An error from `on_entry` aborts the listing and is returned. IO errors on
/// individual entries, or on the directory itself, are logged and skipped.
pub fn classify_with<F>(
    dir: &Path,
    filter: &ExtensionFilter,
    mut on_entry: F,
) -> Result<Classified, LibraryError>
where
    F: FnMut() -> Result<(), LibraryError>,
{
    let mut classified = Classified::default();

    let entries = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                on_entry()?;
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(HIDDEN_MARKER) {
            on_entry()?;
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            classified.subdirectories.push(entry.into_path());
        } else if file_type.is_file() {
            match filter.kind(&name) {
                Some(FileKind::Audio) => classified.audio_files.push(entry.into_path()),
                Some(FileKind::Image) => classified.image_files.push(entry.into_path()),
                None => {}
            }
        }

        on_entry()?;
    }

    Ok(classified)
}
