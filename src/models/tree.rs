//! Album tree model.
//!
//! The library is a tree of [`Group`]s whose leaves are [`Album`]s. Trees are
//! never mutated once published; a refresh builds a new tree and the two are
//! compared with the structural equality implemented here.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::LibraryError;

/// Name of the synthetic root group. Top-level names are derived from it,
/// so it contributes nothing to them.
pub const ROOT_GROUP_NAME: &str = "";

/// Derive the name of a child node from its parent's name and its directory name.
///
/// Whitespace and path separators are stripped so the result is stable and
/// usable as a map key.
///
/// ```
/// use albumshelf::models::derive_name;
///
/// assert_eq!(derive_name("", "A"), "A");
/// assert_eq!(derive_name("B", "sub"), "Bsub");
/// assert_eq!(derive_name("Jazz", "Kind of Blue"), "JazzKindofBlue");
/// ```
pub fn derive_name(parent: &str, segment: &str) -> String {
    parent
        .chars()
        .chain(segment.chars())
        .filter(|c| !c.is_whitespace() && *c != '/' && *c != '\\')
        .collect()
}

/// A directory holding at least one audio file.
#[derive(Debug, Clone)]
pub struct Album {
    name: String,
    path: PathBuf,
    audio_files: Vec<PathBuf>,
    image_files: Vec<PathBuf>,
    modified: DateTime<Utc>,
}

impl Album {
    /// Create an album. File lists are sorted and deduplicated.
    ///
    /// Returns `None` when `audio_files` is empty, since such a directory is
    /// not an album.
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        mut audio_files: Vec<PathBuf>,
        mut image_files: Vec<PathBuf>,
        modified: DateTime<Utc>,
    ) -> Option<Self> {
        if audio_files.is_empty() {
            return None;
        }
        audio_files.sort();
        audio_files.dedup();
        image_files.sort();
        image_files.dedup();

        Some(Self {
            name: name.into(),
            path: path.into(),
            audio_files,
            image_files,
            modified,
        })
    }

    /// Unique name of the album, derived from its path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the album directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sorted absolute paths of the audio files.
    pub fn audio_files(&self) -> &[PathBuf] {
        &self.audio_files
    }

    /// Sorted absolute paths of the image files.
    pub fn image_files(&self) -> &[PathBuf] {
        &self.image_files
    }

    /// Modification time of the album directory at scan time.
    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    /// Image shown for the album, the first one in sort order.
    pub fn cover_image(&self) -> Option<&Path> {
        self.image_files.first().map(PathBuf::as_path)
    }

    /// Text shown for an album without image: the directory name.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    /// Audio files relative to the album directory.
    pub fn relative_audio_files(&self) -> Vec<&Path> {
        self.audio_files
            .iter()
            .map(|file| file.strip_prefix(&self.path).unwrap_or(file))
            .collect()
    }
}

/// Albums are equal when they describe the same directory content.
impl PartialEq for Album {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.audio_files == other.audio_files
            && self.image_files == other.image_files
            && self.modified == other.modified
    }
}

impl Eq for Album {}

/// A directory aggregating albums and other groups.
#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    children: BTreeMap<String, Node>,
    images: Vec<PathBuf>,
}

impl Group {
    /// Create an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: BTreeMap::new(),
            images: Vec::new(),
        }
    }

    /// Create the synthetic root group.
    pub fn root() -> Self {
        Self::new(ROOT_GROUP_NAME)
    }

    /// Hierarchical name of the group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Loose images found directly in the group directory, sorted.
    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    /// Replace the loose images. The list is sorted and deduplicated.
    pub fn set_images(&mut self, mut images: Vec<PathBuf>) {
        images.sort();
        images.dedup();
        self.images = images;
    }

    /// Add a child node.
    ///
    /// Fails with [`LibraryError::DuplicateAlbumName`] if a child with the same
    /// name already exists.
    pub fn insert(&mut self, child: Node) -> Result<(), LibraryError> {
        match self.children.entry(child.name().to_string()) {
            Entry::Occupied(entry) => Err(LibraryError::DuplicateAlbumName(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(child);
                Ok(())
            }
        }
    }

    /// Child with the given name.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    /// Children in ascending name order.
    pub fn children(&self) -> impl Iterator<Item = &Node> {
        self.children.values()
    }

    /// Child names in ascending order.
    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// All albums below this group, in pre-order.
    pub fn albums(&self) -> Vec<&Album> {
        let mut albums = Vec::new();
        self.collect_albums(&mut albums);
        albums
    }

    fn collect_albums<'a>(&'a self, out: &mut Vec<&'a Album>) {
        for child in self.children.values() {
            match child {
                Node::Album(album) => out.push(album),
                Node::Group(group) => group.collect_albums(out),
            }
        }
    }

    /// Number of albums below this group.
    pub fn album_count(&self) -> usize {
        self.children
            .values()
            .map(|child| match child {
                Node::Album(_) => 1,
                Node::Group(group) => group.album_count(),
            })
            .sum()
    }

    /// First album in name order, descending into the first child while it is a group.
    pub fn first_album(&self) -> Option<&Album> {
        match self.children.values().next()? {
            Node::Album(album) => Some(album),
            Node::Group(group) => group.first_album(),
        }
    }
}

/// Groups are equal when their loose images match and they hold equal
/// children under the same names. Child insertion order never matters.
impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.images == other.images && self.children == other.children
    }
}

impl Eq for Group {}

/// A node of the album tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Album(Album),
    Group(Group),
}

impl Node {
    /// Name of the node, unique among its siblings.
    pub fn name(&self) -> &str {
        match self {
            Node::Album(album) => album.name(),
            Node::Group(group) => group.name(),
        }
    }
}

impl From<Album> for Node {
    fn from(album: Album) -> Self {
        Node::Album(album)
    }
}

impl From<Group> for Node {
    fn from(group: Group) -> Self {
        Node::Group(group)
    }
}
