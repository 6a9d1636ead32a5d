//! Tagged record encoding of the album tree.
//!
//! Every record carries a `type` tag (`Album` or `Group`). Group records hold
//! their children as a list; order is irrelevant because children are keyed
//! by name again when decoding.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LibraryError;
use crate::models::{Album, Group, Node};

/// Persisted form of a tree node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeRecord {
    Album {
        name: String,
        path: PathBuf,
        audio_files: Vec<PathBuf>,
        #[serde(default)]
        image_files: Vec<PathBuf>,
        modified: DateTime<Utc>,
    },
    Group {
        name: String,
        #[serde(default)]
        images: Vec<PathBuf>,
        #[serde(default)]
        children: Vec<NodeRecord>,
    },
}

/// Encode a node and everything below it.
pub fn encode(node: &Node) -> NodeRecord {
    match node {
        Node::Album(album) => NodeRecord::Album {
            name: album.name().to_string(),
            path: album.path().to_path_buf(),
            audio_files: album.audio_files().to_vec(),
            image_files: album.image_files().to_vec(),
            modified: album.modified(),
        },
        Node::Group(group) => encode_group(group),
    }
}

/// Encode a group, typically the tree root.
pub fn encode_group(group: &Group) -> NodeRecord {
    NodeRecord::Group {
        name: group.name().to_string(),
        images: group.images().to_vec(),
        children: group.children().map(encode).collect(),
    }
}

/// Decode a node. Nested groups must not be empty.
pub fn decode(record: NodeRecord) -> Result<Node, LibraryError> {
    match record {
        NodeRecord::Album {
            name,
            path,
            audio_files,
            image_files,
            modified,
        } => Album::new(name.clone(), path, audio_files, image_files, modified)
            .map(Node::Album)
            .ok_or_else(|| LibraryError::Format(format!("album {name} has no audio files"))),
        record @ NodeRecord::Group { .. } => {
            let group = decode_group(record)?;
            if group.is_empty() {
                return Err(LibraryError::Format(format!(
                    "group {} has no children",
                    group.name()
                )));
            }
            Ok(Node::Group(group))
        }
    }
}

/// Decode a record that must be a group. The group itself may be empty.
pub fn decode_group(record: NodeRecord) -> Result<Group, LibraryError> {
    let NodeRecord::Group {
        name,
        images,
        children,
    } = record
    else {
        return Err(LibraryError::Format(
            "expected a Group record, found an Album".to_string(),
        ));
    };

    let mut group = Group::new(name);
    group.set_images(images);
    for child in children {
        group.insert(decode(child)?).map_err(|e| match e {
            LibraryError::DuplicateAlbumName(name) => {
                LibraryError::Format(format!("duplicate child {name} in group {}", group.name()))
            }
            other => other,
        })?;
    }
    Ok(group)
}
