//! Models for the album library.

pub mod tree;

pub use tree::{Album, Group, Node, ROOT_GROUP_NAME, derive_name};
