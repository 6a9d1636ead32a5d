//! Album library for music players.
//!
//! Scans one or more music directories into a tree of album groups, caches
//! the tree on disk, and keeps it fresh with a throttled background refresh.

pub mod cache;
pub mod config;
pub mod error;
pub mod library;
pub mod models;
pub mod scanner;

pub use config::LibraryConfig;
pub use error::LibraryError;
pub use library::{AudioLibrary, LibraryEvent, SortOrder};
