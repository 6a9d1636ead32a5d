//! Flat, sorted views over the albums of a tree.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::str::FromStr;

use crate::error::LibraryError;
use crate::models::{Album, Group, Node};

/// Album list orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    /// All albums by name.
    #[default]
    Full,
    /// All albums by directory modification time, oldest first.
    Date,
    /// The first album of every top-level group.
    FirstPerGroup,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Full => "full",
            SortOrder::Date => "date",
            SortOrder::FirstPerGroup => "first-per-group",
        })
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" | "name" => Ok(SortOrder::Full),
            "date" => Ok(SortOrder::Date),
            "first-per-group" | "group" => Ok(SortOrder::FirstPerGroup),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// Name-keyed album map plus precomputed orderings.
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    albums: HashMap<String, Album>,
    by_name: Vec<String>,
    by_date: Vec<String>,
    first_per_group: Vec<String>,
}

impl FlatIndex {
    /// Index every album of `root`.
    ///
    /// Fails with [`LibraryError::DuplicateAlbumName`] if two albums anywhere
    /// in the tree share a name.
    pub fn build(root: &Group) -> Result<Self, LibraryError> {
        let mut albums = HashMap::new();
        for album in root.albums() {
            match albums.entry(album.name().to_string()) {
                Entry::Occupied(entry) => {
                    return Err(LibraryError::DuplicateAlbumName(entry.key().clone()));
                }
                Entry::Vacant(entry) => {
                    entry.insert(album.clone());
                }
            }
        }

        let mut by_name: Vec<String> = albums.keys().cloned().collect();
        by_name.sort();

        let mut by_date = by_name.clone();
        by_date.sort_by(|a, b| {
            let (left, right) = (&albums[a], &albums[b]);
            left.modified()
                .cmp(&right.modified())
                .then_with(|| a.cmp(b))
        });

        let first_per_group = root
            .children()
            .filter_map(|child| match child {
                Node::Group(group) => group.first_album(),
                Node::Album(_) => None,
            })
            .map(|album| album.name().to_string())
            .collect();

        Ok(Self {
            albums,
            by_name,
            by_date,
            first_per_group,
        })
    }

    pub fn len(&self) -> usize {
        self.albums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.albums.is_empty()
    }

    /// Album with the given name.
    pub fn album(&self, name: &str) -> Option<&Album> {
        self.albums.get(name)
    }

    /// Album names in the given order.
    pub fn list(&self, order: SortOrder) -> &[String] {
        match order {
            SortOrder::Full => &self.by_name,
            SortOrder::Date => &self.by_date,
            SortOrder::FirstPerGroup => &self.first_per_group,
        }
    }

    /// Most recently modified albums first, at most `limit` of them.
    pub fn recent(&self, limit: usize) -> Vec<&str> {
        self.by_date
            .iter()
            .rev()
            .take(limit)
            .map(String::as_str)
            .collect()
    }

    /// Album after `name`, wrapping to the first one.
    ///
    /// An unknown name counts as position -1, so the first album is returned.
    pub fn next(&self, name: &str, order: SortOrder) -> Option<&str> {
        self.step(name, order, 1)
    }

    /// Album before `name`, wrapping to the last one.
    ///
    /// An unknown name counts as position -1, i.e. the last album, so the
    /// one before it is returned.
    pub fn previous(&self, name: &str, order: SortOrder) -> Option<&str> {
        self.step(name, order, -1)
    }

    fn step(&self, name: &str, order: SortOrder, offset: isize) -> Option<&str> {
        let list = self.list(order);
        if list.is_empty() {
            return None;
        }
        let len = list.len() as isize;
        let position = list
            .iter()
            .position(|entry| entry == name)
            .map_or(-1, |i| i as isize);
        let target = (position + offset).rem_euclid(len) as usize;
        list.get(target).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn album(name: &str, secs: i64) -> Node {
        let path = PathBuf::from("/m").join(name);
        Album::new(
            name,
            &path,
            vec![path.join("1.mp3")],
            Vec::new(),
            Utc.timestamp_opt(secs, 0).unwrap(),
        )
        .unwrap()
        .into()
    }

    fn flat(names: &[&str]) -> FlatIndex {
        let mut root = Group::root();
        for (i, name) in names.iter().enumerate() {
            root.insert(album(name, i as i64)).unwrap();
        }
        FlatIndex::build(&root).unwrap()
    }

    #[test]
    fn test_full_list_is_sorted() {
        let index = flat(&["C", "A", "B"]);
        assert_eq!(index.list(SortOrder::Full), &["A", "B", "C"]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_date_list_sorted_by_timestamp_then_name() {
        let mut root = Group::root();
        root.insert(album("Old", 10)).unwrap();
        root.insert(album("New", 30)).unwrap();
        root.insert(album("TieB", 20)).unwrap();
        root.insert(album("TieA", 20)).unwrap();
        let index = FlatIndex::build(&root).unwrap();

        assert_eq!(index.list(SortOrder::Date), &["Old", "TieA", "TieB", "New"]);
        assert_eq!(index.recent(2), vec!["New", "TieB"]);
        assert_eq!(index.recent(10).len(), 4);
    }

    #[test]
    fn test_next_and_previous_wrap() {
        let index = flat(&["A", "B", "C"]);
        assert_eq!(index.next("A", SortOrder::Full), Some("B"));
        assert_eq!(index.next("C", SortOrder::Full), Some("A"));
        assert_eq!(index.previous("A", SortOrder::Full), Some("C"));
        assert_eq!(index.previous("B", SortOrder::Full), Some("A"));
    }

    #[test]
    fn test_unknown_name_starts_at_minus_one() {
        let index = flat(&["A", "B", "C"]);
        assert_eq!(index.next("", SortOrder::Full), Some("A"));
        assert_eq!(index.next("nope", SortOrder::Full), Some("A"));
        assert_eq!(index.previous("nope", SortOrder::Full), Some("B"));
    }

    #[test]
    fn test_single_album_navigation() {
        let index = flat(&["Only"]);
        assert_eq!(index.next("Only", SortOrder::Full), Some("Only"));
        assert_eq!(index.previous("Only", SortOrder::Full), Some("Only"));
        assert_eq!(index.previous("x", SortOrder::Full), Some("Only"));
    }

    #[test]
    fn test_empty_index_navigation() {
        let index = FlatIndex::build(&Group::root()).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.next("A", SortOrder::Full), None);
        assert_eq!(index.previous("A", SortOrder::Date), None);
    }

    #[test]
    fn test_first_per_group() {
        let mut rock = Group::new("Rock");
        rock.insert(album("RockZ", 1)).unwrap();
        rock.insert(album("RockA", 2)).unwrap();

        let mut nested = Group::new("JazzAA");
        nested.insert(album("JazzAAx", 3)).unwrap();
        let mut jazz = Group::new("Jazz");
        jazz.insert(nested.into()).unwrap();
        jazz.insert(album("JazzB", 4)).unwrap();

        let mut root = Group::root();
        root.insert(rock.into()).unwrap();
        root.insert(jazz.into()).unwrap();
        root.insert(album("Loose", 5)).unwrap();

        let index = FlatIndex::build(&root).unwrap();
        assert_eq!(index.list(SortOrder::FirstPerGroup), &["JazzAAx", "RockA"]);
        assert_eq!(index.next("RockA", SortOrder::FirstPerGroup), Some("JazzAAx"));
    }

    #[test]
    fn test_duplicate_names_across_groups() {
        let mut left = Group::new("A");
        left.insert(album("ABc", 1)).unwrap();
        let mut right = Group::new("AB");
        right.insert(album("ABc", 2)).unwrap();

        let mut root = Group::root();
        root.insert(left.into()).unwrap();
        root.insert(right.into()).unwrap();

        let result = FlatIndex::build(&root);
        assert!(matches!(result, Err(LibraryError::DuplicateAlbumName(name)) if name == "ABc"));
    }

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!("date".parse::<SortOrder>(), Ok(SortOrder::Date));
        assert_eq!("first-per-group".parse::<SortOrder>(), Ok(SortOrder::FirstPerGroup));
        assert_eq!(SortOrder::FirstPerGroup.to_string(), "first-per-group");
        assert!("random".parse::<SortOrder>().is_err());
    }
}
