//! Build-state tree
//!
//! The tree is a flat map from `(data type, view)` slot to that slot's
//! current collection. Each scheduler lane owns exactly one slot, so writes
//! never contend; other lanes only ever see a snapshot taken when a step was
//! dispatched.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::file::FileCollection;
use crate::plugin::ViewName;

/// Address of one slot in the build-state tree
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    /// Data type name
    pub data_type: String,
    /// View within the data type
    pub view: ViewName,
}

impl SlotKey {
    /// Create a key
    pub fn new(data_type: impl Into<String>, view: ViewName) -> Self {
        Self {
            data_type: data_type.into(),
            view,
        }
    }
}

/// Current collection of every slot.
///
/// Collections sit behind `Arc` so snapshots are cheap; handing a collection
/// to a plugin always clones it.
#[derive(Debug, Clone, Default)]
pub struct BuildState {
    slots: BTreeMap<SlotKey, Arc<FileCollection>>,
}

impl BuildState {
    /// Empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection held by a slot
    pub fn get(&self, data_type: &str, view: &ViewName) -> Option<&FileCollection> {
        self.get_slot(&SlotKey::new(data_type, view.clone()))
    }

    /// Collection held by a slot, by key
    pub fn get_slot(&self, key: &SlotKey) -> Option<&FileCollection> {
        self.slots.get(key).map(Arc::as_ref)
    }

    /// All views of one data type, in view order
    pub fn views<'a>(
        &'a self,
        data_type: &'a str,
    ) -> impl Iterator<Item = (&'a ViewName, &'a FileCollection)> + 'a {
        self.slots
            .iter()
            .filter(move |(key, _)| key.data_type == data_type)
            .map(|(key, files)| (&key.view, files.as_ref()))
    }

    /// Overwrite a slot
    pub fn insert(&mut self, key: SlotKey, files: FileCollection) {
        self.slots.insert(key, Arc::new(files));
    }

    /// Remove a slot and return its collection
    pub fn remove(&mut self, key: &SlotKey) -> Option<FileCollection> {
        self.slots.remove(key).map(unwrap_or_clone)
    }

    /// Iterate every slot in key order
    pub fn iter(&self) -> impl Iterator<Item = (&SlotKey, &FileCollection)> {
        self.slots.iter().map(|(key, files)| (key, files.as_ref()))
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the tree has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl IntoIterator for BuildState {
    type Item = (SlotKey, FileCollection);
    type IntoIter = std::iter::Map<
        std::collections::btree_map::IntoIter<SlotKey, Arc<FileCollection>>,
        fn((SlotKey, Arc<FileCollection>)) -> (SlotKey, FileCollection),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.slots
            .into_iter()
            .map(into_owned as fn((SlotKey, Arc<FileCollection>)) -> (SlotKey, FileCollection))
    }
}

fn into_owned((key, files): (SlotKey, Arc<FileCollection>)) -> (SlotKey, FileCollection) {
    (key, unwrap_or_clone(files))
}

fn unwrap_or_clone(files: Arc<FileCollection>) -> FileCollection {
    Arc::try_unwrap(files).unwrap_or_else(|shared| shared.as_ref().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileRecord;

    #[test]
    fn test_insert_and_get() {
        let mut state = BuildState::new();
        state.insert(
            SlotKey::new("blog", ViewName::named("single")),
            vec![FileRecord::new("a.txt", "a")],
        );
        assert_eq!(state.len(), 1);
        let files = state.get("blog", &ViewName::named("single")).unwrap();
        assert_eq!(files[0].content.as_text(), Some("a"));
        assert!(state.get("blog", &ViewName::Default).is_none());
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_writes() {
        let key = SlotKey::new("blog", ViewName::Default);
        let mut state = BuildState::new();
        state.insert(key.clone(), vec![FileRecord::new("a.txt", "before")]);

        let snapshot = state.clone();
        state.insert(key.clone(), vec![FileRecord::new("a.txt", "after")]);

        assert_eq!(
            snapshot.get_slot(&key).unwrap()[0].content.as_text(),
            Some("before")
        );
        assert_eq!(
            state.get_slot(&key).unwrap()[0].content.as_text(),
            Some("after")
        );
    }

    #[test]
    fn test_views_filters_by_data_type() {
        let mut state = BuildState::new();
        state.insert(SlotKey::new("blog", ViewName::named("a")), Vec::new());
        state.insert(SlotKey::new("blog", ViewName::named("b")), Vec::new());
        state.insert(SlotKey::new("images", ViewName::Default), Vec::new());

        let views: Vec<_> = state.views("blog").map(|(v, _)| v.clone()).collect();
        assert_eq!(views, vec![ViewName::named("a"), ViewName::named("b")]);
    }

    #[test]
    fn test_into_iter_yields_owned_collections() {
        let mut state = BuildState::new();
        state.insert(
            SlotKey::new("blog", ViewName::Default),
            vec![FileRecord::new("a.txt", "a")],
        );
        let _snapshot = state.clone();
        let owned: Vec<_> = state.into_iter().collect();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].1.len(), 1);
    }
}
