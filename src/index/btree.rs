// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Index, IndexIter};
use crate::{record::RecordPosition, UserKey};
use std::{collections::BTreeMap, sync::RwLock};

/// Ordered key directory
///
/// Keys are kept in byte-lexicographic order, so iteration works in
/// both directions and iterators can seek.
#[derive(Default)]
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<UserKey, RecordPosition>>,
}

#[allow(clippy::expect_used)]
impl Index for BTreeIndex {
    fn put(&self, key: UserKey, pos: RecordPosition) -> crate::Result<Option<RecordPosition>> {
        if key.is_empty() {
            return Err(crate::Error::EmptyKey);
        }

        Ok(self.tree.write().expect("lock is poisoned").insert(key, pos))
    }

    fn get(&self, key: &[u8]) -> crate::Result<RecordPosition> {
        if key.is_empty() {
            return Err(crate::Error::EmptyKey);
        }

        self.tree
            .read()
            .expect("lock is poisoned")
            .get(key)
            .copied()
            .ok_or(crate::Error::KeyNotFound)
    }

    fn delete(&self, key: &[u8]) -> crate::Result<bool> {
        Ok(self
            .tree
            .write()
            .expect("lock is poisoned")
            .remove(key)
            .is_some())
    }

    fn exists(&self, key: &[u8]) -> bool {
        self.tree.read().expect("lock is poisoned").contains_key(key)
    }

    fn len(&self) -> usize {
        self.tree.read().expect("lock is poisoned").len()
    }

    fn iter(&self, reverse: bool) -> crate::Result<IndexIter> {
        let mut entries = self
            .tree
            .read()
            .expect("lock is poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect::<Vec<_>>();

        if reverse {
            entries.reverse();
        }

        Ok(IndexIter::new(entries, true, reverse))
    }
}
