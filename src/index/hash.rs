// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Index, IndexIter};
use crate::{record::RecordPosition, UserKey};
use rustc_hash::FxHashMap;
use std::sync::RwLock;

/// Unordered key directory
///
/// Lookups are O(1); iteration order is unspecified and reverse
/// iteration is unsupported.
#[derive(Default)]
pub struct HashIndex {
    map: RwLock<FxHashMap<UserKey, RecordPosition>>,
}

#[allow(clippy::expect_used)]
impl Index for HashIndex {
    fn put(&self, key: UserKey, pos: RecordPosition) -> crate::Result<Option<RecordPosition>> {
        if key.is_empty() {
            return Err(crate::Error::EmptyKey);
        }

        Ok(self.map.write().expect("lock is poisoned").insert(key, pos))
    }

    fn get(&self, key: &[u8]) -> crate::Result<RecordPosition> {
        if key.is_empty() {
            return Err(crate::Error::EmptyKey);
        }

        self.map
            .read()
            .expect("lock is poisoned")
            .get(key)
            .copied()
            .ok_or(crate::Error::KeyNotFound)
    }

    fn delete(&self, key: &[u8]) -> crate::Result<bool> {
        Ok(self
            .map
            .write()
            .expect("lock is poisoned")
            .remove(key)
            .is_some())
    }

    fn exists(&self, key: &[u8]) -> bool {
        self.map.read().expect("lock is poisoned").contains_key(key)
    }

    fn len(&self) -> usize {
        self.map.read().expect("lock is poisoned").len()
    }

    fn iter(&self, reverse: bool) -> crate::Result<IndexIter> {
        if reverse {
            return Err(crate::Error::Unsupported(
                "reverse iteration on a hash key directory",
            ));
        }

        let entries = self
            .map
            .read()
            .expect("lock is poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();

        Ok(IndexIter::new(entries, false, false))
    }
}
