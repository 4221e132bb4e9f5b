// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod btree;
pub mod hash;
pub mod manager;

use crate::{config::IndexType, record::RecordPosition, UserKey};
use btree::BTreeIndex;
use enum_dispatch::enum_dispatch;
use hash::HashIndex;

/// Capability set shared by all key directory variants
///
/// The key directory maps each live key to the position of its latest
/// record and is the sole source of truth for live data. Keys are
/// compared byte-lexicographically where an order is defined.
#[enum_dispatch]
pub trait Index {
    /// Sets the position of a key, returning the previously stored
    /// position if there was one.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the key is empty.
    fn put(&self, key: UserKey, pos: RecordPosition) -> crate::Result<Option<RecordPosition>>;

    /// Returns the position of a key.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the key is empty or absent.
    fn get(&self, key: &[u8]) -> crate::Result<RecordPosition>;

    /// Removes a key, returning whether it was present.
    ///
    /// # Errors
    ///
    /// Does not error; the signature matches the other mutators.
    fn delete(&self, key: &[u8]) -> crate::Result<bool>;

    /// Returns `true` if the key is present.
    fn exists(&self, key: &[u8]) -> bool;

    /// Returns the number of live keys.
    fn len(&self) -> usize;

    /// Returns `true` if the directory holds no keys.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates an iterator over all entries.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the variant does not support the requested
    /// direction.
    fn iter(&self, reverse: bool) -> crate::Result<IndexIter>;
}

/// Tagged union of the key directory variants
#[enum_dispatch(Index)]
pub enum AnyIndex {
    /// Unordered hash directory
    Hash(HashIndex),

    /// Ordered tree directory
    BTree(BTreeIndex),
}

impl AnyIndex {
    /// Creates an empty directory of the configured variant.
    #[must_use]
    pub fn new(index_type: IndexType) -> Self {
        match index_type {
            IndexType::Hash => Self::Hash(HashIndex::default()),
            IndexType::BTree => Self::BTree(BTreeIndex::default()),
        }
    }
}

/// Materialized cursor over directory entries
///
/// Yields `(key, position)` pairs. Sorted sources (the tree variant)
/// additionally support [`IndexIter::seek`].
pub struct IndexIter {
    entries: Vec<(UserKey, RecordPosition)>,
    idx: usize,
    sorted: bool,
    reverse: bool,
}

impl IndexIter {
    pub(crate) fn new(
        entries: Vec<(UserKey, RecordPosition)>,
        sorted: bool,
        reverse: bool,
    ) -> Self {
        Self {
            entries,
            idx: 0,
            sorted,
            reverse,
        }
    }

    /// Goes back to the first entry.
    pub fn rewind(&mut self) {
        self.idx = 0;
    }

    /// Positions the cursor at the first entry whose key is greater or
    /// equal (forward) resp. less or equal (reverse) to `key`.
    ///
    /// # Errors
    ///
    /// Will return `Err` on an unordered source.
    pub fn seek(&mut self, key: &[u8]) -> crate::Result<()> {
        if !self.sorted {
            return Err(crate::Error::Unsupported(
                "seek on an unordered key directory",
            ));
        }

        self.idx = if self.reverse {
            self.entries.partition_point(|(k, _)| &**k > key)
        } else {
            self.entries.partition_point(|(k, _)| &**k < key)
        };

        Ok(())
    }
}

impl Iterator for IndexIter {
    type Item = (UserKey, RecordPosition);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.idx).cloned()?;
        self.idx += 1;
        Some(entry)
    }
}
