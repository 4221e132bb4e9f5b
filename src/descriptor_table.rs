// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{segment::SegmentId, Session};
use quick_cache::{sync::Cache as QuickCache, UnitWeighter};
use std::{fs::File, sync::Arc};

type Item = Arc<File>;

#[derive(Clone, Eq, std::hash::Hash, PartialEq)]
struct CacheKey(Session, SegmentId);

/// Caches file descriptors of sealed segment files
///
/// The active segment of a table keeps its own descriptor; sealed
/// segments are opened on demand for positioned reads and their
/// descriptors cached here.
pub struct DescriptorTable {
    inner: QuickCache<CacheKey, Item, UnitWeighter, rustc_hash::FxBuildHasher>,
}

impl DescriptorTable {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        use quick_cache::sync::DefaultLifecycle;

        #[allow(clippy::default_trait_access)]
        let quick_cache = QuickCache::with(
            1_000,
            capacity as u64,
            UnitWeighter,
            Default::default(),
            DefaultLifecycle::default(),
        );

        Self { inner: quick_cache }
    }

    #[doc(hidden)]
    pub fn clear(&self) {
        self.inner.clear();
    }

    #[must_use]
    pub fn access(&self, session: &Session, id: SegmentId) -> Option<Item> {
        self.inner.get(&CacheKey(session.clone(), id))
    }

    pub fn insert(&self, session: &Session, id: SegmentId, item: Item) {
        self.inner.insert(CacheKey(session.clone(), id), item);
    }

    pub fn remove(&self, session: &Session, id: SegmentId) {
        self.inner.remove(&CacheKey(session.clone(), id));
    }
}
