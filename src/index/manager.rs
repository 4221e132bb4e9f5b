// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{AnyIndex, Index};
use crate::{
    batch::{apply_mutations, parse_record_key, NON_TXN_SEQNO},
    config::IndexType,
    record::{RecordPosition, RecordType},
    storage::StorageManager,
    SeqNo, SequenceNumberCounter, Session, UserKey,
};
use rustc_hash::FxHashMap;
use std::sync::{Arc, RwLock};

/// Owns the key directory of every session
///
/// Directories are constructed lazily: the first access to a session
/// rebuilds its directory by replaying the segment log.
pub struct IndexManager {
    index_type: IndexType,
    indexes: RwLock<FxHashMap<Session, Arc<AnyIndex>>>,
}

impl IndexManager {
    /// Creates an index manager producing directories of the given
    /// variant.
    #[must_use]
    pub fn new(index_type: IndexType) -> Self {
        Self {
            index_type,
            indexes: RwLock::new(FxHashMap::default()),
        }
    }

    /// Returns the session's directory, rebuilding it from the segment
    /// log on first access.
    ///
    /// The sequence counter is maximized with every sequence number
    /// observed during the rebuild, so commits after reopen never
    /// reissue a number already on disk.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the log cannot be replayed.
    #[allow(clippy::expect_used)]
    pub fn resolve(
        &self,
        session: &Session,
        storage: &StorageManager,
        seqno: &SequenceNumberCounter,
    ) -> crate::Result<Arc<AnyIndex>> {
        if let Some(index) = self
            .indexes
            .read()
            .expect("lock is poisoned")
            .get(session)
            .cloned()
        {
            return Ok(index);
        }

        let mut indexes = self.indexes.write().expect("lock is poisoned");

        // Someone else may have initialized the directory in the meantime
        if let Some(index) = indexes.get(session).cloned() {
            return Ok(index);
        }

        let index = Arc::new(AnyIndex::new(self.index_type));
        rebuild(&*index, session, storage, seqno)?;
        indexes.insert(session.clone(), index.clone());

        Ok(index)
    }

    /// Collects all live keys of a session in iteration order.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the directory cannot be resolved.
    pub fn list_keys(
        &self,
        session: &Session,
        storage: &StorageManager,
        seqno: &SequenceNumberCounter,
    ) -> crate::Result<Vec<UserKey>> {
        let index = self.resolve(session, storage, seqno)?;
        Ok(index.iter(false)?.map(|(key, _)| key).collect())
    }

    /// Drops the session's directory.
    ///
    /// This is a test-support path; it must not run concurrently with
    /// live operations on the same session.
    #[allow(clippy::expect_used)]
    pub fn remove_all_data(&self, session: &Session) {
        self.indexes
            .write()
            .expect("lock is poisoned")
            .remove(session);
    }

    /// Drops all directories.
    #[allow(clippy::expect_used)]
    pub fn close(&self) {
        self.indexes.write().expect("lock is poisoned").clear();
    }
}

/// Rebuilds a key directory by replaying the session's segment log.
///
/// Records written outside a batch apply immediately. Batch records
/// are staged by their sequence number and only promoted when the
/// matching terminator is seen; batches without a terminator (a
/// crashed commit) are discarded. Tombstones remove their key either
/// way.
fn rebuild(
    index: &impl Index,
    session: &Session,
    storage: &StorageManager,
    seqno: &SequenceNumberCounter,
) -> crate::Result<()> {
    log::debug!("Rebuilding key directory of {session}");

    let mut staged: FxHashMap<SeqNo, Vec<(UserKey, RecordType, RecordPosition)>> =
        FxHashMap::default();
    let mut max_seqno = NON_TXN_SEQNO;

    for item in storage.scan(session)? {
        let (pos, disk_key, record_type) = item?;
        let (record_seqno, key) = parse_record_key(&disk_key)?;
        max_seqno = max_seqno.max(record_seqno);

        if record_type == RecordType::TxnFinished {
            if let Some(mutations) = staged.remove(&record_seqno) {
                apply_mutations(index, mutations)?;
            }
            continue;
        }

        if record_seqno == NON_TXN_SEQNO {
            apply_mutations(index, vec![(key, record_type, pos)])?;
        } else {
            staged
                .entry(record_seqno)
                .or_default()
                .push((key, record_type, pos));
        }
    }

    if !staged.is_empty() {
        log::warn!(
            "Discarding {} uncommitted batch(es) of {session}",
            staged.len(),
        );
    }

    seqno.fetch_max(max_seqno);

    log::debug!(
        "Rebuilt key directory of {session} with {} live key(s)",
        index.len(),
    );

    Ok(())
}
