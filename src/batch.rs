// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::DecodeError,
    record::{Record, RecordPosition, RecordType},
    Database, SeqNo, Session, UserKey, UserValue,
};
use rustc_hash::FxHashMap;
use std::sync::Mutex;
use varint_rs::{VarintReader, VarintWriter};

/// Sequence number stamped on every record written outside a batch
pub const NON_TXN_SEQNO: SeqNo = 0;

/// Reserved key of the batch terminator record
///
/// Callers must never use this key at the outer layer.
pub const TXN_FINISH_KEY: &[u8] = b"txn-f";

/// Prefixes a key with its sequence number for the on-disk record.
#[allow(clippy::expect_used)]
pub(crate) fn encode_record_key(key: &[u8], seqno: SeqNo) -> UserKey {
    let mut bytes = Vec::with_capacity(10 + key.len());
    bytes.write_u64_varint(seqno).expect("cannot fail");
    bytes.extend_from_slice(key);
    bytes.into()
}

/// Splits an on-disk record key into its sequence number and the
/// original key.
pub(crate) fn parse_record_key(disk_key: &[u8]) -> Result<(SeqNo, UserKey), DecodeError> {
    let mut reader = disk_key;
    let seqno = reader.read_u64_varint()?;
    Ok((seqno, reader.into()))
}

/// Options for a write batch
#[derive(Copy, Clone, Debug)]
pub struct WriteBatchOptions {
    /// Maximum number of pending mutations one commit may hold
    pub max_batch_size: usize,

    /// Whether to fsync the active segment as part of the commit
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 10_000,
            sync_writes: false,
        }
    }
}

/// An atomic group of mutations
///
/// Mutations are buffered by their literal key, so the last write to a
/// key within one batch wins. On commit, every record is stamped with
/// a fresh sequence number and followed by a terminator record; the
/// key directory only reflects the batch once the terminator is on
/// disk. A commit that crashes before its terminator leaves no
/// directory-visible effects after recovery.
///
/// # Examples
///
/// ```
/// # use bytes_kv::{Config, Session};
/// # let folder = tempfile::tempdir()?;
/// # let db = Config::new(&folder).open()?;
/// let session = Session::new("public", "users");
///
/// let batch = db.new_write_batch(Default::default());
/// batch.put("a", "1")?;
/// batch.put("b", "2")?;
/// batch.commit(&session)?;
///
/// assert_eq!(b"1", &*db.get(&session, "a")?);
/// assert_eq!(b"2", &*db.get(&session, "b")?);
/// #
/// # Ok::<(), bytes_kv::Error>(())
/// ```
pub struct WriteBatch {
    options: WriteBatchOptions,
    db: Database,
    pending: Mutex<FxHashMap<UserKey, Record>>,
}

impl WriteBatch {
    pub(crate) fn new(db: Database, options: WriteBatchOptions) -> Self {
        Self {
            options,
            db,
            pending: Mutex::new(FxHashMap::default()),
        }
    }

    /// Buffers a put, overwriting any pending mutation of the same key.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the key is empty.
    #[allow(clippy::expect_used)]
    pub fn put<K: Into<UserKey>, V: Into<UserValue>>(&self, key: K, value: V) -> crate::Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(crate::Error::EmptyKey);
        }

        let mut pending = self.pending.lock().expect("lock is poisoned");
        pending.insert(key.clone(), Record::new(key, value));

        Ok(())
    }

    /// Buffers a delete.
    ///
    /// If the key neither exists in the key directory nor in this
    /// batch, this is a no-op. If it only exists in this batch, the
    /// pending mutation is dropped.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the directory cannot be consulted.
    #[allow(clippy::expect_used)]
    pub fn delete(&self, session: &Session, key: &[u8]) -> crate::Result<()> {
        if key.is_empty() {
            return Ok(());
        }

        let mut pending = self.pending.lock().expect("lock is poisoned");

        if self.db.contains_key(session, key)? {
            pending.insert(key.into(), Record::new_tombstone(key));
        } else {
            pending.remove(key);
        }

        Ok(())
    }

    /// Commits all pending mutations atomically.
    ///
    /// An empty batch commits as a no-op. The batch can be reused
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the batch exceeds its maximum size, or if
    /// an IO error occurs.
    #[allow(clippy::expect_used)]
    pub fn commit(&self, session: &Session) -> crate::Result<()> {
        let mut pending = self.pending.lock().expect("lock is poisoned");

        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.options.max_batch_size {
            return Err(crate::Error::BatchTooLarge {
                len: pending.len(),
                max: self.options.max_batch_size,
            });
        }

        // Resolving the directory first forces recovery of the
        // session's log, which maximizes the sequence counter with
        // every number already on disk
        let index = self.db.index(session)?;

        let seqno = self.db.seqno().next();
        log::trace!(
            "Committing batch of {} mutation(s) to {session} with seqno {seqno}",
            pending.len(),
        );

        let mut written = Vec::with_capacity(pending.len());

        for record in pending.values() {
            let disk_record = Record {
                key: encode_record_key(&record.key, seqno),
                value: record.value.clone(),
                record_type: record.record_type,
            };
            let pos = self.db.storage().write(session, &disk_record)?;
            written.push((record.key.clone(), record.record_type, pos));
        }

        let terminator = Record {
            key: encode_record_key(TXN_FINISH_KEY, seqno),
            value: UserValue::empty(),
            record_type: RecordType::TxnFinished,
        };
        self.db.storage().write(session, &terminator)?;

        if self.options.sync_writes {
            self.db.storage().sync(session)?;
        }

        // The terminator is on disk, so the batch is decided; only now
        // may it become directory-visible
        apply_mutations(&*index, written)?;

        pending.clear();

        Ok(())
    }
}

/// Applies decided batch mutations to a key directory, in log order.
///
/// Shared between commit and the recovery path that promotes staged
/// batch records once their terminator is seen.
pub(crate) fn apply_mutations(
    index: &impl crate::index::Index,
    mutations: Vec<(UserKey, RecordType, RecordPosition)>,
) -> crate::Result<()> {
    for (key, record_type, pos) in mutations {
        match record_type {
            RecordType::Normal => {
                index.put(key, pos)?;
            }
            RecordType::Deleted => {
                index.delete(&key)?;
            }
            RecordType::TxnFinished => {}
        }
    }
    Ok(())
}
