// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    descriptor_table::DescriptorTable,
    record::{Record, RecordPosition},
    segment::{scanner::SegmentScanner, SegmentLog},
    Session, UserKey,
};
use rustc_hash::FxHashMap;
use std::{
    path::PathBuf,
    sync::{Arc, RwLock},
};

const DESCRIPTOR_CACHE_CAPACITY: usize = 256;

/// Owns the segment log of every session
///
/// Logs are created lazily on first access. Each log serializes its
/// own writers; writes to different sessions are independent.
pub struct StorageManager {
    root: PathBuf,
    max_file_size: u64,
    descriptors: Arc<DescriptorTable>,
    logs: RwLock<FxHashMap<Session, Arc<SegmentLog>>>,
}

impl StorageManager {
    /// Creates a storage manager rooted at the given data directory.
    #[must_use]
    pub fn new(root: PathBuf, max_file_size: u64) -> Self {
        Self {
            root,
            max_file_size,
            descriptors: Arc::new(DescriptorTable::new(DESCRIPTOR_CACHE_CAPACITY)),
            logs: RwLock::new(FxHashMap::default()),
        }
    }

    #[allow(clippy::expect_used)]
    fn resolve(&self, session: &Session) -> crate::Result<Arc<SegmentLog>> {
        if let Some(log) = self
            .logs
            .read()
            .expect("lock is poisoned")
            .get(session)
            .cloned()
        {
            return Ok(log);
        }

        let mut logs = self.logs.write().expect("lock is poisoned");

        // Someone else may have initialized the log in the meantime
        if let Some(log) = logs.get(session).cloned() {
            return Ok(log);
        }

        let log = Arc::new(SegmentLog::open(
            &self.root,
            session.clone(),
            self.max_file_size,
            self.descriptors.clone(),
        )?);
        logs.insert(session.clone(), log.clone());

        Ok(log)
    }

    /// Packs and appends a record to the session's log.
    ///
    /// Returns the position at which the packed bytes begin. If the
    /// write triggered a rollover, the position points into the new
    /// active segment.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn write(&self, session: &Session, record: &Record) -> crate::Result<RecordPosition> {
        let bytes = record.pack();
        let (segment_id, offset) = self.resolve(session)?.write(&bytes)?;

        // NOTE: Key and value sizes are u32-bounded, so the packed
        // record is far below u32::MAX bytes
        #[allow(clippy::cast_possible_truncation)]
        Ok(RecordPosition {
            segment_id,
            offset,
            len: bytes.len() as u32,
        })
    }

    /// Reads back and unpacks the record at a position.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the bytes cannot be read back, or fail
    /// their checksum.
    pub fn read(&self, session: &Session, pos: &RecordPosition) -> crate::Result<Record> {
        let bytes = self.resolve(session)?.read(pos)?;
        Record::unpack(&bytes)
    }

    /// Appends a tombstone for a key, logically removing it.
    ///
    /// Note that a delete grows the log.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn delete(&self, session: &Session, key: UserKey) -> crate::Result<RecordPosition> {
        self.write(session, &Record::new_tombstone(key))
    }

    /// Returns the length of the session's active segment in bytes.
    ///
    /// This is not the total on-disk footprint of the table.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the log cannot be opened.
    pub fn size(&self, session: &Session) -> crate::Result<u64> {
        Ok(self.resolve(session)?.size())
    }

    /// Fsyncs the session's active segment.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn sync(&self, session: &Session) -> crate::Result<()> {
        self.resolve(session)?.sync()
    }

    /// Creates a position iterator over all records of the session.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the log cannot be opened.
    pub fn scan(&self, session: &Session) -> crate::Result<SegmentScanner> {
        Ok(self.resolve(session)?.scan())
    }

    /// Deletes the session's table folder.
    ///
    /// This is a test-support path; it must not run concurrently with
    /// live operations on the same session.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    #[allow(clippy::expect_used)]
    pub fn remove_all_data(&self, session: &Session) -> crate::Result<()> {
        let log = self.logs.write().expect("lock is poisoned").remove(session);

        if let Some(log) = log {
            log.remove_all()?;
        } else {
            let folder = session.folder(&self.root);
            if folder.try_exists()? {
                std::fs::remove_dir_all(folder)?;
            }
        }

        Ok(())
    }

    /// Flushes and closes every open log.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    #[allow(clippy::expect_used)]
    pub fn close(&self) -> crate::Result<()> {
        let mut logs = self.logs.write().expect("lock is poisoned");

        for log in logs.values() {
            log.close()?;
        }
        logs.clear();
        self.descriptors.clear();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;
    use test_log::test;

    fn session() -> Session {
        Session::new("public", "test")
    }

    #[test]
    fn storage_write_read() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = StorageManager::new(dir.path().into(), 1_024 * 1_024);

        let record = Record::new(*b"hello", *b"world!");
        let pos = storage.write(&session(), &record)?;

        assert_eq!(0, pos.offset);
        assert_eq!(record, storage.read(&session(), &pos)?);

        Ok(())
    }

    #[test]
    fn storage_delete_appends_tombstone() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = StorageManager::new(dir.path().into(), 1_024 * 1_024);

        let record = Record::new(*b"hello", *b"world!");
        storage.write(&session(), &record)?;

        let size_before = storage.size(&session())?;
        let pos = storage.delete(&session(), "hello".into())?;
        assert!(storage.size(&session())? > size_before);

        let tombstone = storage.read(&session(), &pos)?;
        assert_eq!(b"hello", &*tombstone.key);
        assert!(tombstone.value.is_empty());
        assert_eq!(RecordType::Deleted, tombstone.record_type);

        Ok(())
    }

    #[test]
    fn storage_sessions_are_isolated() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = StorageManager::new(dir.path().into(), 1_024 * 1_024);

        let a = Session::new("public", "a");
        let b = Session::new("public", "b");

        storage.write(&a, &Record::new(*b"k", *b"in a"))?;
        assert_eq!(0, storage.size(&b)?);
        assert!(storage.size(&a)? > 0);

        assert!(dir.path().join("public/a").try_exists()?);
        assert!(dir.path().join("public/b").try_exists()?);

        Ok(())
    }

    #[test]
    fn storage_remove_all_data() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = StorageManager::new(dir.path().into(), 1_024 * 1_024);

        storage.write(&session(), &Record::new(*b"k", *b"v"))?;
        storage.remove_all_data(&session())?;

        assert!(!dir.path().join("public/test").try_exists()?);

        // The next write starts a fresh log
        let pos = storage.write(&session(), &Record::new(*b"k", *b"v"))?;
        assert_eq!((0, 0), (pos.segment_id, pos.offset));

        Ok(())
    }

    #[test]
    fn storage_scan_covers_all_segments() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = StorageManager::new(dir.path().into(), 64);

        for i in 0..10u32 {
            let record = Record::new(i.to_be_bytes(), vec![0u8; 32]);
            storage.write(&session(), &record)?;
        }

        let items = storage.scan(&session())?.collect::<crate::Result<Vec<_>>>()?;
        assert_eq!(10, items.len());

        // More than one segment was involved
        let last = items.last().expect("has 10 items");
        assert!(last.0.segment_id > 0);

        Ok(())
    }
}
