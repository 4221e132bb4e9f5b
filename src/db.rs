// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    batch::{encode_record_key, NON_TXN_SEQNO},
    config::{Config, StorageType},
    index::{manager::IndexManager, AnyIndex, Index},
    record::Record,
    storage::StorageManager,
    SequenceNumberCounter, Session, UserKey, UserValue, WriteBatch, WriteBatchOptions,
};
use std::sync::Arc;

pub struct DatabaseInner {
    /// Active configuration
    pub(crate) config: Config,

    /// Segment logs, one per session
    pub(crate) storage: StorageManager,

    /// Key directories, one per session
    pub(crate) indexes: IndexManager,

    /// Issues batch commit sequence numbers
    pub(crate) seqno: SequenceNumberCounter,
}

/// An embedded Bitcask-style key-value store
///
/// Stores opaque byte keys and values scoped to a [`Session`]. Every
/// mutation is an append to a per-table segment log; an in-memory key
/// directory points each live key at its latest record. On reopen the
/// directory is rebuilt by replaying the log.
///
/// A database is cheap to clone, so it can be shared across threads.
///
/// Obtained by opening a [`Config`](crate::Config):
///
/// ```
/// # use bytes_kv::{Config, Session};
/// # let folder = tempfile::tempdir()?;
/// let db = Config::new(&folder).open()?;
/// let session = Session::new("public", "users");
///
/// db.put(&session, "hello", "world")?;
/// assert_eq!(b"world", &*db.get(&session, "hello")?);
/// #
/// # Ok::<(), bytes_kv::Error>(())
/// ```
#[derive(Clone)]
pub struct Database(Arc<DatabaseInner>);

impl Database {
    pub(crate) fn open(config: Config) -> crate::Result<Self> {
        log::debug!("Opening database at {:?}", config.path);

        std::fs::create_dir_all(&config.path)?;

        let storage = match config.storage_type {
            StorageType::LocalFile => {
                StorageManager::new(config.path.clone(), config.max_file_size)
            }
        };
        let indexes = IndexManager::new(config.index_type);

        Ok(Self(Arc::new(DatabaseInner {
            config,
            storage,
            indexes,
            seqno: SequenceNumberCounter::default(),
        })))
    }

    pub(crate) fn storage(&self) -> &StorageManager {
        &self.0.storage
    }

    pub(crate) fn seqno(&self) -> &SequenceNumberCounter {
        &self.0.seqno
    }

    pub(crate) fn index(&self, session: &Session) -> crate::Result<Arc<AnyIndex>> {
        self.0.indexes.resolve(session, &self.0.storage, &self.0.seqno)
    }

    /// Stores a key-value pair, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the key is empty, or if an IO error occurs.
    pub fn put<K: Into<UserKey>, V: Into<UserValue>>(
        &self,
        session: &Session,
        key: K,
        value: V,
    ) -> crate::Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(crate::Error::EmptyKey);
        }

        let record = Record::new(encode_record_key(&key, NON_TXN_SEQNO), value);
        let pos = self.0.storage.write(session, &record)?;

        self.index(session)?.put(key, pos)?;

        Ok(())
    }

    /// Retrieves the value of a key.
    ///
    /// # Errors
    ///
    /// Will return [`Error::KeyNotFound`](crate::Error::KeyNotFound) if
    /// the key does not exist, and `Err` on IO or checksum failure.
    pub fn get<K: AsRef<[u8]>>(&self, session: &Session, key: K) -> crate::Result<UserValue> {
        let pos = self.index(session)?.get(key.as_ref())?;
        let record = self.0.storage.read(session, &pos)?;
        Ok(record.value)
    }

    /// Returns `true` if the key exists.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the key directory cannot be resolved.
    pub fn contains_key<K: AsRef<[u8]>>(&self, session: &Session, key: K) -> crate::Result<bool> {
        Ok(self.index(session)?.exists(key.as_ref()))
    }

    /// Removes a key.
    ///
    /// Deleting a key that does not exist is a no-op, so deletes are
    /// idempotent.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn delete<K: AsRef<[u8]>>(&self, session: &Session, key: K) -> crate::Result<()> {
        let key = key.as_ref();
        let index = self.index(session)?;

        match index.get(key) {
            Err(crate::Error::KeyNotFound) => return Ok(()),
            Err(e) => return Err(e),
            Ok(_) => {}
        }

        self.0
            .storage
            .delete(session, encode_record_key(key, NON_TXN_SEQNO))?;
        index.delete(key)?;

        Ok(())
    }

    /// Collects all live keys of a session.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the key directory cannot be resolved.
    pub fn keys(&self, session: &Session) -> crate::Result<Vec<UserKey>> {
        self.0
            .indexes
            .list_keys(session, &self.0.storage, &self.0.seqno)
    }

    /// Returns the length of the session's active segment in bytes.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the segment log cannot be opened.
    pub fn size(&self, session: &Session) -> crate::Result<u64> {
        self.0.storage.size(session)
    }

    /// Creates a new write batch bound to this database.
    #[must_use]
    pub fn new_write_batch(&self, options: WriteBatchOptions) -> WriteBatch {
        WriteBatch::new(self.clone(), options)
    }

    /// Deletes all data of a session, on disk and in memory.
    ///
    /// This is a test-support path; it must not run concurrently with
    /// live operations on the same session.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    #[doc(hidden)]
    pub fn remove_all_data(&self, session: &Session) -> crate::Result<()> {
        self.0.indexes.remove_all_data(session);
        self.0.storage.remove_all_data(session)
    }

    /// Flushes and closes the database.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn close(&self) -> crate::Result<()> {
        log::debug!("Closing database at {:?}", self.0.config.path);

        self.0.storage.close()?;
        self.0.indexes.close();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn session() -> Session {
        Session::new("public", "test")
    }

    #[test]
    fn db_put_get() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Config::new(&dir).open()?;

        db.put(&session(), "hello", "world")?;
        assert_eq!(b"world", &*db.get(&session(), "hello")?);

        db.put(&session(), "hello", "updated")?;
        assert_eq!(b"updated", &*db.get(&session(), "hello")?);

        Ok(())
    }

    #[test]
    fn db_empty_key_rejected() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Config::new(&dir).open()?;

        assert!(matches!(
            db.put(&session(), "", "x"),
            Err(crate::Error::EmptyKey)
        ));
        assert!(matches!(
            db.get(&session(), ""),
            Err(crate::Error::EmptyKey)
        ));

        // Nothing may have hit the log
        assert_eq!(0, db.size(&session())?);

        Ok(())
    }

    #[test]
    fn db_empty_value_is_not_a_delete() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Config::new(&dir).open()?;

        db.put(&session(), "k", "")?;

        let value = db.get(&session(), "k")?;
        assert!(value.is_empty());
        assert!(db.contains_key(&session(), "k")?);

        Ok(())
    }

    #[test]
    fn db_get_missing() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Config::new(&dir).open()?;

        assert!(matches!(
            db.get(&session(), "nope"),
            Err(crate::Error::KeyNotFound)
        ));

        Ok(())
    }

    #[test]
    fn db_keys() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Config::new(&dir)
            .index_type(crate::IndexType::BTree)
            .open()?;

        db.put(&session(), "b", "2")?;
        db.put(&session(), "a", "1")?;

        let keys = db.keys(&session())?;
        assert_eq!(2, keys.len());

        // The tree directory lists keys in order
        assert_eq!(b"a", &*keys.first().expect("has 2 keys").clone());
        assert_eq!(b"b", &*keys.get(1).expect("has 2 keys").clone());

        Ok(())
    }

    #[test]
    fn db_sessions_are_isolated() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Config::new(&dir).open()?;

        let users = Session::new("public", "users");
        let orders = Session::new("public", "orders");

        db.put(&users, "k", "users")?;
        db.put(&orders, "k", "orders")?;

        assert_eq!(b"users", &*db.get(&users, "k")?);
        assert_eq!(b"orders", &*db.get(&orders, "k")?);

        db.delete(&users, "k")?;
        assert!(db.contains_key(&orders, "k")?);

        Ok(())
    }

    #[test]
    fn db_remove_all_data() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Config::new(&dir).open()?;

        db.put(&session(), "k", "v")?;
        db.remove_all_data(&session())?;

        assert!(matches!(
            db.get(&session(), "k"),
            Err(crate::Error::KeyNotFound)
        ));

        Ok(())
    }
}
