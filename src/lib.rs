// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An embedded Bitcask-style log-structured key-value store.
//!
//! ##### About
//!
//! This crate exports a [`Database`] that stores opaque byte keys and values,
//! scoped to a [`Session`] (a `schema.table` namespace).
//!
//! Every mutation is an append to a per-table segment log; an in-memory
//! key directory maps each live key to the exact byte range of its latest
//! record. Updates shadow older records, deletes append a tombstone, and the
//! directory is rebuilt deterministically by replaying the log on reopen.
//! When the active segment file grows past its configured maximum size, it is
//! sealed and a new segment is started.
//!
//! Mutations can be grouped into an atomic [`WriteBatch`]: all records of one
//! commit are stamped with a fresh sequence number and followed by a
//! terminator record, so a crash mid-commit leaves no partial effects after
//! recovery.
//!
//! # Example usage
//!
//! ```
//! use bytes_kv::{Config, Session};
//! #
//! # let folder = tempfile::tempdir()?;
//!
//! let db = Config::new(&folder).open()?;
//! let session = Session::new("public", "users");
//!
//! db.put(&session, "my_key", "my_value")?;
//!
//! let item = db.get(&session, "my_key")?;
//! assert_eq!(b"my_value", &*item);
//!
//! // Deletes are idempotent
//! db.delete(&session, "my_key")?;
//! db.delete(&session, "my_key")?;
//!
//! // Atomic multi-key commit
//! let batch = db.new_write_batch(Default::default());
//! batch.put("a", "1")?;
//! batch.put("b", "2")?;
//! batch.commit(&session)?;
//!
//! assert_eq!(b"1", &*db.get(&session, "a")?);
//!
//! db.close()?;
//! #
//! # Ok::<(), bytes_kv::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

macro_rules! fail_iter {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Some(Err(e.into())),
        }
    };
}

mod batch;

mod checksum;

#[doc(hidden)]
pub mod coding;

mod config;

mod db;

#[doc(hidden)]
pub mod descriptor_table;

mod error;

#[doc(hidden)]
pub mod file;

#[doc(hidden)]
pub mod index;

mod record;

#[doc(hidden)]
pub mod segment;

mod seqno;

mod session;

mod slice;

#[doc(hidden)]
pub mod storage;

#[doc(hidden)]
pub use {
    descriptor_table::DescriptorTable,
    index::{manager::IndexManager, AnyIndex, Index, IndexIter},
    record::RecordHeader,
    segment::{scanner::SegmentScanner, SegmentLog},
    storage::StorageManager,
};

pub use {
    batch::{WriteBatch, WriteBatchOptions, NON_TXN_SEQNO, TXN_FINISH_KEY},
    checksum::Checksum,
    coding::{DecodeError, EncodeError},
    config::{Config, IndexType, StorageType},
    db::Database,
    error::{Error, Result},
    record::{Record, RecordPosition, RecordType, SeqNo, UserKey, UserValue},
    segment::SegmentId,
    seqno::SequenceNumberCounter,
    session::Session,
    slice::Slice,
};
