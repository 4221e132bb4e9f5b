// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod hit;
pub mod scanner;

use crate::{
    descriptor_table::DescriptorTable,
    file::read_exact_at,
    record::RecordPosition,
    Session,
};
use scanner::SegmentScanner;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

/// Sequence number of one segment file within a table
pub type SegmentId = u64;

pub const DATA_FILE_EXT: &str = "data";
pub const HIT_FILE_EXT: &str = "hit";

/// Formats the data file path of a segment.
#[must_use]
pub fn data_file_path(folder: &Path, id: SegmentId) -> PathBuf {
    folder.join(format!("{id:010}.{DATA_FILE_EXT}"))
}

/// Formats the hit sidecar path of a segment.
#[must_use]
pub fn hit_file_path(folder: &Path, id: SegmentId) -> PathBuf {
    folder.join(format!("{id:010}.{HIT_FILE_EXT}"))
}

// NOTE: The sequence number is taken from the file stem; the extension
// decides what kind of segment file it is
fn parse_data_file_name(path: &Path) -> Option<SegmentId> {
    if path.extension()? != DATA_FILE_EXT {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

struct Inner {
    active: File,
    active_id: SegmentId,
    active_size: u64,
    sealed: Vec<SegmentId>,
}

/// The append-only segment log of one table
///
/// Holds one active (writable) segment file plus the list of sealed
/// (immutable) ones. When a write would grow the active segment past
/// the maximum file size, the segment is sealed, a `.hit` sidecar
/// summarizing its live keys is emitted, and a fresh segment becomes
/// active.
pub struct SegmentLog {
    folder: PathBuf,
    session: Session,
    max_file_size: u64,
    descriptors: Arc<DescriptorTable>,
    inner: RwLock<Inner>,
}

impl SegmentLog {
    /// Opens (or creates) the segment log of a table.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the table folder cannot be created or holds
    /// files that do not belong to a segment log.
    pub fn open(
        root: &Path,
        session: Session,
        max_file_size: u64,
        descriptors: Arc<DescriptorTable>,
    ) -> crate::Result<Self> {
        let folder = session.folder(root);
        log::debug!("Opening segment log at {folder:?}");

        std::fs::create_dir_all(&folder)?;

        let mut ids = Vec::new();

        for entry in std::fs::read_dir(&folder)? {
            let entry = entry?;
            let path = entry.path();
            let file_name = entry.file_name();

            // Hidden files (e.g. a temp file left by a crashed sidecar
            // write) are not ours to complain about
            if file_name.to_string_lossy().starts_with('.') {
                continue;
            }

            if let Some(id) = parse_data_file_name(&path) {
                ids.push(id);
            } else if path.extension().is_some_and(|ext| ext == HIT_FILE_EXT) {
                // Advisory sidecar
                continue;
            } else {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unexpected file in table folder: {path:?}"),
                )
                .into());
            }
        }

        ids.sort_unstable();

        let active_id = ids.last().copied().unwrap_or_default();
        let sealed = ids
            .iter()
            .copied()
            .filter(|&id| id != active_id)
            .collect::<Vec<_>>();

        let active = open_active_file(&folder, active_id)?;
        let mut active_size = active.metadata()?.len();

        // A crash mid-append leaves a partial record at the tail of the
        // active segment. It must not survive, or later appends would
        // land behind bytes the scanner cannot get past.
        let valid_size = scanner::valid_prefix_size(&folder, active_id)?;
        if valid_size < active_size {
            log::warn!(
                "Truncating torn tail of segment {active_id}: {active_size} B -> {valid_size} B",
            );
            active.set_len(valid_size)?;
            active.sync_all()?;
            active_size = valid_size;
        }

        log::debug!(
            "Recovered segment log {session} with {} sealed segment(s), active segment {active_id} at {active_size} B",
            sealed.len(),
        );

        Ok(Self {
            folder,
            session,
            max_file_size,
            descriptors,
            inner: RwLock::new(Inner {
                active,
                active_id,
                active_size,
                sealed,
            }),
        })
    }

    /// Appends packed bytes to the active segment, sealing it first if
    /// the write would grow it past the maximum file size.
    ///
    /// Returns the segment and offset at which the bytes begin.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    #[allow(clippy::expect_used)]
    pub fn write(&self, bytes: &[u8]) -> crate::Result<(SegmentId, u64)> {
        let mut inner = self.inner.write().expect("lock is poisoned");

        if inner.active_size + bytes.len() as u64 > self.max_file_size {
            self.rollover(&mut inner)?;
        }

        let offset = inner.active_size;
        inner.active.write_all(bytes)?;
        inner.active_size += bytes.len() as u64;

        Ok((inner.active_id, offset))
    }

    /// Seals the active segment and starts the next one.
    ///
    /// The sealed segment gets a `.hit` sidecar summarizing its live
    /// `key -> position` entries.
    fn rollover(&self, inner: &mut Inner) -> crate::Result<()> {
        inner.active.sync_all()?;

        let sealed_id = inner.active_id;
        let next_id = sealed_id + 1;
        log::debug!(
            "Rolling over segment {sealed_id} of {} at {} B, next segment is {next_id}",
            self.session,
            inner.active_size,
        );

        hit::write_sidecar(&self.folder, sealed_id)?;

        inner.active = open_active_file(&self.folder, next_id)?;
        inner.sealed.push(sealed_id);
        inner.active_id = next_id;
        inner.active_size = 0;

        Ok(())
    }

    /// Reads the byte range of one packed record.
    ///
    /// Sealed segments are opened on demand; their descriptors are
    /// cached in the shared descriptor table.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the range cannot be read back.
    #[allow(clippy::expect_used)]
    pub fn read(&self, pos: &RecordPosition) -> crate::Result<Vec<u8>> {
        let inner = self.inner.read().expect("lock is poisoned");

        let bytes = if pos.segment_id == inner.active_id {
            read_exact_at(&inner.active, pos.offset, pos.len as usize)?
        } else {
            let file = match self.descriptors.access(&self.session, pos.segment_id) {
                Some(file) => file,
                None => {
                    let file = Arc::new(File::open(data_file_path(
                        &self.folder,
                        pos.segment_id,
                    ))?);
                    self.descriptors
                        .insert(&self.session, pos.segment_id, file.clone());
                    file
                }
            };

            read_exact_at(&file, pos.offset, pos.len as usize)?
        };

        Ok(bytes)
    }

    /// Returns the length of the active segment in bytes.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn size(&self) -> u64 {
        self.inner.read().expect("lock is poisoned").active_size
    }

    /// Fsyncs the active segment file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    #[allow(clippy::expect_used)]
    pub fn sync(&self) -> crate::Result<()> {
        let inner = self.inner.write().expect("lock is poisoned");
        inner.active.sync_all()?;
        Ok(())
    }

    /// Creates an iterator over the positions of all records in the
    /// log, sealed segments first, in segment order.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn scan(&self) -> SegmentScanner {
        let inner = self.inner.read().expect("lock is poisoned");

        let mut ids = inner.sealed.clone();
        ids.push(inner.active_id);

        SegmentScanner::new(self.folder.clone(), ids)
    }

    /// Flushes and closes the log.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn close(&self) -> crate::Result<()> {
        self.sync()
    }

    /// Deletes the table folder with everything in it.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    #[allow(clippy::expect_used)]
    pub fn remove_all(&self) -> crate::Result<()> {
        let inner = self.inner.write().expect("lock is poisoned");

        for &id in &inner.sealed {
            self.descriptors.remove(&self.session, id);
        }

        log::debug!("Removing table folder {:?}", self.folder);
        std::fs::remove_dir_all(&self.folder)?;

        Ok(())
    }
}

fn open_active_file(folder: &Path, id: SegmentId) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(data_file_path(folder, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Record;
    use test_log::test;

    fn open_log(root: &Path, max_file_size: u64) -> crate::Result<SegmentLog> {
        SegmentLog::open(
            root,
            Session::new("public", "test"),
            max_file_size,
            Arc::new(DescriptorTable::new(8)),
        )
    }

    #[test]
    fn segment_file_names() {
        let folder = Path::new("/data/public/test");

        assert_eq!(
            Path::new("/data/public/test/0000000007.data"),
            data_file_path(folder, 7),
        );
        assert_eq!(
            Path::new("/data/public/test/0000000007.hit"),
            hit_file_path(folder, 7),
        );

        assert_eq!(
            Some(7),
            parse_data_file_name(Path::new("0000000007.data")),
        );
        assert_eq!(None, parse_data_file_name(Path::new("0000000007.hit")));
        assert_eq!(None, parse_data_file_name(Path::new("data.txt")));
    }

    #[test]
    fn segment_log_create_and_reopen() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        let first = Record::new(*b"k", *b"hello").pack();
        let second = Record::new(*b"k", *b"world").pack();

        let (id, offset) = {
            let log = open_log(dir.path(), 1_024)?;
            let res = log.write(&first)?;
            log.close()?;
            res
        };

        assert_eq!((0, 0), (id, offset));
        assert!(data_file_path(&dir.path().join("public/test"), 0).try_exists()?);

        let log = open_log(dir.path(), 1_024)?;
        assert_eq!(first.len() as u64, log.size());
        assert_eq!((0, first.len() as u64), log.write(&second)?);

        Ok(())
    }

    #[test]
    fn segment_log_truncates_torn_tail_on_open() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        let intact = Record::new(*b"k", *b"hello").pack();

        {
            let log = open_log(dir.path(), 1_024)?;
            log.write(&intact)?;
            log.write(b"torn")?;
            log.close()?;
        }

        let log = open_log(dir.path(), 1_024)?;
        assert_eq!(intact.len() as u64, log.size());

        // The next write lands where the torn bytes were
        assert_eq!((0, intact.len() as u64), log.write(&intact)?);

        Ok(())
    }

    #[test]
    fn segment_log_rollover() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let log = open_log(dir.path(), 64)?;

        let a = Record::new(*b"a", vec![0u8; 40]).pack();
        let b = Record::new(*b"b", vec![1u8; 40]).pack();

        let (first_id, first_offset) = log.write(&a)?;
        assert_eq!((0, 0), (first_id, first_offset));

        // Next write does not fit into 64 bytes anymore
        let (second_id, second_offset) = log.write(&b)?;
        assert_eq!((1, 0), (second_id, second_offset));

        let folder = dir.path().join("public/test");
        assert!(data_file_path(&folder, 0).try_exists()?);
        assert!(data_file_path(&folder, 1).try_exists()?);
        assert!(hit_file_path(&folder, 0).try_exists()?);

        // Reads against the sealed segment still work
        let pos = RecordPosition {
            segment_id: first_id,
            offset: first_offset,
            len: a.len() as u32,
        };
        assert_eq!(a, log.read(&pos)?);

        Ok(())
    }

    #[test]
    fn segment_log_rejects_foreign_files() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let folder = dir.path().join("public/test");
        std::fs::create_dir_all(&folder)?;
        std::fs::write(folder.join("stray.txt"), b"nope")?;

        assert!(matches!(
            open_log(dir.path(), 1_024),
            Err(crate::Error::Io(_))
        ));

        Ok(())
    }

    #[test]
    fn segment_log_ignores_hidden_files() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let folder = dir.path().join("public/test");
        std::fs::create_dir_all(&folder)?;
        std::fs::write(folder.join(".tmp12345"), b"leftover")?;

        assert!(open_log(dir.path(), 1_024).is_ok());

        Ok(())
    }

    #[test]
    fn segment_log_remove_all() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let log = open_log(dir.path(), 1_024)?;
        log.write(b"hello")?;
        log.remove_all()?;

        assert!(!dir.path().join("public/test").try_exists()?);

        Ok(())
    }
}
