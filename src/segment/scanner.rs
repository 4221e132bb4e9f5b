// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{data_file_path, SegmentId};
use crate::{
    file::read_exact_at,
    record::{RecordHeader, RecordPosition, RecordType, MAX_HEADER_SIZE, MIN_HEADER_SIZE},
    UserKey,
};
use std::{
    fs::File,
    path::{Path, PathBuf},
};

/// Streams `(position, key, type)` over every record of a segment log
///
/// Segments are visited in sequence order, each from offset 0. A
/// partially written record at the tail of a segment is treated as
/// absent: scanning of that segment stops without an error
/// (truncating recovery).
///
/// Record payloads are not CRC-verified here; positioned reads do
/// that downstream.
pub struct SegmentScanner {
    folder: PathBuf,
    segments: Vec<SegmentId>,
    idx: usize,
    current: Option<(File, u64)>,
    offset: u64,
}

impl SegmentScanner {
    pub(crate) fn new(folder: PathBuf, segments: Vec<SegmentId>) -> Self {
        Self {
            folder,
            segments,
            idx: 0,
            current: None,
            offset: 0,
        }
    }

    /// Creates a scanner over a single segment.
    pub(crate) fn single(folder: PathBuf, id: SegmentId) -> Self {
        Self::new(folder, vec![id])
    }

    fn current_id(&self) -> Option<SegmentId> {
        self.segments.get(self.idx).copied()
    }

    fn open_current(&mut self) -> crate::Result<()> {
        // NOTE: current_id is checked by the caller
        #[allow(clippy::expect_used)]
        let id = self.current_id().expect("segment index is in bounds");

        let file = File::open(data_file_path(&self.folder, id))?;
        let file_size = file.metadata()?.len();

        self.current = Some((file, file_size));
        self.offset = 0;

        Ok(())
    }

    fn advance_segment(&mut self) {
        self.current = None;
        self.offset = 0;
        self.idx += 1;
    }
}

/// Length of the leading byte range of a segment that parses as
/// intact records.
///
/// Everything behind it is a torn tail.
pub(crate) fn valid_prefix_size(folder: &Path, id: SegmentId) -> crate::Result<u64> {
    let mut size = 0;

    for item in SegmentScanner::single(folder.into(), id) {
        let (pos, _, _) = item?;
        size = pos.offset + u64::from(pos.len);
    }

    Ok(size)
}

impl Iterator for SegmentScanner {
    type Item = crate::Result<(RecordPosition, UserKey, RecordType)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = self.current_id()?;

            if self.current.is_none() {
                fail_iter!(self.open_current());
            }

            // NOTE: opened right above
            #[allow(clippy::expect_used)]
            let (file, file_size) = self.current.as_ref().expect("segment file is open");
            let file_size = *file_size;

            if file_size - self.offset < MIN_HEADER_SIZE as u64 {
                self.advance_segment();
                continue;
            }

            let take = (file_size - self.offset).min(MAX_HEADER_SIZE as u64);
            let header_bytes = fail_iter!(read_exact_at(file, self.offset, take as usize));

            let Ok((header, header_size)) = RecordHeader::unpack_prefix(&header_bytes) else {
                log::warn!(
                    "Stopping scan of segment {id}: unreadable record header at offset {}",
                    self.offset,
                );
                self.advance_segment();
                continue;
            };

            let record_size =
                header_size as u64 + u64::from(header.key_size) + u64::from(header.value_size);

            // Torn tail: the record claims more bytes than the segment has left
            if self.offset + record_size > file_size || record_size > u64::from(u32::MAX) {
                log::warn!(
                    "Stopping scan of segment {id}: truncated record at offset {}",
                    self.offset,
                );
                self.advance_segment();
                continue;
            }

            let key = fail_iter!(read_exact_at(
                file,
                self.offset + header_size as u64,
                header.key_size as usize,
            ));

            // NOTE: Bounded by u32::MAX right above
            #[allow(clippy::cast_possible_truncation)]
            let pos = RecordPosition {
                segment_id: id,
                offset: self.offset,
                len: record_size as u32,
            };

            self.offset += record_size;

            return Some(Ok((pos, key.into(), header.record_type)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Record;
    use std::io::Write;
    use test_log::test;

    fn write_segment(folder: &std::path::Path, id: SegmentId, records: &[Record]) -> crate::Result<u64> {
        let mut file = File::create(data_file_path(folder, id))?;
        let mut written = 0;
        for record in records {
            let bytes = record.pack();
            file.write_all(&bytes)?;
            written += bytes.len() as u64;
        }
        Ok(written)
    }

    #[test]
    fn scanner_yields_positions_in_order() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        write_segment(
            dir.path(),
            0,
            &[
                Record::new(*b"a", *b"1"),
                Record::new_tombstone(*b"a"),
            ],
        )?;
        write_segment(dir.path(), 1, &[Record::new(*b"b", *b"2")])?;

        let items = SegmentScanner::new(dir.path().into(), vec![0, 1])
            .collect::<crate::Result<Vec<_>>>()?;

        assert_eq!(3, items.len());

        let (pos, key, record_type) = items.first().expect("has 3 items");
        assert_eq!((0, 0), (pos.segment_id, pos.offset));
        assert_eq!(b"a", &**key);
        assert_eq!(RecordType::Normal, *record_type);

        let (pos, key, record_type) = items.get(1).expect("has 3 items");
        assert_eq!(0, pos.segment_id);
        assert!(pos.offset > 0);
        assert_eq!(b"a", &**key);
        assert_eq!(RecordType::Deleted, *record_type);

        let (pos, key, record_type) = items.get(2).expect("has 3 items");
        assert_eq!((1, 0), (pos.segment_id, pos.offset));
        assert_eq!(b"b", &**key);
        assert_eq!(RecordType::Normal, *record_type);

        Ok(())
    }

    #[test]
    fn scanner_tolerates_torn_tail() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        write_segment(dir.path(), 0, &[Record::new(*b"a", *b"1")])?;

        // Append a record missing its last bytes
        {
            let intact = Record::new(*b"b", *b"torn off").pack();
            let torn = intact.get(..intact.len() - 4).expect("in range");

            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(data_file_path(dir.path(), 0))?;
            file.write_all(torn)?;
        }

        let items = SegmentScanner::single(dir.path().into(), 0)
            .collect::<crate::Result<Vec<_>>>()?;

        assert_eq!(1, items.len());
        let (_, key, _) = items.first().expect("has 1 item");
        assert_eq!(b"a", &**key);

        Ok(())
    }

    #[test]
    fn scanner_tolerates_tiny_tail() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        write_segment(dir.path(), 0, &[Record::new(*b"a", *b"1")])?;

        // Fewer bytes than the smallest possible header
        {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(data_file_path(dir.path(), 0))?;
            file.write_all(&[1, 2, 3])?;
        }

        let items = SegmentScanner::single(dir.path().into(), 0)
            .collect::<crate::Result<Vec<_>>>()?;

        assert_eq!(1, items.len());

        Ok(())
    }

    #[test]
    fn scanner_empty_segment() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        write_segment(dir.path(), 0, &[])?;

        let items = SegmentScanner::single(dir.path().into(), 0)
            .collect::<crate::Result<Vec<_>>>()?;
        assert!(items.is_empty());

        Ok(())
    }
}
