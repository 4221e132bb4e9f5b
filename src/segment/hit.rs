// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{hit_file_path, scanner::SegmentScanner, SegmentId};
use crate::{
    coding::{Decode, DecodeError, Encode, EncodeError},
    file::rewrite_atomic,
    record::RecordType,
    UserKey,
};
use std::{
    collections::BTreeMap,
    io::{Read, Write},
    path::Path,
};
use varint_rs::{VarintReader, VarintWriter};

/// One entry of a `.hit` sidecar: the latest live position of a key
/// within its sealed segment
///
/// Layout: `varint(key len) ‖ key ‖ varint(offset) ‖ varint(record len)`,
/// all varints zig-zag signed.
///
/// Sidecars are advisory. They are emitted when a segment is sealed
/// but recovery does not consume them: the format carries no
/// tombstones, so a later segment's delete could not be applied on
/// top of them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HitEntry {
    /// Key bytes as stored in the segment
    pub key: UserKey,

    /// Byte offset of the packed record inside the segment
    pub offset: u64,

    /// Length of the packed record in bytes
    pub len: u32,
}

impl Encode for HitEntry {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        // NOTE: Key sizes are u32-bounded by the record codec
        #[allow(clippy::cast_possible_wrap)]
        writer.write_i64_varint(self.key.len() as i64)?;
        writer.write_all(&self.key)?;

        #[allow(clippy::cast_possible_wrap)]
        writer.write_i64_varint(self.offset as i64)?;
        writer.write_i64_varint(i64::from(self.len))?;

        Ok(())
    }
}

impl Decode for HitEntry {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let key_len = reader.read_i64_varint()?;
        let key_len =
            usize::try_from(key_len).map_err(|_| DecodeError::InvalidHeader("key size out of range"))?;

        let mut key = vec![0; key_len];
        reader.read_exact(&mut key)?;

        let offset = reader.read_i64_varint()?;
        let offset =
            u64::try_from(offset).map_err(|_| DecodeError::InvalidHeader("offset out of range"))?;

        let len = reader.read_i64_varint()?;
        let len =
            u32::try_from(len).map_err(|_| DecodeError::InvalidHeader("record size out of range"))?;

        Ok(Self {
            key: key.into(),
            offset,
            len,
        })
    }
}

/// Emits the `.hit` sidecar of a sealed segment.
///
/// Replays the segment, applies shadowing (tombstones remove, later
/// writes win) and writes the surviving entries in ascending key
/// order, atomically.
///
/// # Errors
///
/// Will return `Err` if the segment cannot be replayed or the sidecar
/// cannot be written.
pub fn write_sidecar(folder: &Path, id: SegmentId) -> crate::Result<()> {
    let mut live: BTreeMap<UserKey, HitEntry> = BTreeMap::new();

    for item in SegmentScanner::single(folder.into(), id) {
        let (pos, key, record_type) = item?;

        match record_type {
            RecordType::Normal => {
                live.insert(
                    key.clone(),
                    HitEntry {
                        key,
                        offset: pos.offset,
                        len: pos.len,
                    },
                );
            }
            RecordType::Deleted => {
                live.remove(&key);
            }
            // Batch terminators are not data
            RecordType::TxnFinished => {}
        }
    }

    let mut bytes = Vec::new();
    for entry in live.values() {
        entry.encode_into(&mut bytes)?;
    }

    let path = hit_file_path(folder, id);
    log::debug!("Writing hit sidecar {path:?} with {} entries", live.len());
    rewrite_atomic(&path, &bytes)?;

    Ok(())
}

/// Reads all entries of a `.hit` sidecar.
///
/// # Errors
///
/// Will return `Err` if the sidecar cannot be read or decoded.
pub fn read_sidecar(folder: &Path, id: SegmentId) -> crate::Result<Vec<HitEntry>> {
    let bytes = std::fs::read(hit_file_path(folder, id))?;
    let mut reader = &bytes[..];

    let mut entries = Vec::new();
    while !reader.is_empty() {
        entries.push(HitEntry::decode_from(&mut reader)?);
    }

    Ok(entries)
}
