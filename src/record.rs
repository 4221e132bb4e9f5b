// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    checksum::ChecksummedWriter,
    coding::DecodeError,
    segment::SegmentId,
    Checksum, Slice,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use varint_rs::{VarintReader, VarintWriter};

/// User defined key
pub type UserKey = Slice;

/// User defined data (blob of bytes)
#[allow(clippy::module_name_repetitions)]
pub type UserValue = Slice;

/// Sequence number - a monotonically increasing counter
///
/// Every record of one write batch commit carries the same
/// sequence number; a terminator record marks the commit as
/// finished. Records written outside a batch carry sequence
/// number 0.
pub type SeqNo = u64;

pub const CRC_SIZE: usize = std::mem::size_of::<u32>();

/// Widest possible record header: CRC, type tag, two 5-byte size varints.
pub const MAX_HEADER_SIZE: usize = CRC_SIZE + 1 + 2 * 5;

/// Fewer trailing bytes than this cannot hold another record.
pub const MIN_HEADER_SIZE: usize = CRC_SIZE + 1;

/// Record type (regular value, tombstone or batch terminator)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub enum RecordType {
    /// Existing value
    Normal,

    /// Deleted value
    Deleted,

    /// Terminator of a write batch commit
    TxnFinished,
}

impl TryFrom<u8> for RecordType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Deleted),
            2 => Ok(Self::TxnFinished),
            _ => Err(()),
        }
    }
}

impl From<RecordType> for u8 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::Normal => 0,
            RecordType::Deleted => 1,
            RecordType::TxnFinished => 2,
        }
    }
}

/// The unit of append: a CRC-framed key-value tuple
///
/// On disk, a packed record looks like this:
///
/// ```text
/// [crc (4, little-endian)] [type tag (1)] [key size (varint)] [value size (varint)] [key] [value]
/// ```
///
/// The CRC covers everything after the CRC field itself. Sizes are
/// zig-zag signed varints; each must fit `u32`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    /// Key bytes - an arbitrary byte array
    ///
    /// Supports up to 2^32 bytes
    pub key: UserKey,

    /// Value bytes - an arbitrary byte array
    ///
    /// Supports up to 2^32 bytes
    pub value: UserValue,

    /// Record type tag
    pub record_type: RecordType,
}

impl Record {
    /// Creates a new [`Record`] holding a value.
    ///
    /// # Panics
    ///
    /// Panics if the key or value length is greater than 2^32.
    pub fn new<K: Into<UserKey>, V: Into<UserValue>>(key: K, value: V) -> Self {
        let key = key.into();
        let value = value.into();

        assert!(
            u32::try_from(key.len()).is_ok(),
            "keys can be 2^32 bytes in length"
        );
        assert!(
            u32::try_from(value.len()).is_ok(),
            "values can be 2^32 bytes in length"
        );

        Self {
            key,
            value,
            record_type: RecordType::Normal,
        }
    }

    /// Creates a new tombstone, shadowing earlier records for the same key.
    ///
    /// # Panics
    ///
    /// Panics if the key length is greater than 2^32.
    pub fn new_tombstone<K: Into<UserKey>>(key: K) -> Self {
        let key = key.into();

        assert!(
            u32::try_from(key.len()).is_ok(),
            "keys can be 2^32 bytes in length"
        );

        Self {
            key,
            value: UserValue::empty(),
            record_type: RecordType::Deleted,
        }
    }

    #[must_use]
    pub(crate) fn is_tombstone(&self) -> bool {
        self.record_type == RecordType::Deleted
    }

    fn write_payload<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u8(u8::from(self.record_type))?;

        // NOTE: Sizes are asserted to be 32-bit on construction
        #[allow(clippy::cast_possible_wrap)]
        {
            writer.write_i64_varint(self.key.len() as i64)?;
            writer.write_i64_varint(self.value.len() as i64)?;
        }

        writer.write_all(&self.key)?;
        writer.write_all(&self.value)?;

        Ok(())
    }

    /// Packs the record into its on-disk byte representation.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn pack(&self) -> Vec<u8> {
        let mut payload = ChecksummedWriter::new(Vec::with_capacity(
            MAX_HEADER_SIZE + self.key.len() + self.value.len(),
        ));
        self.write_payload(&mut payload).expect("cannot fail");

        let checksum = payload.checksum();
        let payload = payload.into_inner();

        let mut bytes = Vec::with_capacity(CRC_SIZE + payload.len());
        bytes
            .write_u32::<LittleEndian>(checksum.into_u32())
            .expect("cannot fail");
        bytes.extend_from_slice(&payload);

        bytes
    }

    /// Unpacks a record from the byte buffer produced by [`Record::pack`].
    ///
    /// # Errors
    ///
    /// Returns a checksum or decode error if the buffer does not hold
    /// exactly one intact record.
    pub fn unpack(bytes: &[u8]) -> crate::Result<Self> {
        let mut reader = bytes;

        let expected = Checksum::from_raw(
            reader
                .read_u32::<LittleEndian>()
                .map_err(DecodeError::from)?,
        );
        Checksum::of(reader).check(expected)?;

        let tag = reader.read_u8().map_err(DecodeError::from)?;
        let record_type = RecordType::try_from(tag)
            .map_err(|()| DecodeError::InvalidTag(("RecordType", tag)))?;

        let key_size = read_size(&mut reader)?;
        let value_size = read_size(&mut reader)?;

        let key = read_exact_vec(&mut reader, key_size as usize)?;
        let value = read_exact_vec(&mut reader, value_size as usize)?;

        if !reader.is_empty() {
            return Err(DecodeError::InvalidHeader("trailing bytes after record").into());
        }

        Ok(Self {
            key: key.into(),
            value: value.into(),
            record_type,
        })
    }
}

fn read_size<R: Read>(reader: &mut R) -> Result<u32, DecodeError> {
    let size = reader.read_i64_varint()?;
    u32::try_from(size).map_err(|_| DecodeError::InvalidHeader("size out of range"))
}

fn read_exact_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, DecodeError> {
    let mut buf = vec![0; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Decoded representation of a packed record's header fields
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RecordHeader {
    /// CRC over everything after the CRC field
    pub crc: Checksum,

    /// Record type tag
    pub record_type: RecordType,

    /// Length of the key payload in bytes
    pub key_size: u32,

    /// Length of the value payload in bytes
    pub value_size: u32,
}

impl RecordHeader {
    /// Decodes a header from the front of `bytes`, returning it together
    /// with the number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the buffer is too short or holds an
    /// invalid header.
    pub fn unpack_prefix(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut reader = bytes;

        let crc = Checksum::from_raw(reader.read_u32::<LittleEndian>()?);

        let tag = reader.read_u8()?;
        let record_type = RecordType::try_from(tag)
            .map_err(|()| DecodeError::InvalidTag(("RecordType", tag)))?;

        let key_size = read_size(&mut reader)?;
        let value_size = read_size(&mut reader)?;

        let consumed = bytes.len() - reader.len();

        Ok((
            Self {
                crc,
                record_type,
                key_size,
                value_size,
            },
            consumed,
        ))
    }
}

/// Points to the exact byte range of one packed record
///
/// This is the only thing the key directory stores.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct RecordPosition {
    /// Sequence number of the segment file holding the record
    pub segment_id: SegmentId,

    /// Byte offset of the packed record inside the segment
    pub offset: u64,

    /// Length of the packed record in bytes
    pub len: u32,
}
