// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// A 32-bit CRC (IEEE) checksum
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Checksum(u32);

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Checksum {
    /// Wraps a checksum value.
    #[must_use]
    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw 32-bit integer.
    #[must_use]
    pub fn into_u32(self) -> u32 {
        self.0
    }

    /// Computes the checksum of a byte slice.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(crc32fast::hash(bytes))
    }

    pub(crate) fn check(&self, expected: Self) -> crate::Result<()> {
        if self.0 == expected.0 {
            Ok(())
        } else {
            Err(crate::Error::ChecksumMismatch {
                expected,
                got: *self,
            })
        }
    }
}

pub struct ChecksummedWriter<W: std::io::Write> {
    inner: W,
    hasher: crc32fast::Hasher,
}

impl<W: std::io::Write> ChecksummedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: writer,
            hasher: crc32fast::Hasher::new(),
        }
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::from_raw(self.hasher.clone().finalize())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: std::io::Write> std::io::Write for ChecksummedWriter<W> {
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.hasher.update(buf);
        self.inner.write(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use test_log::test;

    #[test]
    fn checksum_matches_oneshot() -> std::io::Result<()> {
        let mut writer = ChecksummedWriter::new(vec![]);
        writer.write_all(b"hello")?;
        writer.write_all(b" world")?;

        assert_eq!(Checksum::of(b"hello world"), writer.checksum());
        assert_eq!(b"hello world", &*writer.into_inner());

        Ok(())
    }

    #[test]
    fn checksum_mismatch_errors() {
        let got = Checksum::of(b"abc");
        let expected = Checksum::of(b"abd");

        assert!(got.check(got).is_ok());
        assert!(matches!(
            got.check(expected),
            Err(crate::Error::ChecksumMismatch { .. })
        ));
    }
}
