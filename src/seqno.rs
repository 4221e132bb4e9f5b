// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::SeqNo;
use std::sync::{
    atomic::{
        AtomicU64,
        Ordering::{AcqRel, Acquire, Release},
    },
    Arc,
};

/// Thread-safe sequence number generator
///
/// Issues the sequence numbers that write batch commits are stamped
/// with. The first issued number is 1; 0 is reserved for records
/// written outside a batch. During recovery, the counter is maximized
/// with every sequence number observed in the log, so numbers are
/// never reissued across restarts.
#[derive(Clone, Default, Debug)]
pub struct SequenceNumberCounter(Arc<AtomicU64>);

impl SequenceNumberCounter {
    /// Creates a new counter, setting it to some previous value
    #[must_use]
    pub fn new(prev: SeqNo) -> Self {
        Self(Arc::new(AtomicU64::new(prev)))
    }

    /// Gets the last issued sequence number, without incrementing the counter.
    #[must_use]
    pub fn get(&self) -> SeqNo {
        self.0.load(Acquire)
    }

    /// Gets the next sequence number.
    #[must_use]
    pub fn next(&self) -> SeqNo {
        self.0.fetch_add(1, Release) + 1
    }

    /// Maximizes the sequence number.
    pub fn fetch_max(&self, seqno: SeqNo) {
        self.0.fetch_max(seqno, AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::SequenceNumberCounter;
    use test_log::test;

    #[test]
    fn seqno_starts_at_one() {
        let counter = SequenceNumberCounter::default();
        assert_eq!(0, counter.get());
        assert_eq!(1, counter.next());
        assert_eq!(2, counter.next());
        assert_eq!(2, counter.get());
    }

    #[test]
    fn seqno_fetch_max() {
        let counter = SequenceNumberCounter::default();
        counter.fetch_max(42);
        counter.fetch_max(7);
        assert_eq!(43, counter.next());
    }
}
