//! Fixed-capacity FIFO of the most recent processed samples.

use std::collections::VecDeque;

use crate::config::defaults::DEFAULT_BUFFER_CAPACITY;
use crate::types::SampleRecord;

/// Ring buffer of recent [`SampleRecord`]s. Once full, each push evicts the
/// oldest record.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    records: VecDeque<SampleRecord>,
    capacity: usize,
}

impl SampleBuffer {
    /// Capacity is floored at 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: SampleRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Oldest → newest copy of the buffer contents.
    pub fn snapshot(&self) -> Vec<SampleRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&SampleRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EngineeredVector, ProjectedPoint};

    fn record(seq: u64) -> SampleRecord {
        SampleRecord {
            seq,
            timestamp: chrono::Utc::now(),
            features: EngineeredVector::from_array([0.0; 9]),
            point: ProjectedPoint::new(seq as f64, 0.0),
            cluster: 0,
        }
    }

    #[test]
    fn test_overflow_keeps_last_capacity_in_order() {
        let mut buf = SampleBuffer::new(100);
        for i in 1..=150 {
            buf.push(record(i));
        }
        let snap = buf.snapshot();
        assert_eq!(snap.len(), 100);
        let seqs: Vec<u64> = snap.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, (51..=150).collect::<Vec<_>>());
    }

    #[test]
    fn test_under_capacity() {
        let mut buf = SampleBuffer::new(5);
        buf.push(record(1));
        buf.push(record(2));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.latest().map(|r| r.seq), Some(2));
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let mut buf = SampleBuffer::new(3);
        for i in 1..=3 {
            buf.push(record(i));
        }
        let a = buf.snapshot();
        let b = buf.snapshot();
        assert_eq!(a, b);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(SampleBuffer::default().capacity(), 100);
        assert_eq!(SampleBuffer::new(0).capacity(), 1);
    }
}
