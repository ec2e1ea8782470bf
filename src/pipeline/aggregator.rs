//! Running per-cluster assignment tally for the life of a session.

use std::collections::BTreeMap;

/// Monotonic assignment counter. Only a session reset clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregator {
    counts: BTreeMap<usize, u64>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, cluster: usize) {
        *self.counts.entry(cluster).or_insert(0) += 1;
    }

    /// Cluster index → cumulative count, ordered by index.
    pub fn counts(&self) -> &BTreeMap<usize, u64> {
        &self.counts
    }

    pub fn count(&self, cluster: usize) -> u64 {
        self.counts.get(&cluster).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_sum_to_records() {
        let mut agg = Aggregator::new();
        let labels = [0, 2, 2, 1, 0, 2, 3];
        for &l in &labels {
            agg.record(l);
        }
        assert_eq!(agg.total(), labels.len() as u64);
        assert_eq!(agg.count(2), 3);
        assert_eq!(agg.count(5), 0);
        assert_eq!(agg.counts().keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_reset() {
        let mut agg = Aggregator::new();
        agg.record(1);
        agg.reset();
        assert_eq!(agg.total(), 0);
        assert!(agg.counts().is_empty());
    }
}
