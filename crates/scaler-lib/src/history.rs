//! Bounded, insertion-ordered store of metrics snapshots

use crate::models::MetricsSnapshot;
use std::collections::VecDeque;

/// Default number of snapshots retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Rolling history of snapshots, oldest evicted on overflow
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    samples: VecDeque<MetricsSnapshot>,
    capacity: usize,
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(10_000)),
            capacity,
        }
    }

    /// Append a snapshot, returning the oldest entry if it was evicted
    pub fn push(&mut self, snapshot: MetricsSnapshot) -> Option<MetricsSnapshot> {
        let mut evicted = None;
        while self.samples.len() >= self.capacity {
            evicted = self.samples.pop_front();
        }
        self.samples.push_back(snapshot);
        evicted
    }

    /// Undo a [`push`](Self::push), putting back the snapshot it evicted
    pub fn revert_push(&mut self, evicted: Option<MetricsSnapshot>) -> Option<MetricsSnapshot> {
        let latest = self.samples.pop_back();
        if let Some(oldest) = evicted {
            self.samples.push_front(oldest);
        }
        latest
    }

    /// Seed the history with older snapshots (e.g. a backfill from the source)
    ///
    /// Snapshots are sorted by timestamp and anything not older than the
    /// current oldest entry is dropped, so insertion order stays time order.
    pub fn backfill(&mut self, mut snapshots: Vec<MetricsSnapshot>) -> usize {
        snapshots.sort_by_key(|s| s.timestamp);
        if let Some(oldest) = self.samples.front().map(|s| s.timestamp) {
            snapshots.retain(|s| s.timestamp < oldest);
        }
        let room = self.capacity - self.samples.len();
        let skip = snapshots.len().saturating_sub(room);
        let added = snapshots.len() - skip;
        for snapshot in snapshots.into_iter().skip(skip).rev() {
            self.samples.push_front(snapshot);
        }
        added
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&MetricsSnapshot> {
        self.samples.back()
    }

    /// Snapshot `n` samples before the latest one, if history is long enough
    pub fn back(&self, n: usize) -> Option<&MetricsSnapshot> {
        let len = self.samples.len();
        if n >= len {
            return None;
        }
        self.samples.get(len - 1 - n)
    }

    /// The most recent `n` snapshots (or all of them), oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &MetricsSnapshot> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricsSnapshot> {
        self.samples.iter()
    }
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(timestamp: i64, cpu: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp,
            cpu_millicores_total: cpu,
            memory_bytes_total: 0,
            network_bytes_per_sec: 0.0,
            pod_count: 1,
        }
    }

    #[test]
    fn test_evicts_oldest_on_overflow() {
        let mut history = MetricsHistory::new(3);
        for i in 0..5 {
            history.push(snapshot(i, i as f64));
        }
        assert_eq!(history.len(), 3);
        let timestamps: Vec<i64> = history.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![2, 3, 4]);
    }

    #[test]
    fn test_back_indexing() {
        let mut history = MetricsHistory::new(10);
        for i in 0..4 {
            history.push(snapshot(i, i as f64 * 10.0));
        }
        assert_eq!(history.back(0).map(|s| s.timestamp), Some(3));
        assert_eq!(history.back(3).map(|s| s.timestamp), Some(0));
        assert!(history.back(4).is_none());
    }

    #[test]
    fn test_recent_shorter_than_window() {
        let mut history = MetricsHistory::new(10);
        history.push(snapshot(0, 1.0));
        history.push(snapshot(1, 2.0));
        assert_eq!(history.recent(5).count(), 2);
        assert_eq!(history.recent(1).next().map(|s| s.timestamp), Some(1));
    }

    #[test]
    fn test_backfill_prepends_older_samples() {
        let mut history = MetricsHistory::new(4);
        history.push(snapshot(100, 1.0));
        let added = history.backfill(vec![
            snapshot(70, 0.0),
            snapshot(90, 0.0),
            snapshot(80, 0.0),
            snapshot(60, 0.0),
            snapshot(100, 0.0),
        ]);
        assert_eq!(added, 3);
        let timestamps: Vec<i64> = history.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![70, 80, 90, 100]);
    }

    #[test]
    fn test_revert_push_restores_evicted() {
        let mut history = MetricsHistory::new(3);
        for i in 0..3 {
            history.push(snapshot(i, 0.0));
        }
        let evicted = history.push(snapshot(3, 0.0));
        assert_eq!(evicted.as_ref().map(|s| s.timestamp), Some(0));

        let reverted = history.revert_push(evicted);
        assert_eq!(reverted.map(|s| s.timestamp), Some(3));
        let timestamps: Vec<i64> = history.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![0, 1, 2]);

        let mut single = MetricsHistory::new(3);
        let evicted = single.push(snapshot(9, 0.0));
        assert!(evicted.is_none());
        single.revert_push(evicted);
        assert!(single.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_promoted() {
        let mut history = MetricsHistory::new(0);
        history.push(snapshot(1, 1.0));
        assert_eq!(history.len(), 1);
        assert_eq!(history.capacity(), 1);
    }
}
