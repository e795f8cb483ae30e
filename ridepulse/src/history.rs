//! Bounded, newest-first history of metric snapshots.

use std::collections::VecDeque;

use serde::{Serialize, Serializer};

use crate::config::DEFAULT_HISTORY_CAPACITY;
use crate::reconcile::{Metric, MetricsSnapshot};

/// Fixed-capacity history, newest entry at index 0.
///
/// Append-only: the oldest entry is evicted once the capacity is reached.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotHistory {
    entries: VecDeque<MetricsSnapshot>,
    capacity: usize,
}

impl SnapshotHistory {
    /// An empty history holding at most `capacity` snapshots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Rebuild a history from persisted entries.
    ///
    /// Entries are re-sorted newest first by id, deduplicated and cut to
    /// `capacity`, so a hand-edited state file cannot break the invariants.
    pub fn from_entries(mut entries: Vec<MetricsSnapshot>, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        entries.dedup_by_key(|s| s.id);
        entries.truncate(history.capacity);
        history.entries = entries.into();
        history
    }

    /// Prepend `snapshot`, evicting from the tail past capacity.
    ///
    /// If the snapshot's id does not exceed the newest id (two cycles in the
    /// same millisecond, or the clock stepped back), it is bumped so ids stay
    /// strictly increasing.
    pub fn add(&mut self, mut snapshot: MetricsSnapshot) -> &MetricsSnapshot {
        if let Some(latest) = self.entries.front()
            && snapshot.id <= latest.id
        {
            snapshot.id = latest.id + 1;
        }

        self.entries.push_front(snapshot);
        self.entries.truncate(self.capacity);
        &self.entries[0]
    }

    pub fn latest(&self) -> Option<&MetricsSnapshot> {
        self.entries.front()
    }

    pub fn get(&self, index: usize) -> Option<&MetricsSnapshot> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &MetricsSnapshot> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<MetricsSnapshot> {
        self.entries.iter().cloned().collect()
    }

    /// Highest `totalBikes` in the window.
    pub fn peak_total_bikes(&self) -> Option<u64> {
        self.iter().map(|s| s.metrics.total_bikes).max()
    }

    /// Highest `activeStations` in the window.
    pub fn peak_active_stations(&self) -> Option<usize> {
        self.iter().map(|s| s.metrics.active_stations).max()
    }

    /// Highest utilization in the window.
    pub fn peak_utilization(&self) -> Option<f64> {
        self.iter().map(|s| s.metrics.utilization).reduce(f64::max)
    }

    /// Percentage change of `metric` from the entry after `index` to `index`.
    ///
    /// `None` for the oldest entry, out-of-range indices, or when the older
    /// value is zero.
    pub fn change(&self, index: usize, metric: Metric) -> Option<f64> {
        let current = self.entries.get(index)?.metrics.value(metric);
        let previous = self.entries.get(index + 1)?.metrics.value(metric);
        if previous == 0.0 {
            return None;
        }
        Some((current - previous) / previous * 100.0)
    }
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl Serialize for SnapshotHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::Metrics;

    fn snapshot(ts: i64, bikes: u64, docks: u64, active: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            id: ts,
            timestamp: ts,
            metrics: Metrics {
                total_stations: active,
                active_stations: active,
                total_bikes: bikes,
                total_docks: docks,
                utilization: crate::reconcile::utilization(bikes, docks),
            },
            station_sample: Vec::new(),
        }
    }

    #[test]
    fn newest_first() {
        let mut history = SnapshotHistory::new(20);
        history.add(snapshot(1, 1, 1, 1));
        history.add(snapshot(2, 2, 2, 2));

        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().unwrap().timestamp, 2);
        assert_eq!(history.get(1).unwrap().timestamp, 1);
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut history = SnapshotHistory::default();
        for ts in 1..=25 {
            history.add(snapshot(ts, 0, 0, 0));
        }

        assert_eq!(history.len(), 20);
        assert_eq!(history.latest().unwrap().timestamp, 25);
        assert_eq!(history.get(19).unwrap().timestamp, 6);
    }

    #[test]
    fn ids_stay_strictly_increasing() {
        let mut history = SnapshotHistory::new(5);
        history.add(snapshot(100, 0, 0, 0));
        let added = history.add(snapshot(100, 0, 0, 0)).id;
        assert_eq!(added, 101);

        // Clock stepped back.
        let added = history.add(snapshot(50, 0, 0, 0)).id;
        assert_eq!(added, 102);
        assert_eq!(history.latest().unwrap().timestamp, 50);
    }

    #[test]
    fn from_entries_sorts_and_truncates() {
        let entries: Vec<_> = (1..=30).map(|ts| snapshot(ts, 0, 0, 0)).collect();
        let history = SnapshotHistory::from_entries(entries, 20);

        assert_eq!(history.len(), 20);
        assert_eq!(history.latest().unwrap().timestamp, 30);
        assert_eq!(history.get(19).unwrap().timestamp, 11);
    }

    #[test]
    fn peaks() {
        let mut history = SnapshotHistory::new(20);
        assert_eq!(history.peak_total_bikes(), None);
        assert_eq!(history.peak_utilization(), None);

        history.add(snapshot(1, 10, 30, 4));
        history.add(snapshot(2, 30, 10, 2));
        history.add(snapshot(3, 20, 20, 5));

        assert_eq!(history.peak_total_bikes(), Some(30));
        assert_eq!(history.peak_active_stations(), Some(5));
        assert_eq!(history.peak_utilization(), Some(75.0));
    }

    #[test]
    fn change_against_older_entry() {
        let mut history = SnapshotHistory::new(20);
        history.add(snapshot(1, 0, 10, 1));
        history.add(snapshot(2, 40, 10, 1));
        history.add(snapshot(3, 50, 10, 1));

        assert_eq!(history.change(0, Metric::TotalBikes), Some(25.0));
        // Older value of zero has no meaningful percentage.
        assert_eq!(history.change(1, Metric::TotalBikes), None);
        assert_eq!(history.change(2, Metric::TotalBikes), None);
        assert_eq!(history.change(0, Metric::TotalDocks), Some(0.0));
        assert_eq!(history.change(9, Metric::TotalDocks), None);
    }

    #[test]
    fn serializes_as_plain_sequence() {
        let mut history = SnapshotHistory::new(3);
        history.add(snapshot(1, 1, 1, 1));
        let json = serde_json::to_value(&history).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["timestamp"], 1);
    }
}
