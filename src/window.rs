//! # Rolling Windows: Bounded Per-Node Sample Series
//!
//! Disk and memory readings are kept as fixed-capacity FIFO series on the
//! status document, one entry per node. Each series is a set of value arrays
//! plus one timestamp array; all of them always have the same length and are
//! index-aligned. Sentinel samples (`-1`) are appended like any other value.
//!
//! These functions mutate a loaded [`ServerStatusDocument`]; the coordinator
//! persists the whole document afterwards (read-modify-write under the host lock).

use crate::model::{DiskUsageForNode, MemoryPressureForNode, ServerStatusDocument, SENTINEL};
use crate::parsers::{DiskReading, MemoryReading};

/// Samples retained per series.
pub const WINDOW_CAPACITY: usize = 10;

/// Drop elements from the front until `values` holds at most `len`.
fn trim_front<T>(values: &mut Vec<T>, len: usize) {
    if values.len() > len {
        values.drain(..values.len() - len);
    }
}

/// Push one sample onto a value series and its timestamp series, then evict
/// the oldest entries so both end with the same length, at most the capacity.
pub fn push_aligned(values: &mut Vec<f64>, timestamps: &mut Vec<i64>, value: f64, timestamp: i64) {
    values.push(value);
    timestamps.push(timestamp);
    let len = values.len().min(timestamps.len()).min(WINDOW_CAPACITY);
    trim_front(values, len);
    trim_front(timestamps, len);
}

/// Two value series sharing one timestamp series (memory and swap).
fn push_aligned_pair(
    first: &mut Vec<f64>,
    second: &mut Vec<f64>,
    timestamps: &mut Vec<i64>,
    values: (f64, f64),
    timestamp: i64,
) {
    first.push(values.0);
    second.push(values.1);
    timestamps.push(timestamp);
    let len = first
        .len()
        .min(second.len())
        .min(timestamps.len())
        .min(WINDOW_CAPACITY);
    trim_front(first, len);
    trim_front(second, len);
    trim_front(timestamps, len);
}

impl ServerStatusDocument {
    /// Append a disk reading to `node`'s window. Capacity is only replaced by a
    /// valid reading that differs from the stored value.
    pub fn record_disk_sample(&mut self, node: &str, reading: &DiskReading) {
        match self.disk_usage.iter_mut().find(|d| d.node_name == node) {
            Some(entry) => {
                push_aligned(
                    &mut entry.used_samples,
                    &mut entry.sample_timestamps,
                    reading.used_gb,
                    reading.timestamp,
                );
                if reading.is_valid() && entry.capacity_gb != reading.capacity_gb {
                    entry.capacity_gb = reading.capacity_gb;
                }
            }
            None => self.disk_usage.push(DiskUsageForNode {
                node_name: node.to_string(),
                capacity_gb: if reading.is_valid() {
                    reading.capacity_gb
                } else {
                    0.0
                },
                used_samples: vec![reading.used_gb],
                sample_timestamps: vec![reading.timestamp],
            }),
        }
    }

    /// Append a memory/swap reading to `node`'s window. Each total follows the
    /// same rule as disk capacity, judged on its own half of the reading.
    pub fn record_memory_sample(&mut self, node: &str, reading: &MemoryReading) {
        let memory_valid = reading.memory_used_mb != SENTINEL;
        let swap_valid = reading.swap_used_mb != SENTINEL;
        match self.memory_pressure.iter_mut().find(|m| m.node_name == node) {
            Some(entry) => {
                push_aligned_pair(
                    &mut entry.memory_used_samples,
                    &mut entry.swap_used_samples,
                    &mut entry.sample_timestamps,
                    (reading.memory_used_mb, reading.swap_used_mb),
                    reading.timestamp,
                );
                if memory_valid && entry.memory_total_mb != reading.memory_total_mb {
                    entry.memory_total_mb = reading.memory_total_mb;
                }
                if swap_valid && entry.swap_total_mb != reading.swap_total_mb {
                    entry.swap_total_mb = reading.swap_total_mb;
                }
            }
            None => self.memory_pressure.push(MemoryPressureForNode {
                node_name: node.to_string(),
                memory_total_mb: if memory_valid {
                    reading.memory_total_mb
                } else {
                    0.0
                },
                memory_used_samples: vec![reading.memory_used_mb],
                swap_total_mb: if swap_valid {
                    reading.swap_total_mb
                } else {
                    0.0
                },
                swap_used_samples: vec![reading.swap_used_mb],
                sample_timestamps: vec![reading.timestamp],
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(used: f64, capacity: f64, ts: i64) -> DiskReading {
        DiskReading {
            used_gb: used,
            capacity_gb: capacity,
            timestamp: ts,
        }
    }

    fn memory(used: f64, swap_used: f64, ts: i64) -> MemoryReading {
        MemoryReading {
            memory_total_mb: 1000.0,
            memory_used_mb: used,
            swap_total_mb: 500.0,
            swap_used_mb: swap_used,
            timestamp: ts,
        }
    }

    #[test]
    fn first_sample_seeds_entry() {
        let mut doc = ServerStatusDocument::default();
        doc.record_disk_sample("n1", &disk(18.0, 98.0, 1));
        assert_eq!(doc.disk_usage.len(), 1);
        assert_eq!(doc.disk_usage[0].used_samples, vec![18.0]);
        assert_eq!(doc.disk_usage[0].sample_timestamps, vec![1]);
        assert_eq!(doc.disk_usage[0].capacity_gb, 98.0);
    }

    #[test]
    fn window_keeps_ten_most_recent_in_order() {
        let mut doc = ServerStatusDocument::default();
        for i in 0..13 {
            doc.record_disk_sample("n1", &disk(i as f64, 98.0, i));
        }
        let entry = &doc.disk_usage[0];
        assert_eq!(entry.used_samples.len(), WINDOW_CAPACITY);
        assert_eq!(entry.sample_timestamps.len(), WINDOW_CAPACITY);
        assert_eq!(entry.used_samples[0], 3.0);
        assert_eq!(entry.used_samples[9], 12.0);
        assert_eq!(entry.sample_timestamps, (3..13).collect::<Vec<i64>>());
    }

    #[test]
    fn sentinel_is_appended_not_dropped() {
        let mut doc = ServerStatusDocument::default();
        doc.record_disk_sample("n1", &disk(18.0, 98.0, 1));
        doc.record_disk_sample("n1", &DiskReading::unknown(2));
        let entry = &doc.disk_usage[0];
        assert_eq!(entry.used_samples.last(), Some(&-1.0));
        assert_eq!(entry.sample_timestamps.last(), Some(&2));
    }

    #[test]
    fn capacity_update_rules() {
        let mut doc = ServerStatusDocument::default();
        doc.record_disk_sample("n1", &disk(18.0, 98.0, 1));
        doc.record_disk_sample("n1", &disk(19.0, 98.0, 2));
        assert_eq!(doc.disk_usage[0].capacity_gb, 98.0);
        doc.record_disk_sample("n1", &disk(19.0, 120.0, 3));
        assert_eq!(doc.disk_usage[0].capacity_gb, 120.0);
        doc.record_disk_sample("n1", &disk(SENTINEL, 500.0, 4));
        assert_eq!(doc.disk_usage[0].capacity_gb, 120.0);
    }

    #[test]
    fn sentinel_seed_does_not_set_capacity() {
        let mut doc = ServerStatusDocument::default();
        doc.record_disk_sample("n1", &disk(SENTINEL, 77.0, 1));
        assert_eq!(doc.disk_usage[0].capacity_gb, 0.0);
    }

    #[test]
    fn nodes_have_independent_windows() {
        let mut doc = ServerStatusDocument::default();
        doc.record_disk_sample("n1", &disk(1.0, 10.0, 1));
        doc.record_disk_sample("n2", &disk(2.0, 20.0, 1));
        doc.record_disk_sample("n1", &disk(3.0, 10.0, 2));
        assert_eq!(doc.disk_usage.len(), 2);
        assert_eq!(doc.disk_usage[0].used_samples, vec![1.0, 3.0]);
        assert_eq!(doc.disk_usage[1].used_samples, vec![2.0]);
    }

    #[test]
    fn misaligned_series_is_realigned() {
        let mut values = vec![1.0, 2.0, 3.0];
        let mut timestamps = vec![10];
        push_aligned(&mut values, &mut timestamps, 4.0, 11);
        assert_eq!(values, vec![3.0, 4.0]);
        assert_eq!(timestamps, vec![10, 11]);
    }

    #[test]
    fn memory_window_stays_aligned() {
        let mut doc = ServerStatusDocument::default();
        for i in 0..15 {
            doc.record_memory_sample("n1", &memory(i as f64, (i * 2) as f64, i));
        }
        let entry = &doc.memory_pressure[0];
        assert_eq!(entry.memory_used_samples.len(), WINDOW_CAPACITY);
        assert_eq!(entry.swap_used_samples.len(), WINDOW_CAPACITY);
        assert_eq!(entry.sample_timestamps.len(), WINDOW_CAPACITY);
        assert_eq!(entry.memory_used_samples[0], 5.0);
        assert_eq!(entry.swap_used_samples[9], 28.0);
    }

    #[test]
    fn memory_totals_follow_validity_per_half() {
        let mut doc = ServerStatusDocument::default();
        doc.record_memory_sample("n1", &memory(100.0, 50.0, 1));
        let reading = MemoryReading {
            memory_total_mb: 2000.0,
            memory_used_mb: 150.0,
            swap_total_mb: 0.0,
            swap_used_mb: SENTINEL,
            timestamp: 2,
        };
        doc.record_memory_sample("n1", &reading);
        let entry = &doc.memory_pressure[0];
        assert_eq!(entry.memory_total_mb, 2000.0);
        assert_eq!(entry.swap_total_mb, 500.0);
        assert_eq!(entry.swap_used_samples, vec![50.0, -1.0]);
    }
}
