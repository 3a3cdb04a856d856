//! Per-worker bounded telemetry ring.
//!
//! Grounded on `knhk_autonomic::monitor::MonitoringComponent`'s per-metric
//! `Vec<f64>` history with `max_history_size` FIFO eviction
//! (`src/monitor/mod.rs::update_metric`), generalized from a flat `f64`
//! series to a ring of full heap snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// An immutable, timestamped snapshot of a worker's heap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeapSnapshot {
    /// When the snapshot was taken.
    pub t: DateTime<Utc>,
    /// Young-generation bytes in use.
    pub young_used: u64,
    /// Old-generation bytes in use.
    pub old_used: u64,
    /// Young-generation capacity.
    pub young_max: u64,
    /// Old-generation capacity.
    pub old_max: u64,
    /// `young_used + old_used`.
    pub total_used: u64,
    /// `young_max + old_max`.
    pub total_max: u64,
    /// Lifetime MaGC count at the time of this snapshot.
    pub gc_count: u64,
    /// When the worker's last MaGC ended, if any.
    pub last_magc_end_time: Option<DateTime<Utc>>,
    /// How long the worker's last MaGC took, in ms (0 if never collected).
    pub last_magc_duration_ms: u64,
    /// Whether the worker was mid-collection when this snapshot was taken.
    pub collecting: bool,
}

/// A fixed-capacity FIFO ring of [`HeapSnapshot`]s for a single worker.
#[derive(Debug, Clone)]
pub struct TelemetryHistory {
    capacity: usize,
    snapshots: VecDeque<HeapSnapshot>,
}

impl TelemetryHistory {
    /// Create an empty ring with the given capacity (default 100 per spec).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            snapshots: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Append a snapshot, dropping the oldest one if the ring is full.
    pub fn push(&mut self, snapshot: HeapSnapshot) {
        if self.snapshots.len() >= self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    /// Number of snapshots currently retained.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether the ring holds no snapshots.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// A value-copy of the last `k` snapshots, oldest first, bounded by
    /// however many are actually present.
    pub fn window(&self, k: usize) -> Vec<HeapSnapshot> {
        let k = k.min(self.snapshots.len());
        self.snapshots
            .iter()
            .skip(self.snapshots.len() - k)
            .cloned()
            .collect()
    }

    /// A value-copy of every retained snapshot, oldest first.
    pub fn all(&self) -> Vec<HeapSnapshot> {
        self.snapshots.iter().cloned().collect()
    }

    /// The most recent `limit` snapshots (or all of them), most recent last,
    /// matching the external `GCHistory(worker, limit)` contract.
    pub fn recent(&self, limit: usize) -> Vec<HeapSnapshot> {
        self.window(limit)
    }
}
