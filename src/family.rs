//! Program family registry and classifier.
//!
//! Grounded on `knhk_autonomic::analyze::AnalysisComponent`'s rule-registry and
//! match-by-criteria shape (`src/analyze/mod.rs`), collapsed from an open rule
//! set to the closed four-family set of spec.md §3, iterated in a fixed
//! stable order (design note §9a: the source's unordered map made
//! tie-breaking irreproducible).

use crate::history::HeapSnapshot;
use crate::policy::{Algorithm, LoadBalancingPolicy};
use serde::{Deserialize, Serialize};

/// Identity of one of the four predefined program families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FamilyId {
    /// Average recent MaGC duration <= 500ms.
    Short,
    /// Average recent MaGC duration in [500ms, 2000ms].
    Medium,
    /// Average recent MaGC duration >= 2000ms.
    Long,
    /// Fallback family when no other family's criteria hold.
    Default,
}

/// A predefined program family: evaluation criteria plus its preferred policy.
#[derive(Debug, Clone, Copy)]
pub struct ProgramFamily {
    /// This family's identity.
    pub id: FamilyId,
    /// Human-readable name.
    pub name: &'static str,
    /// Inclusive lower bound on average recent MaGC duration, in ms.
    pub min_avg_duration_ms: f64,
    /// Inclusive upper bound on average recent MaGC duration, in ms.
    pub max_avg_duration_ms: f64,
    /// Minimum number of durations sampled before this family can be selected.
    pub min_samples: usize,
    /// This family's preferred load-balancing algorithm.
    pub algorithm: Algorithm,
    /// Whether that algorithm is GC-aware.
    pub gc_aware: bool,
    /// Number of recent snapshots MaGA uses when this family is active.
    pub forecast_window: usize,
    /// MaGC forecast horizon, in ms.
    pub magc_threshold_ms: i64,
}

/// The closed, stably-ordered family registry: `[short, medium, long, default]`.
pub const FAMILIES: [ProgramFamily; 4] = [
    ProgramFamily {
        id: FamilyId::Short,
        name: "short",
        min_avg_duration_ms: 0.0,
        max_avg_duration_ms: 500.0,
        min_samples: 5,
        algorithm: Algorithm::Rr,
        gc_aware: true,
        forecast_window: 30,
        magc_threshold_ms: 1_000,
    },
    ProgramFamily {
        id: FamilyId::Medium,
        name: "medium",
        min_avg_duration_ms: 500.0,
        max_avg_duration_ms: 2_000.0,
        min_samples: 5,
        algorithm: Algorithm::Wrr,
        gc_aware: true,
        forecast_window: 30,
        magc_threshold_ms: 3_000,
    },
    ProgramFamily {
        id: FamilyId::Long,
        name: "long",
        min_avg_duration_ms: 2_000.0,
        max_avg_duration_ms: f64::INFINITY,
        min_samples: 3,
        algorithm: Algorithm::Wrr,
        gc_aware: true,
        forecast_window: 30,
        magc_threshold_ms: 5_000,
    },
    ProgramFamily {
        id: FamilyId::Default,
        name: "default",
        min_avg_duration_ms: f64::NEG_INFINITY,
        max_avg_duration_ms: f64::INFINITY,
        min_samples: 0,
        algorithm: Algorithm::Rr,
        gc_aware: false,
        forecast_window: 0,
        magc_threshold_ms: 2_000,
    },
];

/// Look up a family's static definition by id.
pub fn family(id: FamilyId) -> &'static ProgramFamily {
    FAMILIES.iter().find(|f| f.id == id).expect("closed family set")
}

impl ProgramFamily {
    /// This family's policy, derived from its algorithm/threshold/window.
    pub fn policy(&self) -> LoadBalancingPolicy {
        LoadBalancingPolicy {
            algorithm: self.algorithm,
            gc_aware: self.gc_aware,
            magc_threshold_ms: self.magc_threshold_ms,
            history_window_size: self.forecast_window,
        }
    }

    fn matches(&self, avg_duration_ms: f64, sample_count: usize) -> bool {
        sample_count >= self.min_samples
            && avg_duration_ms >= self.min_avg_duration_ms
            && avg_duration_ms <= self.max_avg_duration_ms
    }
}

/// Classify a worker's current family from its recent MaGC durations.
///
/// Gathers the last <= 10 snapshots with `last_magc_duration_ms > 0`; if none,
/// the worker keeps `default`. Otherwise computes the arithmetic mean and
/// selects the first family (in registry order) whose bounds strictly satisfy
/// the mean and sample-count requirement. If none matches, or the currently
/// assigned family becomes invalid, falls back to `default`.
pub fn classify(snapshots: &[HeapSnapshot], current: FamilyId) -> FamilyId {
    let durations: Vec<f64> = snapshots
        .iter()
        .rev()
        .filter(|s| s.last_magc_duration_ms > 0)
        .take(10)
        .map(|s| s.last_magc_duration_ms as f64)
        .collect();

    if durations.is_empty() {
        return FamilyId::Default;
    }

    let avg = durations.iter().sum::<f64>() / durations.len() as f64;
    let sample_count = durations.len();

    if let Some(matched) = FAMILIES.iter().find(|f| f.matches(avg, sample_count)) {
        return matched.id;
    }

    if family(current).matches(avg, sample_count) {
        current
    } else {
        FamilyId::Default
    }
}

/// Tally family assignments across all workers and, if a non-default family
/// has the plurality and its policy is GC-aware, return that policy. Ties
/// resolve to the family encountered first in `FAMILIES` order (spec.md §4.4).
pub fn adapt_policy(assignments: &[FamilyId]) -> Option<LoadBalancingPolicy> {
    let mut counts = [0usize; FAMILIES.len()];
    for assignment in assignments {
        if let Some(idx) = FAMILIES.iter().position(|f| f.id == *assignment) {
            counts[idx] += 1;
        }
    }

    let mut best_idx: Option<usize> = None;
    for (idx, family) in FAMILIES.iter().enumerate() {
        if family.id == FamilyId::Default {
            continue;
        }
        if counts[idx] == 0 {
            continue;
        }
        match best_idx {
            None => best_idx = Some(idx),
            Some(b) if counts[idx] > counts[b] => best_idx = Some(idx),
            _ => {}
        }
    }

    best_idx
        .map(|idx| &FAMILIES[idx])
        .filter(|f| f.gc_aware)
        .map(ProgramFamily::policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HeapSnapshot;
    use chrono::{DateTime, Utc};

    fn snap_with_duration(ms: u64) -> HeapSnapshot {
        HeapSnapshot {
            t: DateTime::<Utc>::UNIX_EPOCH,
            young_used: 0,
            old_used: 0,
            young_max: 50,
            old_max: 50,
            total_used: 0,
            total_max: 100,
            gc_count: 1,
            last_magc_end_time: Some(DateTime::<Utc>::UNIX_EPOCH),
            last_magc_duration_ms: ms,
            collecting: false,
        }
    }

    #[test]
    fn no_samples_stays_default() {
        assert_eq!(classify(&[], FamilyId::Default), FamilyId::Default);
    }

    #[test]
    fn medium_duration_classifies_medium() {
        let snaps: Vec<_> = (0..6).map(|_| snap_with_duration(1_000)).collect();
        assert_eq!(classify(&snaps, FamilyId::Default), FamilyId::Medium);
    }

    #[test]
    fn too_few_samples_for_long_falls_back_to_default() {
        // long needs min_samples=3; only 2 long-duration samples present.
        let snaps: Vec<_> = (0..2).map(|_| snap_with_duration(3_000)).collect();
        assert_eq!(classify(&snaps, FamilyId::Default), FamilyId::Default);
    }

    #[test]
    fn adapt_policy_picks_plurality_gc_aware_family() {
        let assignments = vec![FamilyId::Medium, FamilyId::Medium, FamilyId::Default, FamilyId::Short];
        let policy = adapt_policy(&assignments).expect("medium should win plurality");
        assert_eq!(policy.algorithm, Algorithm::Wrr);
    }

    #[test]
    fn adapt_policy_no_op_when_only_default() {
        let assignments = vec![FamilyId::Default, FamilyId::Default];
        assert!(adapt_policy(&assignments).is_none());
    }
}
