//! Load-balancing policy and the four GC-aware algorithms.
//!
//! Restructured from `knhk_autonomic::types::Policy` (a SPARQL-trigger record)
//! to carry a closed `Algorithm` enum instead of an open query language, since
//! this domain's "trigger" is the fixed family-to-algorithm table of spec.md
//! §3, not an open rule set.

use serde::{Deserialize, Serialize};

/// One of the four GC-aware (or non-GC-aware) selection algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// Round robin.
    Rr,
    /// Uniform random.
    Ran,
    /// Weighted round robin.
    Wrr,
    /// Weighted random.
    Wran,
}

impl Algorithm {
    /// Parse an algorithm name, case-insensitively. Returns `None` on an
    /// unrecognized name (surfaced by `SetPolicy` as a `Validation` error).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RR" => Some(Algorithm::Rr),
            "RAN" => Some(Algorithm::Ran),
            "WRR" => Some(Algorithm::Wrr),
            "WRAN" => Some(Algorithm::Wran),
            _ => None,
        }
    }
}

/// The cluster-wide selection policy, owned by the Dispatcher and replaceable
/// atomically by the Classifier or by an external operator via `SetPolicy`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancingPolicy {
    /// Which algorithm to run.
    pub algorithm: Algorithm,
    /// Whether the GC guard (forecast filtering) applies at all.
    pub gc_aware: bool,
    /// Forecast horizon, in ms, used by `ForecastValid`.
    pub magc_threshold_ms: i64,
    /// Size of the forecast window the family driving this policy uses.
    pub history_window_size: usize,
}

impl LoadBalancingPolicy {
    /// The plain, non-GC-aware round-robin policy used as a fallback and as
    /// the `default` family's policy.
    pub fn plain_round_robin() -> Self {
        Self {
            algorithm: Algorithm::Rr,
            gc_aware: false,
            magc_threshold_ms: 2_000,
            history_window_size: 0,
        }
    }
}
