//! Runtime configuration for the dispatch engine.
//!
//! Every tunable named across spec.md lives here so an operator can load it
//! from the environment or a TOML file via the `config` crate, the way the
//! teacher workspace carries a `config` dependency for exactly this purpose.

use crate::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How often the Monitor loop snapshots every worker.
    pub monitor_interval_ms: u64,

    /// How often the Analyzer loop reclassifies families and refreshes forecasts.
    pub analysis_interval_ms: u64,

    /// Telemetry ring capacity per worker.
    pub history_capacity: usize,

    /// Forecast freshness window; a `LastForecast` older than this is stale.
    pub forecast_freshness_ms: i64,

    /// Heap limit assigned to every worker at `Start`.
    pub heap_max: u64,

    /// GC trigger fraction (`TotalUsed/HeapMax >= gc_frac` schedules async MaGC).
    pub gc_frac: f64,

    /// Initial static weight assigned to every worker.
    pub default_weight: u32,

    /// Base component of the MaGC duration formula, in ms.
    pub gc_duration_base_ms: f64,

    /// Coefficient applied to `TotalUsed/HeapMax` in the MaGC duration formula.
    pub gc_duration_coeff_ms: f64,

    /// Lower clip bound for MaGC duration, in ms.
    pub gc_duration_min_ms: u64,

    /// Upper clip bound for MaGC duration, in ms. Structurally dominates the
    /// base/coefficient terms for any non-negative utilization — preserved
    /// as observed source behavior, see DESIGN.md open question (a).
    pub gc_duration_max_ms: u64,

    /// Whether TRINI (the MAPE-K loop) is active at startup.
    pub trini_active: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitor_interval_ms: 2_000,
            analysis_interval_ms: 10_000,
            history_capacity: 100,
            forecast_freshness_ms: 30_000,
            heap_max: 100,
            gc_frac: 0.8,
            default_weight: 1,
            gc_duration_base_ms: 10_000.0,
            gc_duration_coeff_ms: 2_500.0,
            gc_duration_min_ms: 100,
            gc_duration_max_ms: 5_000,
            trini_active: true,
        }
    }
}

impl Config {
    /// Load configuration layered as defaults < TOML file < environment
    /// variables prefixed `TRINI_` (e.g. `TRINI_MONITOR_INTERVAL_MS=1000`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default()).map_err(|e| {
                DispatchError::Config(format!("failed to seed defaults: {e}"))
            })?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(config::Environment::with_prefix("TRINI"));

        let settled = builder
            .build()
            .map_err(|e| DispatchError::Config(format!("failed to build config: {e}")))?;

        settled
            .try_deserialize()
            .map_err(|e| DispatchError::Config(format!("failed to deserialize config: {e}")))
    }

    /// Monitor tick cadence as a [`Duration`].
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Analyzer tick cadence as a [`Duration`].
    pub fn analysis_interval(&self) -> Duration {
        Duration::from_millis(self.analysis_interval_ms)
    }
}
