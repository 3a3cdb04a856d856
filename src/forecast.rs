//! MaGA — the two-stage linear-regression forecaster.
//!
//! Generalized from `knhk_autonomic::monitor::MonitoringComponent::calculate_trend`'s
//! least-squares slope computation (`src/monitor/mod.rs`), which fits a single
//! line over a trailing window to classify a trend direction. Here the same
//! least-squares machinery is used twice, decoupling "how full can young get
//! before old triggers MaGC?" from "how fast is young filling?".

use crate::history::HeapSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The only numerical safeguard against a singular normal-equation denominator.
const DENOMINATOR_EPSILON: f64 = 1e-10;

/// A forecast of the next Major GC event for one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagcForecast {
    /// The predicted wall-clock time of the next MaGC.
    pub predicted_time: DateTime<Utc>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Predicted young-generation usage at the moment old hits 90% of its max.
    pub young_gen_threshold: f64,
    /// Milliseconds from `created_at` until the predicted MaGC.
    pub time_to_magc_ms: f64,
    /// When this forecast was produced.
    pub created_at: DateTime<Utc>,
}

impl MagcForecast {
    /// A forecast is stale if it is older than `freshness_ms`.
    pub fn is_stale(&self, now: DateTime<Utc>, freshness_ms: i64) -> bool {
        (now - self.created_at).num_milliseconds() > freshness_ms
    }
}

/// Ordinary least squares over `(x, y)` pairs: returns `(slope, intercept)`,
/// or `None` if `|n*sum(x^2) - sum(x)^2| < DENOMINATOR_EPSILON`.
fn least_squares(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|(x, _)| x).sum();
    let sum_y: f64 = points.iter().map(|(_, y)| y).sum();
    let sum_xx: f64 = points.iter().map(|(x, _)| x * x).sum();
    let sum_xy: f64 = points.iter().map(|(x, y)| x * y).sum();

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < DENOMINATOR_EPSILON {
        return None;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    Some((slope, intercept))
}

/// Run the two-stage MaGA forecast over a snapshot window.
///
/// `window` must already be trimmed to `min(family.forecast_window, |history|)`
/// snapshots by the caller; this function requires at least 5 to produce a
/// forecast (spec.md §4.3: `|W| >= 5`).
pub fn forecast(window: &[HeapSnapshot], now: DateTime<Utc>) -> Option<MagcForecast> {
    if window.len() < 5 {
        return None;
    }

    // Stage 1: YoungUsed ~ a*OldUsed + b, predicted at OldUsed = 0.9*OldMax.
    let stage1_points: Vec<(f64, f64)> = window
        .iter()
        .map(|s| (s.old_used as f64, s.young_used as f64))
        .collect();
    let (a, b) = least_squares(&stage1_points)?;
    let old_max = window.last().map(|s| s.old_max as f64).unwrap_or(0.0);
    let young_gen_threshold = (a * 0.9 * old_max + b).max(0.0);

    // Stage 2: deltaT_ms ~ c*YoungUsed + d, origin at W[0].t.
    let t0 = window[0].t;
    let stage2_points: Vec<(f64, f64)> = window
        .iter()
        .map(|s| {
            let dt_ms = (s.t - t0).num_milliseconds() as f64;
            (s.young_used as f64, dt_ms)
        })
        .collect();
    let (c, d) = least_squares(&stage2_points)?;

    let t_predicted_ms = c * young_gen_threshold + d;
    let elapsed_ms = (now - t0).num_milliseconds() as f64;
    let time_to_magc_ms = (t_predicted_ms - elapsed_ms).max(0.0);

    let mut confidence = (window.len() as f64 / 20.0).min(1.0);
    let last_age_ms = (now - window.last().unwrap().t).num_milliseconds();
    if last_age_ms > 30_000 {
        confidence *= 0.5;
    }

    Some(MagcForecast {
        predicted_time: now + chrono::Duration::milliseconds(time_to_magc_ms as i64),
        confidence,
        young_gen_threshold,
        time_to_magc_ms,
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(t_ms: i64, young: u64, old: u64) -> HeapSnapshot {
        HeapSnapshot {
            t: DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::milliseconds(t_ms),
            young_used: young,
            old_used: old,
            young_max: 50,
            old_max: 50,
            total_used: young + old,
            total_max: 100,
            gc_count: 0,
            last_magc_end_time: None,
            last_magc_duration_ms: 0,
            collecting: false,
        }
    }

    #[test]
    fn too_few_samples_yields_no_forecast() {
        let window = vec![snapshot(0, 1, 1), snapshot(100, 2, 2)];
        let now = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::milliseconds(100);
        assert!(forecast(&window, now).is_none());
    }

    #[test]
    fn monotonic_growth_yields_a_forecast() {
        let window: Vec<_> = (0..10)
            .map(|i| snapshot(i * 1000, 1 + i as u64, 1 + i as u64))
            .collect();
        let now = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::milliseconds(9_000);
        let f = forecast(&window, now).expect("forecast should be produced");
        assert!(f.confidence > 0.0);
        assert!(f.time_to_magc_ms >= 0.0);
    }

    #[test]
    fn confidence_is_monotone_in_window_size_and_halves_when_stale() {
        let make = |n: i64| -> Vec<HeapSnapshot> {
            (0..n)
                .map(|i| snapshot(i * 1000, 1 + i as u64, 1 + i as u64))
                .collect()
        };

        let small = make(5);
        let big = make(20);
        let now = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::milliseconds(19_000);

        let f_small = forecast(&small, now).unwrap();
        let f_big = forecast(&big, now).unwrap();
        assert!(f_big.confidence >= f_small.confidence);
        assert_eq!(f_big.confidence, 1.0);

        let stale_now = now + chrono::Duration::milliseconds(31_000);
        let f_stale = forecast(&big, stale_now).unwrap();
        assert_eq!(f_stale.confidence, 0.5);
    }
}
