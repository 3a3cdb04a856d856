//! Injectable clock
//!
//! Every worker operation sleeps (100 ms probes, 300 ms submit entry, 500-600
//! ms payload, 100-5000 ms MaGC). These are load-bearing: they create the
//! temporal distance that makes MaGA's regression meaningful. Centralizing
//! them behind a `Clock` trait lets tests step time deterministically instead
//! of racing real sleeps (design note in spec.md §9: "implementers should
//! additionally... centralize the sleep behind an injectable clock").

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A source of time and sleeps, abstracted so tests can control both.
#[async_trait::async_trait]
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time as seen by this clock.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the caller for `d`. Under `SystemClock` this is a real sleep;
    /// under `ManualClock` it advances the logical clock instantly.
    async fn sleep(&self, d: Duration);
}

/// Real wall-clock time, backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

/// A manually-advanced clock for deterministic tests. `sleep` advances the
/// logical clock by `d` and yields once to the executor rather than
/// suspending for real time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    epoch: DateTime<Utc>,
    offset_ms: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a manual clock starting at a fixed epoch.
    pub fn new(epoch: DateTime<Utc>) -> Self {
        Self {
            epoch,
            offset_ms: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Advance the clock without yielding (useful outside async contexts).
    pub fn advance(&self, d: Duration) {
        self.offset_ms
            .fetch_add(d.as_millis() as i64, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.epoch + chrono::Duration::milliseconds(self.offset_ms.load(Ordering::SeqCst))
    }

    async fn sleep(&self, d: Duration) {
        self.advance(d);
        tokio::task::yield_now().await;
    }
}

/// A shared, type-erased clock handle.
pub type SharedClock = Arc<dyn Clock>;
