//! Worker: one simulated generational heap plus its task executor.
//!
//! Grounded on the `nativelink` `Workers`/`Worker` shape
//! (`examples/other_examples/301feb4d_nativelink-nativelink__...workers.rs.rs`)
//! for the "iterate, test predicate, select" pattern the Dispatcher later
//! builds on, and on `Starlight-JS-comet::generational`
//! (`examples/other_examples/094173e7_...generational.rs.rs`) for young/old
//! generation terminology and promotion-on-overflow.

use crate::clock::SharedClock;
use crate::config::Config;
use crate::family::FamilyId;
use crate::forecast::MagcForecast;
use crate::history::{HeapSnapshot, TelemetryHistory};
use crate::payload::TaskPayload;
use crate::task::{TaskResult, TaskStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Stable identity for a worker, fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u32);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration that must be set before `start` (`Configure` in spec.md §4.1).
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Total heap limit.
    pub heap_max: u64,
    /// GC trigger fraction in `(0, 1]`.
    pub gc_frac: f64,
}

/// Parameters of the MaGC duration formula, carried from [`Config`] so every
/// worker shares the same base/coefficient/clip bounds.
#[derive(Debug, Clone, Copy)]
pub struct GcDurationParams {
    pub base_ms: f64,
    pub coeff_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl From<&Config> for GcDurationParams {
    fn from(c: &Config) -> Self {
        Self {
            base_ms: c.gc_duration_base_ms,
            coeff_ms: c.gc_duration_coeff_ms,
            min_ms: c.gc_duration_min_ms,
            max_ms: c.gc_duration_max_ms,
        }
    }
}

#[derive(Debug)]
struct WorkerState {
    heap_max: u64,
    gc_frac: f64,
    young_max: u64,
    old_max: u64,
    young_used: u64,
    old_used: u64,
    collecting: bool,
    in_flight: u32,
    gc_count: u64,
    last_magc_end_time: Option<DateTime<Utc>>,
    last_magc_duration_ms: u64,
    weight: u32,
    runtime_weight: u32,
    family: FamilyId,
    last_forecast: Option<MagcForecast>,
    history: TelemetryHistory,
    task_ids: Vec<Uuid>,
}

impl WorkerState {
    fn total_used(&self) -> u64 {
        self.young_used + self.old_used
    }

    fn busy(&self) -> bool {
        self.collecting || self.in_flight > 0
    }
}

/// One simulated worker instance: identity, generational heap, and executor.
#[derive(Debug)]
pub struct Worker {
    id: WorkerId,
    clock: SharedClock,
    payload: Arc<dyn TaskPayload>,
    gc_params: GcDurationParams,
    history_capacity: usize,
    state: Mutex<WorkerState>,
    tasks_processed: AtomicU32,
}

impl Worker {
    /// Configure and start a worker in one call (spec.md's `Configure` then
    /// `Start`, collapsed into a single constructor since workers are created
    /// once at startup and fixed for the process lifetime).
    pub fn new(
        id: WorkerId,
        config: WorkerConfig,
        gc_params: GcDurationParams,
        history_capacity: usize,
        default_weight: u32,
        clock: SharedClock,
        payload: Arc<dyn TaskPayload>,
    ) -> Self {
        let half = config.heap_max / 2;
        Self {
            id,
            clock,
            payload,
            gc_params,
            history_capacity,
            tasks_processed: AtomicU32::new(0),
            state: Mutex::new(WorkerState {
                heap_max: config.heap_max,
                gc_frac: config.gc_frac,
                young_max: half,
                old_max: half,
                young_used: 0,
                old_used: 0,
                collecting: false,
                in_flight: 0,
                gc_count: 0,
                last_magc_end_time: None,
                last_magc_duration_ms: 0,
                weight: default_weight.max(1),
                runtime_weight: default_weight.max(1),
                family: FamilyId::Default,
                last_forecast: None,
                history: TelemetryHistory::new(history_capacity),
                task_ids: Vec::new(),
            }),
        }
    }

    /// This worker's stable identity.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// `Available() -> bool`: true iff not mid-MaGC. Blocks 100ms (spec.md §4.1).
    #[instrument(skip(self))]
    pub async fn available(&self) -> bool {
        self.clock.sleep(Duration::from_millis(100)).await;
        !self.state.lock().collecting
    }

    /// `CheckCapacityOrReclaim` (spec.md design note §9b names the side effect
    /// explicitly): returns whether `size` currently fits. If it does not,
    /// synchronously triggers MaGC so a subsequent dispatch attempt may
    /// succeed. Blocks 100ms before the check (spec.md §4.1).
    #[instrument(skip(self))]
    pub async fn check_capacity_or_reclaim(&self, size: u64) -> bool {
        self.clock.sleep(Duration::from_millis(100)).await;
        let fits = {
            let st = self.state.lock();
            st.total_used() + size <= st.heap_max
        };
        if !fits {
            debug!(worker = self.id.0, size, "capacity check failed, triggering MaGC");
            self.trigger_magc().await;
        }
        fits
    }

    /// External-contract alias for [`Worker::check_capacity_or_reclaim`].
    pub async fn can_accept(&self, size: u64) -> bool {
        self.check_capacity_or_reclaim(size).await
    }

    /// `Ping() -> telemetry map`: a snapshot of current flags and usage.
    /// Blocks 100ms (spec.md §4.1).
    pub async fn ping(&self) -> PingInfo {
        self.clock.sleep(Duration::from_millis(100)).await;
        let st = self.state.lock();
        let total_used = st.total_used();
        PingInfo {
            id: self.id,
            available: !st.collecting,
            collecting: st.collecting,
            busy: st.busy(),
            mem_used_pct: if st.heap_max == 0 {
                0.0
            } else {
                total_used as f64 / st.heap_max as f64 * 100.0
            },
            tasks_processed: self.tasks_processed.load(Ordering::Relaxed),
            task_ids: st.task_ids.clone(),
            memory_usage: total_used,
        }
    }

    /// `ForecastValid(thresholdMs) -> bool`.
    pub fn forecast_valid(&self, threshold_ms: i64, now: DateTime<Utc>, freshness_ms: i64) -> bool {
        let st = self.state.lock();
        match &st.last_forecast {
            Some(f) if !f.is_stale(now, freshness_ms) => {
                let until_ms = (f.predicted_time - now).num_milliseconds();
                (0..=threshold_ms).contains(&until_ms)
            }
            _ => false,
        }
    }

    /// `Submit(input) -> Pending{ResultChannel}`. Returns immediately with a
    /// one-shot receiver for the eventual result; blocks 300ms before
    /// spawning the executor (spec.md §4.1).
    #[instrument(skip(self, input, worker))]
    pub async fn submit(worker: &Arc<Worker>, input: String) -> oneshot::Receiver<TaskResult> {
        worker.clock.sleep(Duration::from_millis(300)).await;

        let (tx, rx) = oneshot::channel();
        let task_id = Uuid::new_v4();
        let worker = Arc::clone(worker);
        tokio::spawn(async move {
            worker.execute_task(task_id, input, tx).await;
        });
        rx
    }

    async fn execute_task(self: Arc<Self>, task_id: Uuid, input: String, tx: oneshot::Sender<TaskResult>) {
        let created_at = self.clock.now();

        if !self.available().await || !self.can_accept(input.len() as u64).await {
            let _ = tx.send(TaskResult {
                id: task_id,
                input,
                output: String::new(),
                status: TaskStatus::Rejected,
                reason: Some("worker unavailable or over capacity".to_string()),
                created_at,
            });
            return;
        }

        {
            let mut st = self.state.lock();
            if st.collecting {
                drop(st);
                let _ = tx.send(TaskResult {
                    id: task_id,
                    input,
                    output: String::new(),
                    status: TaskStatus::Rejected,
                    reason: Some("worker entered MaGC before admission".to_string()),
                    created_at,
                });
                return;
            }
            st.in_flight += 1;
            st.task_ids.push(task_id);
            self.charge_heap(&mut st, input.len() as u64);
        }

        let output = self.payload.run(&input, &self.clock).await;

        let should_collect = {
            let mut st = self.state.lock();
            st.in_flight = st.in_flight.saturating_sub(1);
            st.task_ids.retain(|id| *id != task_id);
            st.total_used() as f64 / st.heap_max.max(1) as f64 >= st.gc_frac
        };

        self.tasks_processed.fetch_add(1, Ordering::Relaxed);
        let _ = tx.send(TaskResult {
            id: task_id,
            input,
            output,
            status: TaskStatus::Completed,
            reason: None,
            created_at,
        });

        if should_collect {
            let worker = Arc::clone(&self);
            tokio::spawn(async move {
                worker.trigger_magc().await;
            });
        }
    }

    /// Heap accounting on task admission (spec.md §4.1).
    fn charge_heap(&self, st: &mut WorkerState, size: u64) {
        let young_inc = (size as f64 * 0.8).floor() as u64;
        let old_inc = size - young_inc;

        st.young_used = (st.young_used + young_inc).min(st.young_max);
        st.old_used = (st.old_used + old_inc).min(st.old_max);

        if st.young_used > st.young_max / 2 {
            let promote = st.young_used / 4;
            st.young_used = st.young_used.saturating_sub(promote);
            st.old_used = (st.old_used + promote).min(st.old_max);
        }
    }

    /// The MaGC sequence (spec.md §4.1): set `Collecting`, sleep for the
    /// computed duration, record stats, and reset the heap.
    #[instrument(skip(self))]
    async fn trigger_magc(&self) {
        let utilization = {
            let mut st = self.state.lock();
            if st.collecting {
                return;
            }
            st.collecting = true;
            st.total_used() as f64 / st.heap_max.max(1) as f64
        };

        let raw = self.gc_params.base_ms + self.gc_params.coeff_ms * utilization;
        let jitter = rand::thread_rng().gen_range(-0.2 * raw..=0.2 * raw);
        let duration_ms = (raw + jitter)
            .clamp(self.gc_params.min_ms as f64, self.gc_params.max_ms as f64) as u64;

        self.clock.sleep(Duration::from_millis(duration_ms)).await;

        let now = self.clock.now();
        let mut st = self.state.lock();
        st.last_magc_duration_ms = duration_ms;
        st.last_magc_end_time = Some(now);
        st.gc_count += 1;
        st.young_used = 0;
        st.old_used = 0;
        st.task_ids.clear();
        st.collecting = false;
        warn!(worker = self.id.0, duration_ms, "MaGC complete");
    }

    /// Take a value-copy heap snapshot right now (used by the Monitor tick).
    pub fn snapshot(&self) -> HeapSnapshot {
        let now = self.clock.now();
        let st = self.state.lock();
        HeapSnapshot {
            t: now,
            young_used: st.young_used,
            old_used: st.old_used,
            young_max: st.young_max,
            old_max: st.old_max,
            total_used: st.total_used(),
            total_max: st.young_max + st.old_max,
            gc_count: st.gc_count,
            last_magc_end_time: st.last_magc_end_time,
            last_magc_duration_ms: st.last_magc_duration_ms,
            collecting: st.collecting,
        }
    }

    /// Append a fresh snapshot to this worker's own telemetry ring.
    pub fn push_snapshot(&self) {
        let snapshot = self.snapshot();
        self.state.lock().history.push(snapshot);
    }

    /// Most recent `limit` snapshots, most recent last (`GCHistory` contract).
    pub fn history_recent(&self, limit: usize) -> Vec<HeapSnapshot> {
        self.state.lock().history.recent(limit)
    }

    /// A forecast window of up to `k` of the most recent snapshots.
    pub fn forecast_window(&self, k: usize) -> Vec<HeapSnapshot> {
        self.state.lock().history.window(k)
    }

    /// Snapshots with a recorded MaGC duration, most recent last, for the classifier.
    pub fn history_all(&self) -> Vec<HeapSnapshot> {
        self.state.lock().history.all()
    }

    /// Current family assignment.
    pub fn family(&self) -> FamilyId {
        self.state.lock().family
    }

    /// Overwrite the family assignment (Analyzer tick).
    pub fn set_family(&self, family: FamilyId) {
        self.state.lock().family = family;
    }

    /// Replace `LastForecast` in place (Analyzer tick).
    pub fn set_forecast(&self, forecast: Option<MagcForecast>) {
        self.state.lock().last_forecast = forecast;
    }

    /// Current `LastForecast`, if any (`TRINIStatus`'s `perWorker.lastForecast`).
    pub fn forecast(&self) -> Option<MagcForecast> {
        self.state.lock().last_forecast.clone()
    }

    /// Current `(YoungUsed, OldUsed)` generation occupancy.
    pub fn generations(&self) -> (u64, u64) {
        let st = self.state.lock();
        (st.young_used, st.old_used)
    }

    /// Lifecycle `GCCount` (`TRINIStatus`'s `perWorker.gcCount`).
    pub fn gc_count(&self) -> u64 {
        self.state.lock().gc_count
    }

    /// Static weight used to replenish `RuntimeWeight`.
    pub fn weight(&self) -> u32 {
        self.state.lock().weight
    }

    /// Overwrite the static weight; clamps `RuntimeWeight` down to match.
    pub fn set_weight(&self, weight: u32) {
        let mut st = self.state.lock();
        st.weight = weight.max(1);
        st.runtime_weight = st.runtime_weight.min(st.weight);
    }

    /// Current `RuntimeWeight`.
    pub fn runtime_weight(&self) -> u32 {
        self.state.lock().runtime_weight
    }

    /// Replenish `RuntimeWeight` to the static `Weight`.
    pub fn replenish_runtime_weight(&self) {
        let mut st = self.state.lock();
        st.runtime_weight = st.weight;
    }

    /// Reset `RuntimeWeight` to zero (used when the algorithm changes away
    /// from WRR, see DESIGN.md open question (c)).
    pub fn reset_runtime_weight(&self) {
        self.state.lock().runtime_weight = 0;
    }

    /// Tentatively decrement `RuntimeWeight` if positive; returns whether it
    /// decremented. Pair with [`Worker::undo_runtime_weight`] to back out a
    /// rejected tentative selection (WRR's decrement-then-test semantics,
    /// spec.md design note §9d).
    pub fn try_take_runtime_weight(&self) -> bool {
        let mut st = self.state.lock();
        if st.runtime_weight > 0 {
            st.runtime_weight -= 1;
            true
        } else {
            false
        }
    }

    /// Undo a [`Worker::try_take_runtime_weight`] that was not used.
    pub fn undo_runtime_weight(&self) {
        let mut st = self.state.lock();
        st.runtime_weight = (st.runtime_weight + 1).min(st.weight);
    }
}

/// Snapshot of a worker's flags and usage, returned by `Ping`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingInfo {
    /// The pinged worker's id.
    pub id: WorkerId,
    /// Whether the worker can currently accept new tasks.
    pub available: bool,
    /// Whether the worker is mid-MaGC.
    pub collecting: bool,
    /// Whether the worker has any in-flight work or is collecting.
    pub busy: bool,
    /// `TotalUsed / HeapMax * 100`.
    pub mem_used_pct: f64,
    /// Lifetime count of completed tasks.
    pub tasks_processed: u32,
    /// Ids of tasks currently in flight.
    pub task_ids: Vec<Uuid>,
    /// `TotalUsed` in bytes.
    pub memory_usage: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::payload::Sha256Payload;

    fn test_worker(id: u32, heap_max: u64) -> Arc<Worker> {
        let clock: SharedClock = Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH));
        Arc::new(Worker::new(
            WorkerId(id),
            WorkerConfig { heap_max, gc_frac: 0.8 },
            GcDurationParams { base_ms: 10_000.0, coeff_ms: 2_500.0, min_ms: 100, max_ms: 5_000 },
            100,
            1,
            clock,
            Arc::new(Sha256Payload),
        ))
    }

    #[tokio::test]
    async fn heap_invariants_hold_after_admission() {
        let worker = test_worker(1, 100);
        assert!(worker.can_accept(10).await);
        let rx = Worker::submit(&worker, "hello".to_string()).await;
        let result = rx.await.unwrap();
        assert_eq!(result.status, TaskStatus::Completed);

        let snap = worker.snapshot();
        assert!(snap.young_used <= snap.young_max);
        assert!(snap.old_used <= snap.old_max);
    }

    #[tokio::test]
    async fn overflow_triggers_magc_and_rejects() {
        let worker = test_worker(1, 10);
        // Exhaust capacity directly so the next check must reclaim.
        {
            let mut st = worker.state.lock();
            st.young_used = st.young_max;
            st.old_used = st.old_max;
        }
        assert!(!worker.can_accept(5).await);
        assert!(worker.state.lock().collecting);
    }

    #[tokio::test]
    async fn magc_completion_zeroes_heap_and_clears_collecting() {
        let worker = test_worker(1, 10);
        {
            let mut st = worker.state.lock();
            st.young_used = st.young_max;
            st.old_used = st.old_max;
        }
        worker.trigger_magc().await;
        let st = worker.state.lock();
        assert_eq!(st.total_used(), 0);
        assert!(!st.collecting);
        assert_eq!(st.gc_count, 1);
    }
}
