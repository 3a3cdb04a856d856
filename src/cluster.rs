//! Public facade: the cluster's external interface (spec.md §6).
//!
//! Grounded on `AutonomicController`'s role as the single public entry point
//! wrapping every sub-component (`src/controller.rs`), generalized from one
//! MAPE-K controller instance to one that additionally owns the worker pool
//! and the shared dispatch policy the controller's Analyzer mutates.

use crate::clock::Clock;
use crate::config::Config;
use crate::controller::Controller;
use crate::dispatcher::{self, RrCursor};
use crate::error::{DispatchError, Result};
use crate::family::{self, FamilyId, ProgramFamily};
use crate::forecast::MagcForecast;
use crate::history::HeapSnapshot;
use crate::payload::{Sha256Payload, TaskPayload};
use crate::policy::{Algorithm, LoadBalancingPolicy};
use crate::task::TaskResult;
use crate::worker::{GcDurationParams, Worker, WorkerConfig, WorkerId};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, instrument};

/// Per-worker telemetry slice reported by `TRINIStatus` (spec.md §6).
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    /// The worker this slice describes.
    pub id: WorkerId,
    /// Current program family classification.
    pub family: FamilyId,
    /// Number of snapshots retained in this worker's telemetry ring.
    pub gc_history_count: usize,
    /// The worker's current `LastForecast`, if any.
    pub last_forecast: Option<MagcForecast>,
    /// Current `(YoungUsed, OldUsed)` generation occupancy.
    pub generations: (u64, u64),
    /// Lifecycle `GCCount`.
    pub gc_count: u64,
    /// Static dispatcher weight.
    pub weight: u32,
}

/// Cluster-wide status, as returned by `TRINIStatus`.
#[derive(Debug, Clone)]
pub struct TriniStatus {
    /// Whether the MAPE-K loop is currently active.
    pub active: bool,
    /// Configured Monitor tick interval, in milliseconds.
    pub monitor_interval_ms: u64,
    /// Configured Analyzer tick interval, in milliseconds.
    pub analysis_interval_ms: u64,
    /// Number of distinct program families in the registry.
    pub family_count: usize,
    /// Monitor ticks executed since start.
    pub monitor_cycles: u64,
    /// Analyzer ticks executed since start.
    pub analysis_cycles: u64,
    /// The currently installed cluster-wide policy.
    pub policy: LoadBalancingPolicy,
    /// A telemetry slice for every worker in the pool.
    pub per_worker: Vec<WorkerStatus>,
}

/// `ListFamilies()`'s result: the closed program family registry plus the
/// id a freshly started worker is assigned before its first classification.
#[derive(Debug, Clone)]
pub struct FamilyRegistry {
    /// The family newly started workers default to.
    pub default_id: FamilyId,
    /// Every registered program family.
    pub families: &'static [ProgramFamily; 4],
}

/// The dispatch engine: a fixed pool of workers, a shared selection policy,
/// and the background Monitor/Analyzer loops that keep both current.
pub struct Cluster {
    workers: Arc<Vec<Arc<Worker>>>,
    policy: Arc<RwLock<LoadBalancingPolicy>>,
    controller: Arc<Controller>,
    rr_cursor: RrCursor,
    clock: crate::clock::SharedClock,
    config: Config,
}

impl Cluster {
    /// `Configure` + `Start`: build `worker_count` workers and start the
    /// background loops (spec.md §4.1, §4.6).
    pub fn start(config: Config, worker_count: u32) -> Arc<Self> {
        Self::start_with_payload(config, worker_count, Arc::new(Sha256Payload))
    }

    /// As [`Cluster::start`], with an injectable clock and payload — used by
    /// tests to run deterministically.
    pub fn start_with_clock_and_payload(
        config: Config,
        worker_count: u32,
        clock: crate::clock::SharedClock,
        payload: Arc<dyn TaskPayload>,
    ) -> Arc<Self> {
        let gc_params = GcDurationParams::from(&config);
        let workers: Vec<Arc<Worker>> = (0..worker_count)
            .map(|i| {
                Arc::new(Worker::new(
                    WorkerId(i),
                    WorkerConfig {
                        heap_max: config.heap_max,
                        gc_frac: config.gc_frac,
                    },
                    gc_params,
                    config.history_capacity,
                    config.default_weight,
                    Arc::clone(&clock),
                    Arc::clone(&payload),
                ))
            })
            .collect();

        Self::from_workers(config, workers, clock)
    }

    fn start_with_payload(config: Config, worker_count: u32, payload: Arc<dyn TaskPayload>) -> Arc<Self> {
        let clock: crate::clock::SharedClock = Arc::new(crate::clock::SystemClock);
        Self::start_with_clock_and_payload(config, worker_count, clock, payload)
    }

    fn from_workers(
        config: Config,
        workers: Vec<Arc<Worker>>,
        clock: crate::clock::SharedClock,
    ) -> Arc<Self> {
        let policy = Arc::new(RwLock::new(LoadBalancingPolicy::plain_round_robin()));
        let controller = Arc::new(Controller::new(
            config.clone(),
            Arc::new(workers.clone()),
            Arc::clone(&policy),
            Arc::clone(&clock),
        ));
        controller.start();

        let cluster = Arc::new(Self {
            workers: Arc::new(workers),
            policy,
            controller,
            rr_cursor: RrCursor::new(),
            clock,
            config,
        });
        info!(workers = cluster.workers.len(), "cluster started");
        cluster
    }

    /// Stop the background Monitor/Analyzer loops. Workers keep serving
    /// already-admitted tasks; no further family/forecast updates occur.
    pub fn stop(&self) {
        self.controller.stop();
    }

    /// `Dispatch(input) -> WorkerId`: select a worker under the current
    /// policy without submitting any task (spec.md §6). Rejects empty input
    /// (spec.md §4.1 validation).
    #[instrument(skip(self, input))]
    pub async fn dispatch(&self, input: &str) -> Result<WorkerId> {
        if input.is_empty() {
            return Err(DispatchError::Validation("task input must not be empty".to_string()));
        }

        let chosen = self.select(input.len() as u64).await?;
        Ok(chosen.id())
    }

    /// `Submit(input) -> TaskResult`: select a worker and run the task to
    /// completion (spec.md §6). Rejects empty input (spec.md §4.1 validation).
    #[instrument(skip(self, input))]
    pub async fn submit(&self, input: String) -> Result<TaskResult> {
        if input.is_empty() {
            return Err(DispatchError::Validation("task input must not be empty".to_string()));
        }

        let worker = self.select(input.len() as u64).await?;
        let rx = Worker::submit(&worker, input).await;
        rx.await
            .map_err(|_| DispatchError::WorkerTransientBusy(worker.id().0))
    }

    async fn select(&self, input_size: u64) -> Result<Arc<Worker>> {
        let policy = *self.policy.read();
        let now = self.clock.now();
        dispatcher::select_worker(
            &self.workers,
            &policy,
            &self.rr_cursor,
            self.controller.trini_active(),
            input_size,
            now,
            self.config.forecast_freshness_ms,
        )
        .await
        .ok_or_else(|| DispatchError::CapacityRejection("no workers available".to_string()))
    }

    /// The underlying worker pool, for callers that need a handle to one
    /// worker directly (diagnostics, or tests synthesizing a forecast).
    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    /// `Ping(id)`: telemetry for one worker.
    pub async fn ping(&self, id: WorkerId) -> Result<crate::worker::PingInfo> {
        let worker = self.find_worker(id)?;
        Ok(worker.ping().await)
    }

    /// `TRINIStatus()`: current loop state, policy, and per-worker telemetry.
    pub fn trini_status(&self) -> TriniStatus {
        let per_worker = self
            .workers
            .iter()
            .map(|w| WorkerStatus {
                id: w.id(),
                family: w.family(),
                gc_history_count: w.history_all().len(),
                last_forecast: w.forecast(),
                generations: w.generations(),
                gc_count: w.gc_count(),
                weight: w.weight(),
            })
            .collect();

        TriniStatus {
            active: self.controller.trini_active(),
            monitor_interval_ms: self.config.monitor_interval_ms,
            analysis_interval_ms: self.config.analysis_interval_ms,
            family_count: family::FAMILIES.len(),
            monitor_cycles: self.controller.monitor_cycles(),
            analysis_cycles: self.controller.analysis_cycles(),
            policy: *self.policy.read(),
            per_worker,
        }
    }

    /// `GCHistory(id, limit)`: a worker's recent heap snapshots.
    pub fn gc_history(&self, id: WorkerId, limit: usize) -> Result<Vec<HeapSnapshot>> {
        let worker = self.find_worker(id)?;
        Ok(worker.history_recent(limit))
    }

    /// `SetPolicy({algorithm, gcAware, magcThresholdMs, historyWindowSize})`:
    /// replace the active policy atomically (spec.md §6). Unknown algorithm
    /// name is rejected. Resets every worker's `RuntimeWeight` when the
    /// algorithm actually changes (DESIGN.md open question (c)).
    pub fn set_policy(
        &self,
        algorithm_name: &str,
        gc_aware: bool,
        magc_threshold_ms: i64,
        history_window_size: usize,
    ) -> Result<LoadBalancingPolicy> {
        let algorithm = Algorithm::parse(algorithm_name)
            .ok_or_else(|| DispatchError::Validation(format!("unknown algorithm: {algorithm_name}")))?;

        let new_policy = LoadBalancingPolicy {
            algorithm,
            gc_aware,
            magc_threshold_ms,
            history_window_size,
        };

        let mut policy = self.policy.write();
        let algorithm_changed = policy.algorithm != algorithm;
        *policy = new_policy;
        drop(policy);

        if algorithm_changed {
            for worker in self.workers.iter() {
                worker.reset_runtime_weight();
            }
        }
        info!(?new_policy, "policy installed");
        Ok(new_policy)
    }

    /// Convenience form of [`Cluster::set_policy`] that only changes the
    /// algorithm, preserving the currently active `gc_aware`/threshold/window.
    pub fn set_algorithm(&self, algorithm_name: &str) -> Result<LoadBalancingPolicy> {
        let current = *self.policy.read();
        self.set_policy(
            algorithm_name,
            current.gc_aware,
            current.magc_threshold_ms,
            current.history_window_size,
        )
    }

    /// `ToggleTRINI(active)`: enable or disable the MAPE-K loop.
    pub fn toggle_trini(&self, active: bool) {
        self.controller.set_trini_active(active);
    }

    /// `ListFamilies()`: the closed program family registry plus the default
    /// family a freshly started worker is assigned.
    pub fn list_families(&self) -> FamilyRegistry {
        FamilyRegistry {
            default_id: FamilyId::Default,
            families: &family::FAMILIES,
        }
    }

    /// Current family assignment for one worker.
    pub fn worker_family(&self, id: WorkerId) -> Result<FamilyId> {
        Ok(self.find_worker(id)?.family())
    }

    fn find_worker(&self, id: WorkerId) -> Result<&Arc<Worker>> {
        self.workers
            .iter()
            .find(|w| w.id() == id)
            .ok_or_else(|| DispatchError::Validation(format!("unknown worker id: {id}")))
    }
}
