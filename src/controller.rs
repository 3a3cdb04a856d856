//! Background Monitor and Analyzer loops.
//!
//! Grounded directly on `AutonomicController::start`/`stop`: an `AtomicBool`
//! running flag, a `tokio::time::interval` ticker, and a continue-on-error
//! loop body that logs and keeps running rather than aborting the process.
//! The teacher's five-phase Monitor→Analyze→Plan→Execute→Knowledge cycle
//! collapses to two phases here: Plan folds into the Analyzer's
//! `adapt_policy` call, Execute folds into ordinary `Dispatch`/`Submit`.

use crate::clock::{Clock, SharedClock};
use crate::config::Config;
use crate::family::{self, FamilyId};
use crate::forecast;
use crate::policy::LoadBalancingPolicy;
use crate::worker::Worker;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Runs the Monitor and Analyzer background loops over a shared worker pool
/// and the cluster-wide policy. Both loops are no-ops while TRINI is
/// inactive; each tick body is panic-isolated so one bad cycle cannot take
/// the loop down.
pub struct Controller {
    config: Config,
    workers: Arc<Vec<Arc<Worker>>>,
    policy: Arc<RwLock<LoadBalancingPolicy>>,
    clock: SharedClock,
    active: Arc<AtomicBool>,
    monitor_cycles: Arc<AtomicU64>,
    analysis_cycles: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Build a controller over an already-started worker pool.
    pub fn new(
        config: Config,
        workers: Arc<Vec<Arc<Worker>>>,
        policy: Arc<RwLock<LoadBalancingPolicy>>,
        clock: SharedClock,
    ) -> Self {
        let active = Arc::new(AtomicBool::new(config.trini_active));
        Self {
            config,
            workers,
            policy,
            clock,
            active,
            monitor_cycles: Arc::new(AtomicU64::new(0)),
            analysis_cycles: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Whether TRINI (the MAPE-K loop) is currently active.
    pub fn trini_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Toggle TRINI on or off; does not stop the background tasks, only the
    /// effect of their ticks (spec.md §6's `ToggleTRINI`).
    pub fn set_trini_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
        info!(active, "TRINI toggled");
    }

    /// Number of Monitor ticks executed so far.
    pub fn monitor_cycles(&self) -> u64 {
        self.monitor_cycles.load(Ordering::Relaxed)
    }

    /// Number of Analyzer ticks executed so far.
    pub fn analysis_cycles(&self) -> u64 {
        self.analysis_cycles.load(Ordering::Relaxed)
    }

    /// Spawn the Monitor and Analyzer loops. Idempotent: a second call while
    /// already running is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            monitor_interval_ms = self.config.monitor_interval_ms,
            analysis_interval_ms = self.config.analysis_interval_ms,
            "starting TRINI background loops"
        );

        let monitor = Arc::clone(self);
        let monitor_handle = tokio::spawn(async move { monitor.run_monitor_loop().await });

        let analyzer = Arc::clone(self);
        let analyzer_handle = tokio::spawn(async move { analyzer.run_analysis_loop().await });

        let mut handles = self.handles.lock().unwrap();
        handles.push(monitor_handle);
        handles.push(analyzer_handle);
    }

    /// Stop both background loops.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.handles.lock().unwrap().drain(..) {
            handle.abort();
        }
        info!("TRINI background loops stopped");
    }

    async fn run_monitor_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.monitor_interval());
        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if !self.active.load(Ordering::SeqCst) {
                continue;
            }
            if let Err(panicked) =
                std::panic::catch_unwind(AssertUnwindSafe(|| self.monitor_tick()))
            {
                error!(?panicked, "monitor tick panicked, continuing");
            }
        }
    }

    #[instrument(skip(self))]
    fn monitor_tick(&self) {
        for worker in self.workers.iter() {
            worker.push_snapshot();
        }
        let cycle = self.monitor_cycles.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(cycle, workers = self.workers.len(), "monitor tick complete");
    }

    async fn run_analysis_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.analysis_interval());
        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if !self.active.load(Ordering::SeqCst) {
                continue;
            }
            if let Err(panicked) =
                std::panic::catch_unwind(AssertUnwindSafe(|| self.analysis_tick()))
            {
                error!(?panicked, "analysis tick panicked, continuing");
            }
        }
    }

    #[instrument(skip(self))]
    fn analysis_tick(&self) {
        let mut assignments: Vec<FamilyId> = Vec::with_capacity(self.workers.len());

        for worker in self.workers.iter() {
            let history = worker.history_all();
            let new_family = family::classify(&history, worker.family());
            worker.set_family(new_family);
            assignments.push(new_family);

            let fam = family::family(new_family);
            let window = worker.forecast_window(fam.forecast_window);
            let now = self.clock.now();
            match forecast::forecast(&window, now) {
                Some(f) => worker.set_forecast(Some(f)),
                None => {
                    worker.set_forecast(None);
                    warn!(worker = ?worker.id(), "forecast unavailable this tick");
                }
            }
        }

        if let Some(new_policy) = family::adapt_policy(&assignments) {
            let mut policy = self.policy.write();
            if *policy != new_policy {
                info!(?new_policy, "policy adapted by plurality family");
                *policy = new_policy;
            }
        }

        let cycle = self.analysis_cycles.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(cycle, "analysis tick complete");
    }
}
