//! TRINI: a GC-aware task dispatcher.
//!
//! A self-adaptive load-balancing engine for a pool of simulated generational
//! heaps. Each worker tracks its own young/old generation usage and publishes
//! a bounded telemetry history; a background Monitor loop samples that
//! history on a fixed interval while a background Analyzer loop reclassifies
//! each worker into a program family and forecasts its next Major GC pause
//! via two-stage linear regression (MaGA). The cluster-wide dispatch policy
//! adapts to whichever family holds the plurality, and every GC-aware
//! selection algorithm (round robin, random, weighted round robin, weighted
//! random) falls back to ignoring forecasts entirely when every worker
//! predicts an imminent pause.
//!
//! ## Example
//!
//! ```rust,no_run
//! use trini::{Cluster, Config};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cluster = Cluster::start(Config::default(), 4);
//! let result = cluster.submit("some task input".to_string()).await?;
//! println!("{:?}", result.status);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod family;
pub mod forecast;
pub mod history;
pub mod payload;
pub mod policy;
pub mod task;
pub mod worker;

pub use cluster::{Cluster, FamilyRegistry, TriniStatus, WorkerStatus};
pub use config::Config;
pub use error::{DispatchError, Result};
pub use family::{FamilyId, ProgramFamily, FAMILIES};
pub use forecast::MagcForecast;
pub use history::HeapSnapshot;
pub use policy::{Algorithm, LoadBalancingPolicy};
pub use task::{TaskResult, TaskStatus};
pub use worker::{PingInfo, WorkerId};

/// Crate version, aligned with `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
