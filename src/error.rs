//! Error types for the dispatch engine

use thiserror::Error;

/// Result type for dispatch engine operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors that can occur in the dispatch engine.
///
/// Errors never cross component boundaries as exceptional control flow: they
/// are represented as values on returned structures or on the per-task result
/// channel.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Malformed external input (empty task, unknown algorithm, bad worker id).
    #[error("validation error: {0}")]
    Validation(String),

    /// No worker can admit the task right now (all unavailable, memory-full,
    /// or in MaGC even after the escape path).
    #[error("capacity rejection: {0}")]
    CapacityRejection(String),

    /// The selected worker transitioned to `Collecting` between selection and
    /// admission.
    #[error("worker {0} became busy with MaGC before admission")]
    WorkerTransientBusy(u32),

    /// Insufficient samples or a singular regression. Internal: disables the
    /// GC guard for that worker until a future tick succeeds.
    #[error("forecast unavailable for worker {0}")]
    ForecastUnavailable(u32),

    /// No dominant GC-aware family found during policy adaptation.
    #[error("policy adaptation no-op: {0}")]
    PolicyAdaptationNoOp(String),

    /// Configuration could not be loaded or was internally inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for errors surfaced from below that don't need their own variant.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
