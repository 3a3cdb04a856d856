//! Task submission results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// The worker executed the payload and produced an output.
    Completed,
    /// The worker could not admit the task (unavailable, over capacity, or a
    /// transient busy transition into MaGC).
    Rejected,
}

/// Result of a task submitted to a worker, delivered over its result channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Unique task identifier.
    pub id: Uuid,
    /// The original input.
    pub input: String,
    /// The computed output (empty when rejected).
    pub output: String,
    /// Completion status.
    pub status: TaskStatus,
    /// A human-readable reason, populated when rejected.
    pub reason: Option<String>,
    /// When this result was published.
    pub created_at: DateTime<Utc>,
}
