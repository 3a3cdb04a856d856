//! Simulated task payload.
//!
//! Explicitly out of scope as a feature (spec.md §1 calls this "a stand-in for
//! any CPU-bound work") but still a concrete dependency of [`crate::worker::Worker`],
//! which must produce some `output` for every admitted task.

use crate::clock::SharedClock;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Executes a task's simulated payload and returns its output.
#[async_trait::async_trait]
pub trait TaskPayload: Send + Sync {
    /// Run the payload against `input`, returning the computed output.
    async fn run(&self, input: &str, clock: &SharedClock) -> String;
}

/// SHA-256 of the input string, with 500-600 ms of injected uniform latency
/// on top of the hash computation itself (spec.md §4.1).
#[derive(Debug, Clone, Default)]
pub struct Sha256Payload;

#[async_trait::async_trait]
impl TaskPayload for Sha256Payload {
    async fn run(&self, input: &str, clock: &SharedClock) -> String {
        let latency_ms = rand::thread_rng().gen_range(500..=600);
        clock.sleep(Duration::from_millis(latency_ms)).await;

        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        hex::encode(hasher.finalize())
    }
}
