//! Bus configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Per-subscriber broadcast timeout; `None` waits for every reply.
    pub broadcast_timeout_ms: Option<u64>,
    /// Async worker threads (timers, broadcast waits).
    pub worker_threads: usize,
    /// Upper bound on threads running handlers.
    pub max_handler_threads: usize,
}

impl BusConfig {
    pub fn broadcast_timeout(&self) -> Option<Duration> {
        self.broadcast_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            broadcast_timeout_ms: Some(30_000),
            worker_threads: 2,
            max_handler_threads: 256,
        }
    }
}
