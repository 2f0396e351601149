//! Job-queue collaborator
//!
//! The queue owns pending jobs and its own bookkeeping of live workers. The
//! controller only reads counts and, when the platform reports no processes,
//! retires registrations that outlived their process.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ALL_QUEUES;
use crate::error::AutoscaleError;

pub use memory::MemoryQueue;

/// Whether a queue selector covers the named queue
pub fn queue_matches(selector: &str, queue: &str) -> bool {
    selector == ALL_QUEUES || selector == queue
}

/// A worker process as recorded by the queue system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub host: String,
    pub pid: u32,
    /// Platform process type the worker runs as
    pub process: String,
    /// Queues the worker pulls from
    pub queues: Vec<String>,
    /// Currently executing a job
    #[serde(default)]
    pub busy: bool,
}

impl WorkerRegistration {
    pub fn new(
        host: impl Into<String>,
        pid: u32,
        process: impl Into<String>,
        queues: Vec<String>,
    ) -> Self {
        Self {
            host: host.into(),
            pid,
            process: process.into(),
            queues,
            busy: false,
        }
    }

    /// Registration describing the calling process
    pub fn current(process: impl Into<String>, queues: Vec<String>) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());
        Self::new(host, std::process::id(), process, queues)
    }

    /// Stable identity of the registration, independent of its busy flag
    pub fn id(&self) -> String {
        format!("{}/{}", self.host, self.pid)
    }

    pub fn serves(&self, queue: &str) -> bool {
        self.queues.iter().any(|q| queue_matches(q, queue))
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Jobs waiting in `queue` (`*` for every queue)
    async fn pending_count(&self, queue: &str) -> Result<u64, AutoscaleError>;

    /// Jobs from `queue` (`*` for every queue) currently being executed
    async fn working_count(&self, queue: &str) -> Result<u64, AutoscaleError>;

    /// Registrations recorded for a platform process type
    async fn workers(&self, process: &str) -> Result<Vec<WorkerRegistration>, AutoscaleError>;

    /// Forcibly drop a registration, releasing any job it claimed
    async fn retire_worker(&self, worker: &WorkerRegistration) -> Result<(), AutoscaleError>;
}
