use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use super::{queue_matches, JobQueue, WorkerRegistration};
use crate::error::AutoscaleError;

/// In-process queue with its own worker registry.
///
/// Jobs are opaque JSON payloads. A worker that claims a job is marked busy
/// until it finishes or is retired; retiring a busy worker puts its job back
/// at the head of its queue.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    queues: Arc<DashMap<String, VecDeque<Value>>>,
    workers: Arc<DashMap<String, WorkerRegistration>>,
    claimed: Arc<DashMap<String, (String, Value)>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to the tail of a queue
    pub fn push(&self, queue: &str, job: Value) {
        self.queues
            .entry(queue.to_string())
            .or_default()
            .push_back(job);
    }

    /// Record a live worker, replacing any registration with the same id
    pub fn register_worker(&self, worker: WorkerRegistration) {
        self.workers.insert(worker.id(), worker);
    }

    pub fn worker(&self, id: &str) -> Option<WorkerRegistration> {
        self.workers.get(id).map(|r| r.clone())
    }

    pub fn registered_count(&self) -> usize {
        self.workers.len()
    }

    /// Claim the next job from the first non-empty queue the worker serves
    pub fn claim(&self, worker_id: &str) -> Option<Value> {
        let mut worker = self.workers.get_mut(worker_id)?;
        if worker.busy {
            return None;
        }

        for mut entry in self.queues.iter_mut() {
            if !worker.serves(entry.key()) {
                continue;
            }
            if let Some(job) = entry.value_mut().pop_front() {
                worker.busy = true;
                self.claimed
                    .insert(worker_id.to_string(), (entry.key().clone(), job.clone()));
                return Some(job);
            }
        }
        None
    }

    /// Mark the worker's current job as done
    pub fn finish(&self, worker_id: &str) -> Option<Value> {
        let (_, (_, job)) = self.claimed.remove(worker_id)?;
        if let Some(mut worker) = self.workers.get_mut(worker_id) {
            worker.busy = false;
        }
        Some(job)
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn pending_count(&self, queue: &str) -> Result<u64, AutoscaleError> {
        Ok(self
            .queues
            .iter()
            .filter(|q| queue_matches(queue, q.key()))
            .map(|q| q.len() as u64)
            .sum())
    }

    async fn working_count(&self, queue: &str) -> Result<u64, AutoscaleError> {
        Ok(self
            .claimed
            .iter()
            .filter(|c| queue_matches(queue, &c.value().0))
            .count() as u64)
    }

    async fn workers(&self, process: &str) -> Result<Vec<WorkerRegistration>, AutoscaleError> {
        Ok(self
            .workers
            .iter()
            .filter(|w| w.process == process)
            .map(|w| w.clone())
            .collect())
    }

    async fn retire_worker(&self, worker: &WorkerRegistration) -> Result<(), AutoscaleError> {
        let id = worker.id();
        if let Some((_, (queue, job))) = self.claimed.remove(&id) {
            self.queues.entry(queue).or_default().push_front(job);
        }
        self.workers.remove(&id);
        debug!(worker = %id, process = %worker.process, "retired worker registration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn worker(pid: u32, queue: &str) -> WorkerRegistration {
        WorkerRegistration::new("host", pid, "worker", vec![queue.to_string()])
    }

    #[tokio::test]
    async fn test_pending_and_working_counts() {
        let queue = MemoryQueue::new();
        queue.push("default", json!({"job": 1}));
        queue.push("default", json!({"job": 2}));
        queue.push("mail", json!({"job": 3}));
        assert_eq!(queue.pending_count("*").await.unwrap(), 3);

        let w = worker(1, "default");
        queue.register_worker(w.clone());
        assert_eq!(queue.claim(&w.id()), Some(json!({"job": 1})));
        assert_eq!(queue.pending_count("*").await.unwrap(), 2);
        assert_eq!(queue.working_count("*").await.unwrap(), 1);
        assert!(queue.worker(&w.id()).unwrap().busy);

        queue.finish(&w.id());
        assert_eq!(queue.working_count("*").await.unwrap(), 0);
        assert!(!queue.worker(&w.id()).unwrap().busy);
    }

    #[tokio::test]
    async fn test_claim_respects_served_queues() {
        let queue = MemoryQueue::new();
        queue.push("mail", json!("m"));
        let w = worker(1, "default");
        queue.register_worker(w.clone());

        assert_eq!(queue.claim(&w.id()), None);
        assert_eq!(queue.claim("unknown/0"), None);
    }

    #[tokio::test]
    async fn test_retire_requeues_claimed_job() {
        let queue = MemoryQueue::new();
        queue.push("default", json!("a"));
        queue.push("default", json!("b"));
        let w = worker(7, "default");
        queue.register_worker(w.clone());
        queue.claim(&w.id());

        queue.retire_worker(&w).await.unwrap();

        assert_eq!(queue.registered_count(), 0);
        assert_eq!(queue.working_count("*").await.unwrap(), 0);
        assert_eq!(queue.pending_count("default").await.unwrap(), 2);

        let next = worker(8, "default");
        queue.register_worker(next.clone());
        assert_eq!(queue.claim(&next.id()), Some(json!("a")));
    }

    #[tokio::test]
    async fn test_counts_per_queue() {
        let queue = MemoryQueue::new();
        queue.push("default", json!(1));
        queue.push("default", json!(2));
        queue.push("mail", json!(3));
        let w = worker(1, "mail");
        queue.register_worker(w.clone());
        queue.claim(&w.id());

        assert_eq!(queue.pending_count("default").await.unwrap(), 2);
        assert_eq!(queue.pending_count("mail").await.unwrap(), 0);
        assert_eq!(queue.pending_count("reports").await.unwrap(), 0);
        assert_eq!(queue.working_count("mail").await.unwrap(), 1);
        assert_eq!(queue.working_count("default").await.unwrap(), 0);
        assert_eq!(queue.working_count("*").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_workers_filtered_by_process() {
        let queue = MemoryQueue::new();
        queue.register_worker(worker(1, "default"));
        queue.register_worker(WorkerRegistration::new("host", 2, "mailer", vec!["mail".into()]));

        let workers = queue.workers("worker").await.unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].pid, 1);
        assert!(queue.workers("web").await.unwrap().is_empty());
    }
}
