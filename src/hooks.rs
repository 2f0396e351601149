//! Job lifecycle hook registration
//!
//! The queue host owns a `HookRegistry` and reports lifecycle events to it.
//! Registered hooks (normally an [`AutoscaleController`]) react to them.
//! Hook failures are logged here and never reach job processing.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::autoscale::{AutoscaleController, Outcome};
use crate::error::AutoscaleError;

/// Job lifecycle events that can trigger a scaling check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobEvent {
    Enqueued,
    Started,
    Completed,
    Failed,
}

impl std::fmt::Display for JobEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobEvent::Enqueued => "enqueued",
            JobEvent::Started => "started",
            JobEvent::Completed => "completed",
            JobEvent::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait LifecycleHook: Send + Sync {
    async fn on_event(&self, event: JobEvent) -> Result<Outcome, AutoscaleError>;
}

#[async_trait]
impl LifecycleHook for AutoscaleController {
    async fn on_event(&self, event: JobEvent) -> Result<Outcome, AutoscaleError> {
        match event {
            JobEvent::Enqueued => self.on_enqueue().await,
            JobEvent::Started => self.on_job_started().await,
            JobEvent::Completed => self.on_job_completed().await,
            JobEvent::Failed => self.on_job_failed().await,
        }
    }
}

/// Observers notified of job lifecycle events
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
    }

    pub fn with_hook(mut self, hook: Arc<dyn LifecycleHook>) -> Self {
        self.register(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Notify every hook in registration order and wait for them
    pub async fn dispatch(&self, event: JobEvent) -> Vec<Outcome> {
        let mut outcomes = Vec::with_capacity(self.hooks.len());
        for hook in &self.hooks {
            match hook.on_event(event).await {
                Ok(outcome) => {
                    debug!(%event, ?outcome, "lifecycle hook finished");
                    outcomes.push(outcome);
                }
                Err(e) => {
                    warn!(%event, error = %e, "lifecycle hook failed");
                }
            }
        }
        outcomes
    }

    /// Notify hooks on a background task; the caller does not wait
    pub fn dispatch_detached(&self, event: JobEvent) -> tokio::task::JoinHandle<Vec<Outcome>> {
        let registry = self.clone();
        tokio::spawn(async move { registry.dispatch(event).await })
    }
}
