//! Autoscale controller - decides when and how far to scale
//!
//! Every evaluation runs the same cycle:
//!
//! ```text
//! Idle -> marker acquired -> observe -> decide -> {no-op | grow | shrink} -> marker released
//! ```
//!
//! There is no background loop. Evaluations are triggered by job lifecycle
//! events and may run concurrently on many hosts; the advisory marker in the
//! shared store keeps them from issuing overlapping scale commands. A holder
//! that waits on the platform (recycling through zero) renews the marker
//! between polls and abandons the cycle once another evaluation owns it.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::formula::{cold_start_workers, desired_workers};
use super::lock::{cooldown_elapsed, ScaleState, ScalingDecisionState};
use crate::config::{AutoscaleConfig, ALL_QUEUES};
use crate::error::AutoscaleError;
use crate::platform::{HerokuClient, PlatformClient};
use crate::queue::JobQueue;
use crate::store::{ScopedKeys, StateStore};

/// Why an evaluation ended without touching the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    LockHeld,
    CooldownActive,
    /// Shrinking now could stop workers that are mid-job
    UnsafeToShrink,
}

/// Result of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    /// Platform already runs the desired count
    Unchanged { workers: u32 },
    Scaled { from: u32, to: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Evaluate,
    /// Provision capacity for queued work when nothing is running
    ColdStart,
}

/// Shedding capacity is safe once nothing is queued or nothing is running
fn shrink_is_safe(pending: u64, working: u64) -> bool {
    pending == 0 || working == 0
}

/// Distinct queue selectors to count; `*` subsumes every named queue
fn queue_selectors(queues: &[String]) -> Vec<&str> {
    if queues.iter().any(|q| q == ALL_QUEUES) {
        return vec![ALL_QUEUES];
    }
    let mut selectors: Vec<&str> = Vec::with_capacity(queues.len());
    for queue in queues {
        if !selectors.contains(&queue.as_str()) {
            selectors.push(queue);
        }
    }
    selectors
}

/// Marker ownership held by a running evaluation
struct Lease<'a> {
    state: &'a ScaleState,
    owner: Uuid,
}

/// Refresh the marker if the caller holds one; false once ownership is lost
async fn still_held(lease: Option<&Lease<'_>>) -> Result<bool, AutoscaleError> {
    match lease {
        Some(lease) => lease.state.renew(lease.owner, Utc::now()).await,
        None => Ok(true),
    }
}

/// Orchestrates queue observation, the worker formula and the platform
#[derive(Clone)]
pub struct AutoscaleController {
    config: Arc<RwLock<AutoscaleConfig>>,
    platform: Arc<dyn PlatformClient>,
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn StateStore>,
}

impl AutoscaleController {
    /// Create a controller over explicit collaborators
    pub fn new(
        config: AutoscaleConfig,
        platform: Arc<dyn PlatformClient>,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        config.validate();
        Self {
            config: Arc::new(RwLock::new(config)),
            platform,
            queue,
            store,
        }
    }

    /// Controller backed by the Platform API client built from `config`.
    ///
    /// Fails when no API credential is configured.
    pub fn with_heroku(
        config: AutoscaleConfig,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, AutoscaleError> {
        let platform = HerokuClient::from_config(&config)?;
        Ok(Self::new(config, Arc::new(platform), queue, store))
    }

    /// Current policy snapshot
    pub async fn config(&self) -> AutoscaleConfig {
        self.config.read().await.clone()
    }

    /// Adjust the policy; later evaluations see the change
    pub async fn update_config<F>(&self, f: F)
    where
        F: FnOnce(&mut AutoscaleConfig),
    {
        let mut config = self.config.write().await;
        f(&mut config);
        config.validate();
    }

    fn scale_state(&self, config: &AutoscaleConfig) -> ScaleState {
        ScaleState::new(self.store.clone(), ScopedKeys::new(&config.process_name))
    }

    /// Persisted marker and cooldown state for the configured process
    pub async fn decision_state(&self) -> Result<ScalingDecisionState, AutoscaleError> {
        let config = self.config().await;
        self.scale_state(&config).snapshot().await
    }

    // =========================================================================
    // Lifecycle hooks
    // =========================================================================

    /// A job was accepted into the queue.
    ///
    /// Evaluates like any other trigger. When only the cooldown blocks and
    /// queued work has no running process at all, provisions a first batch
    /// of workers anyway.
    pub async fn on_enqueue(&self) -> Result<Outcome, AutoscaleError> {
        let config = self.config().await;
        let outcome = self.run(&config, Mode::Evaluate).await?;
        if outcome == Outcome::Skipped(SkipReason::CooldownActive) {
            return self.run(&config, Mode::ColdStart).await;
        }
        Ok(outcome)
    }

    /// A worker is about to perform a job
    pub async fn on_job_started(&self) -> Result<Outcome, AutoscaleError> {
        self.evaluate_and_scale().await
    }

    /// A job finished successfully
    pub async fn on_job_completed(&self) -> Result<Outcome, AutoscaleError> {
        self.evaluate_and_scale().await
    }

    /// A job raised an error
    pub async fn on_job_failed(&self) -> Result<Outcome, AutoscaleError> {
        self.evaluate_and_scale().await
    }

    /// Run one full evaluation cycle against a snapshot of the policy
    pub async fn evaluate_and_scale(&self) -> Result<Outcome, AutoscaleError> {
        let config = self.config().await;
        self.run(&config, Mode::Evaluate).await
    }

    // =========================================================================
    // Evaluation cycle
    // =========================================================================

    async fn run(&self, config: &AutoscaleConfig, mode: Mode) -> Result<Outcome, AutoscaleError> {
        let process = config.process_name.as_str();

        if !config.scaling_enabled {
            debug!(process, "scaling disabled");
            return Ok(Outcome::Skipped(SkipReason::Disabled));
        }

        let state = self.scale_state(config);
        let now = Utc::now();

        if state.in_progress(config.lock_stale_after(), now).await? {
            debug!(process, "scaling already in progress");
            return Ok(Outcome::Skipped(SkipReason::LockHeld));
        }

        if mode == Mode::Evaluate {
            let last = state.last_scaled_at().await?;
            if !cooldown_elapsed(last, config.cooldown(), now) {
                debug!(process, cooldown_secs = config.cooldown_secs, "cooldown active");
                return Ok(Outcome::Skipped(SkipReason::CooldownActive));
            }
        }

        let owner = state.acquire(now).await?;
        let lease = Lease {
            state: &state,
            owner,
        };
        let result = match mode {
            Mode::Evaluate => self.observe_and_apply(config, &lease).await,
            Mode::ColdStart => self.cold_start(config, &state).await,
        };
        let released = state.release(owner).await;

        match (&result, released) {
            (Err(e), Ok(())) => {
                warn!(process, error = %e, "scaling evaluation failed");
            }
            (Err(e), Err(release_err)) => {
                warn!(process, error = %e, "scaling evaluation failed");
                warn!(
                    process,
                    error = %release_err,
                    "failed to release scaling marker; it expires after the staleness bound"
                );
            }
            (Ok(_), Err(e)) => {
                warn!(process, error = %e, "failed to release scaling marker");
                return Err(e);
            }
            (Ok(_), Ok(())) => {}
        }
        result
    }

    async fn observe_and_apply(
        &self,
        config: &AutoscaleConfig,
        lease: &Lease<'_>,
    ) -> Result<Outcome, AutoscaleError> {
        let app = app_name(config)?;
        let process = config.process_name.as_str();

        let current = self.platform.process_count(&app, process).await?;
        if current == 0 {
            self.clear_stale_workers(process).await?;
        }

        let (pending, working) = self.queue_counts(config).await?;
        let desired = desired_workers(config, i64::try_from(pending).unwrap_or(i64::MAX));

        debug!(process, pending, working, current, desired, "observed");

        if desired == current {
            return Ok(Outcome::Unchanged { workers: current });
        }
        if desired < current && !shrink_is_safe(pending, working) {
            debug!(
                process,
                current, desired, working, "not shrinking while workers are busy"
            );
            return Ok(Outcome::Skipped(SkipReason::UnsafeToShrink));
        }

        if !self
            .scale_to(config, &app, current, desired, working, Some(lease))
            .await?
        {
            warn!(
                process,
                to = desired,
                "lost scaling marker mid-cycle; leaving the rest to its holder"
            );
            return Ok(Outcome::Skipped(SkipReason::LockHeld));
        }
        lease.state.record_scaled(Utc::now()).await?;

        info!(process, from = current, to = desired, pending, "scaled workers");
        Ok(Outcome::Scaled {
            from: current,
            to: desired,
        })
    }

    async fn cold_start(
        &self,
        config: &AutoscaleConfig,
        state: &ScaleState,
    ) -> Result<Outcome, AutoscaleError> {
        let skipped = Outcome::Skipped(SkipReason::CooldownActive);
        let process = config.process_name.as_str();

        let (pending, _) = self.queue_counts(config).await?;
        if pending == 0 {
            return Ok(skipped);
        }

        let app = app_name(config)?;
        if self.platform.process_count(&app, process).await? > 0 {
            return Ok(skipped);
        }

        self.clear_stale_workers(process).await?;
        let target = cold_start_workers(config);
        self.platform.set_process_count(&app, process, target).await?;
        state.record_scaled(Utc::now()).await?;

        info!(process, to = target, "provisioned workers for queued jobs during cooldown");
        Ok(Outcome::Scaled {
            from: 0,
            to: target,
        })
    }

    /// Pending and working totals across the configured queues
    async fn queue_counts(&self, config: &AutoscaleConfig) -> Result<(u64, u64), AutoscaleError> {
        let counts = futures::future::try_join_all(queue_selectors(&config.queues).into_iter().map(
            |queue| {
                futures::future::try_join(
                    self.queue.pending_count(queue),
                    self.queue.working_count(queue),
                )
            },
        ))
        .await?;
        Ok(counts
            .into_iter()
            .fold((0u64, 0u64), |(pending, working), (p, w)| {
                (pending.saturating_add(p), working.saturating_add(w))
            }))
    }

    // =========================================================================
    // Scaling primitives
    // =========================================================================

    /// Set the platform process count directly.
    ///
    /// Bypasses the gate and the marker; callers wanting coordination go
    /// through [`Self::evaluate_and_scale`].
    pub async fn set_workers(&self, count: u32) -> Result<(), AutoscaleError> {
        let config = self.config().await;
        let app = app_name(&config)?;
        let current = self
            .platform
            .process_count(&app, &config.process_name)
            .await?;
        if current == count {
            return Ok(());
        }
        let (_, working) = self.queue_counts(&config).await?;
        self.scale_to(&config, &app, current, count, working, None)
            .await
            .map(|_| ())
    }

    /// Issue the scale command. Returns false when the marker was lost
    /// before the target count could be applied.
    async fn scale_to(
        &self,
        config: &AutoscaleConfig,
        app: &str,
        current: u32,
        count: u32,
        working: u64,
        lease: Option<&Lease<'_>>,
    ) -> Result<bool, AutoscaleError> {
        let process = config.process_name.as_str();
        if config.recycle_on_shrink && count > 0 && count < current && working > 0 {
            return self.recycle(config, app, count, lease).await;
        }
        self.platform.set_process_count(app, process, count).await?;
        Ok(true)
    }

    /// Scale through zero so no shrunk-away process keeps a live job
    async fn recycle(
        &self,
        config: &AutoscaleConfig,
        app: &str,
        count: u32,
        lease: Option<&Lease<'_>>,
    ) -> Result<bool, AutoscaleError> {
        let process = config.process_name.as_str();
        info!(process, to = count, "recycling workers through zero");

        self.platform.set_process_count(app, process, 0).await?;

        let mut drained = false;
        for attempt in 1..=config.recycle_poll_attempts {
            if !still_held(lease).await? {
                return Ok(false);
            }
            match self.platform.process_count(app, process).await {
                Ok(0) => {
                    drained = true;
                    break;
                }
                Ok(live) => debug!(process, attempt, live, "waiting for workers to stop"),
                Err(e) => warn!(process, attempt, error = %e, "process poll failed"),
            }
            if attempt < config.recycle_poll_attempts {
                tokio::time::sleep(config.recycle_poll_interval()).await;
            }
        }
        if !drained {
            warn!(
                process,
                attempts = config.recycle_poll_attempts,
                "workers still running after recycle poll; continuing"
            );
        }

        if !still_held(lease).await? {
            return Ok(false);
        }
        self.clear_stale_workers(process).await?;
        self.platform.set_process_count(app, process, count).await?;
        Ok(true)
    }

    /// Retire queue registrations left behind by processes that no longer run
    pub async fn clear_stale_workers(&self, process: &str) -> Result<usize, AutoscaleError> {
        let workers = self.queue.workers(process).await?;
        for worker in &workers {
            self.queue.retire_worker(worker).await?;
        }
        if !workers.is_empty() {
            info!(process, retired = workers.len(), "retired orphaned worker registrations");
        }
        Ok(workers.len())
    }
}

fn app_name(config: &AutoscaleConfig) -> Result<String, AutoscaleError> {
    config
        .resolved_app_name()
        .ok_or(AutoscaleError::ConfigurationMissing("platform application name"))
}
