//! Reactive autoscaling for job-queue workers.
//!
//! Job lifecycle events (enqueue, start, completion, failure) trigger a
//! scaling check that sizes a platform process type to the queue depth,
//! subject to a cooldown and an advisory cross-host marker.
//!
//! ```ignore
//! let config = AutoscaleConfig::from_env()?.with_max_workers(10);
//! let controller = AutoscaleController::with_heroku(config, queue, store)?;
//! let hooks = HookRegistry::new().with_hook(Arc::new(controller));
//!
//! hooks.dispatch(JobEvent::Enqueued).await;
//! ```

pub mod autoscale;
pub mod config;
pub mod error;
pub mod hooks;
pub mod platform;
pub mod queue;
pub mod store;
pub mod telemetry;

pub use autoscale::{AutoscaleController, Outcome, ScalingDecisionState, SkipReason};
pub use config::{AutoscaleConfig, ConfigError};
pub use error::AutoscaleError;
pub use hooks::{HookRegistry, JobEvent, LifecycleHook};
pub use platform::{HerokuClient, PlatformClient, ProcessInfo};
pub use queue::{JobQueue, MemoryQueue, WorkerRegistration};
pub use store::{MemoryStateStore, StateStore};
