//! # Reactive worker autoscaling
//!
//! Scales the platform process type serving a job queue from queue depth,
//! without a scheduler of its own: every check rides on a job lifecycle
//! event.
//!
//! ## Decision
//!
//! ```text
//! desired = clamp(pending, min_workers, max_workers or unbounded)
//!
//! desired == current            -> no remote call
//! desired >  current            -> grow
//! desired <  current and
//!   (pending == 0 or idle)      -> shrink
//! otherwise                     -> skip, re-checked on the next event
//! ```
//!
//! ## Coordination
//!
//! ```text
//! ┌──────────────┐ event ┌──────────────────────┐  count  ┌──────────────┐
//! │  Job queue   │──────▶│ AutoscaleController  │────────▶│   Platform   │
//! │ (any host)   │◀──────│                      │         │     API      │
//! └──────────────┘ retire└──────────┬───────────┘         └──────────────┘
//!                                   │ marker / last scaled
//!                                   ▼
//!                          ┌──────────────────┐
//!                          │   State store    │
//!                          └──────────────────┘
//! ```
//!
//! The in-progress marker is advisory and self-expiring
//! ([`DEFAULT_LOCK_STALE_SECS`]), not a fenced lock.

pub mod controller;
pub mod formula;
pub mod lock;

pub use controller::{AutoscaleController, Outcome, SkipReason};
pub use formula::{cold_start_workers, desired_workers};
pub use lock::{cooldown_elapsed, is_stale, ScaleState, ScalingDecisionState};

/// Default age after which an in-progress marker is ignored
pub const DEFAULT_LOCK_STALE_SECS: u64 = 30;

/// Default client-side timeout for platform calls
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
