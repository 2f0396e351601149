use thiserror::Error;

/// Errors surfaced by a scaling evaluation.
///
/// Normal gating conditions (scaling disabled, marker held, cooldown) are not
/// errors; they come back as [`crate::autoscale::Outcome::Skipped`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutoscaleError {
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(&'static str),

    #[error("Platform API unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Platform API rejected request: {status} - {message}")]
    RemoteRejected { status: u16, message: String },

    #[error("State store error: {0}")]
    Store(String),

    #[error("Queue error: {0}")]
    Queue(String),
}

impl AutoscaleError {
    /// Whether a later trigger has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, AutoscaleError::RemoteUnavailable(_) | AutoscaleError::Store(_))
    }
}
