//! Advisory in-progress marker and cooldown bookkeeping
//!
//! Both values live in the shared [`StateStore`] so every host triggering
//! evaluations sees them. The marker carries an owner token; a marker older
//! than the staleness bound is discarded so a crashed holder cannot wedge
//! scaling. Long-running holders renew the marker to keep it fresh.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AutoscaleError;
use crate::store::{ScopedKeys, StateStore};

/// Persisted scaling state for one target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingDecisionState {
    pub scaling_in_progress_since: Option<DateTime<Utc>>,
    pub last_scaled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Marker {
    since: DateTime<Utc>,
    owner: Uuid,
}

// ============================================================================
// SBIO: Pure functions (no I/O)
// ============================================================================

fn parse_marker(raw: &str) -> Option<Marker> {
    serde_json::from_str(raw).ok().or_else(|| {
        parse_timestamp(raw).map(|since| Marker {
            since,
            owner: Uuid::nil(),
        })
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Whether a marker set at `since` is old enough to ignore.
///
/// A marker dated further in the future than the bound is also stale, so a
/// host with a fast clock cannot block evaluations indefinitely.
pub fn is_stale(since: DateTime<Utc>, stale_after: Duration, now: DateTime<Utc>) -> bool {
    let skew = if since > now { since - now } else { now - since };
    skew.to_std().map(|skew| skew > stale_after).unwrap_or(false)
}

/// Whether enough time has passed since the last scaling action.
///
/// A timestamp in the future (clock skew between hosts) counts as elapsed.
pub fn cooldown_elapsed(
    last_scaled: Option<DateTime<Utc>>,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> bool {
    let Some(last) = last_scaled else {
        return true;
    };
    match (now - last).to_std() {
        Ok(waited) => waited >= cooldown,
        Err(_) => true,
    }
}

// ============================================================================
// Store-backed state for one target
// ============================================================================

/// Marker and cooldown state for one process type
#[derive(Clone)]
pub struct ScaleState {
    store: Arc<dyn StateStore>,
    keys: ScopedKeys,
}

impl ScaleState {
    /// Create state over `store` under the given key scope
    pub fn new(store: Arc<dyn StateStore>, keys: ScopedKeys) -> Self {
        Self { store, keys }
    }

    async fn marker(&self) -> Result<Option<Marker>, AutoscaleError> {
        let raw = self.store.get(&self.keys.scaling()).await?;
        Ok(raw.as_deref().and_then(parse_marker))
    }

    async fn write_marker(&self, marker: &Marker) -> Result<(), AutoscaleError> {
        let value =
            serde_json::to_string(marker).map_err(|e| AutoscaleError::Store(e.to_string()))?;
        self.store.set(&self.keys.scaling(), &value).await
    }

    /// Whether another evaluation holds a fresh marker.
    ///
    /// Stale or unreadable markers are removed.
    pub async fn in_progress(
        &self,
        stale_after: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, AutoscaleError> {
        let key = self.keys.scaling();
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(false);
        };

        match parse_marker(&raw) {
            Some(marker) if !is_stale(marker.since, stale_after, now) => Ok(true),
            Some(marker) => {
                warn!(
                    target_scope = %self.keys.scope(),
                    since = %marker.since,
                    "discarding stale scaling marker"
                );
                self.store.delete(&key).await?;
                Ok(false)
            }
            None => {
                warn!(target_scope = %self.keys.scope(), "discarding unreadable scaling marker");
                self.store.delete(&key).await?;
                Ok(false)
            }
        }
    }

    /// Write a fresh marker and return its owner token
    pub async fn acquire(&self, now: DateTime<Utc>) -> Result<Uuid, AutoscaleError> {
        let marker = Marker {
            since: now,
            owner: Uuid::new_v4(),
        };
        self.write_marker(&marker).await?;
        debug!(target_scope = %self.keys.scope(), owner = %marker.owner, "scaling marker set");
        Ok(marker.owner)
    }

    /// Refresh our marker's timestamp.
    ///
    /// Returns false without writing when the marker is gone or another
    /// evaluation now owns it.
    pub async fn renew(&self, owner: Uuid, now: DateTime<Utc>) -> Result<bool, AutoscaleError> {
        match self.marker().await? {
            Some(marker) if marker.owner == owner => {
                self.write_marker(&Marker { since: now, owner }).await?;
                Ok(true)
            }
            Some(marker) => {
                debug!(
                    target_scope = %self.keys.scope(),
                    holder = %marker.owner,
                    "scaling marker taken over by another evaluation"
                );
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Remove the marker unless another evaluation has since replaced it
    pub async fn release(&self, owner: Uuid) -> Result<(), AutoscaleError> {
        match self.marker().await? {
            Some(marker) if marker.owner != owner => {
                debug!(
                    target_scope = %self.keys.scope(),
                    holder = %marker.owner,
                    "scaling marker now held by another evaluation"
                );
                Ok(())
            }
            _ => self.store.delete(&self.keys.scaling()).await,
        }
    }

    /// Time of the last successful scaling action
    pub async fn last_scaled_at(&self) -> Result<Option<DateTime<Utc>>, AutoscaleError> {
        let raw = self.store.get(&self.keys.last_scaled()).await?;
        Ok(raw.as_deref().and_then(parse_timestamp))
    }

    /// Record a scaling action; never moves the timestamp backwards
    pub async fn record_scaled(&self, at: DateTime<Utc>) -> Result<(), AutoscaleError> {
        if let Some(existing) = self.last_scaled_at().await? {
            if existing > at {
                return Ok(());
            }
        }
        self.store
            .set(&self.keys.last_scaled(), &at.to_rfc3339())
            .await
    }

    /// Current marker and cooldown timestamps
    pub async fn snapshot(&self) -> Result<ScalingDecisionState, AutoscaleError> {
        Ok(ScalingDecisionState {
            scaling_in_progress_since: self.marker().await?.map(|m| m.since),
            last_scaled_at: self.last_scaled_at().await?,
        })
    }
}
