//! Key-value state shared by every host running the controller
//!
//! The store holds two values per scaled target: the in-progress marker and
//! the last-scaled timestamp. It offers no locking; the controller layers a
//! time-based advisory marker on top of plain get/set/delete.

pub mod memory;

use async_trait::async_trait;

use crate::error::AutoscaleError;

pub use memory::MemoryStateStore;

/// Prefix shared by every key this crate writes
pub const KEY_PREFIX: &str = "queuescale";

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AutoscaleError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), AutoscaleError>;

    async fn delete(&self, key: &str) -> Result<(), AutoscaleError>;
}

/// Keys for one independently scaled target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedKeys {
    scope: String,
}

impl ScopedKeys {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn scaling(&self) -> String {
        format!("{}:{}:scaling", KEY_PREFIX, self.scope)
    }

    pub fn last_scaled(&self) -> String {
        format!("{}:{}:last_scaled", KEY_PREFIX, self.scope)
    }
}
