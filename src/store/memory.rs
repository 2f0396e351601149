use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::StateStore;
use crate::error::AutoscaleError;

/// In-process store, shared by cloning.
///
/// Suitable when every trigger runs inside one process; hosts spread across
/// machines plug in a networked `StateStore` instead.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AutoscaleError> {
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AutoscaleError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AutoscaleError> {
        self.entries.remove(key);
        Ok(())
    }
}
