//! Remote process-scaling API
//!
//! The platform is a black box that can report the processes running for a
//! process type and accept a new desired count for it.

pub mod heroku;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AutoscaleError;

pub use heroku::HerokuClient;

/// One running process as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Instance name, e.g. `worker.3`
    pub name: String,

    /// Process type the instance belongs to
    #[serde(rename = "type")]
    pub process_type: String,

    #[serde(default)]
    pub state: String,
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn list_processes(
        &self,
        app: &str,
        process: &str,
    ) -> Result<Vec<ProcessInfo>, AutoscaleError>;

    async fn set_process_count(
        &self,
        app: &str,
        process: &str,
        count: u32,
    ) -> Result<(), AutoscaleError>;

    async fn process_count(&self, app: &str, process: &str) -> Result<u32, AutoscaleError> {
        Ok(self.list_processes(app, process).await?.len() as u32)
    }
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_info_deserialization() {
        let json = r#"{"name": "worker.1", "type": "worker", "state": "up", "size": "basic"}"#;
        let info: ProcessInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.name, "worker.1");
        assert_eq!(info.process_type, "worker");
        assert_eq!(info.state, "up");
    }

    #[tokio::test]
    async fn test_default_process_count_uses_listing() {
        let client = mock::MockPlatformClient::new(3);
        assert_eq!(client.process_count("app", "worker").await.unwrap(), 3);
        assert_eq!(client.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_records_set_calls() {
        let client = mock::MockPlatformClient::new(0);
        client.set_process_count("app", "worker", 4).await.unwrap();
        assert_eq!(client.count(), 4);
        assert_eq!(
            client.set_call_targets(),
            vec![("app".to_string(), "worker".to_string(), 4)]
        );
    }
}
