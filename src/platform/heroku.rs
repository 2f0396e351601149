use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use tracing::debug;

use super::{PlatformClient, ProcessInfo};
use crate::config::AutoscaleConfig;
use crate::error::AutoscaleError;

const ACCEPT_HEADER: &str = "application/vnd.heroku+json; version=3";

#[derive(Debug, Serialize)]
struct FormationUpdate {
    quantity: u32,
}

// ============================================================================
// SBIO: Pure functions (no I/O)
// ============================================================================

/// Instance names of the form `<process>.<n>`
fn instance_pattern(process: &str) -> Option<Regex> {
    Regex::new(&format!(r"^{}\.\d+$", regex::escape(process))).ok()
}

fn matches_process(info: &ProcessInfo, process: &str, pattern: Option<&Regex>) -> bool {
    info.process_type == process || pattern.is_some_and(|re| re.is_match(&info.name))
}

/// Whether a listed process belongs to the target process type.
///
/// Matches on the declared type, or on the instance name for listings that
/// omit the type.
pub fn belongs_to(info: &ProcessInfo, process: &str) -> bool {
    matches_process(info, process, instance_pattern(process).as_ref())
}

/// Map a non-success HTTP status onto the error taxonomy
pub fn classify_status(status: StatusCode, message: String) -> AutoscaleError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        AutoscaleError::RemoteUnavailable(format!("{} - {}", status.as_u16(), message))
    } else {
        AutoscaleError::RemoteRejected {
            status: status.as_u16(),
            message,
        }
    }
}

// ============================================================================
// SBIO: I/O implementation (real HTTP client)
// ============================================================================

/// Platform API v3 client for dyno formations
#[derive(Clone)]
pub struct HerokuClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HerokuClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AutoscaleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AutoscaleError::RemoteUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Build a client from the policy's credential and endpoint settings
    pub fn from_config(config: &AutoscaleConfig) -> Result<Self, AutoscaleError> {
        let api_key = config
            .resolved_api_key()
            .ok_or(AutoscaleError::ConfigurationMissing("platform API key"))?;
        Self::new(config.api_base_url.clone(), api_key, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn check(response: Response) -> Result<Response, AutoscaleError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(classify_status(status, text))
    }
}

fn transport_error(e: reqwest::Error) -> AutoscaleError {
    AutoscaleError::RemoteUnavailable(e.to_string())
}

#[async_trait]
impl PlatformClient for HerokuClient {
    async fn list_processes(
        &self,
        app: &str,
        process: &str,
    ) -> Result<Vec<ProcessInfo>, AutoscaleError> {
        let url = self.url(&format!("/apps/{}/dynos", app));

        let response = self
            .client
            .get(&url)
            .header("Accept", ACCEPT_HEADER)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check(response).await?;

        let processes: Vec<ProcessInfo> =
            response
                .json()
                .await
                .map_err(|e| AutoscaleError::RemoteRejected {
                    status: 200,
                    message: format!("unreadable process list: {}", e),
                })?;

        let pattern = instance_pattern(process);
        let matching: Vec<ProcessInfo> = processes
            .into_iter()
            .filter(|p| matches_process(p, process, pattern.as_ref()))
            .collect();

        debug!(app, process, count = matching.len(), "listed processes");
        Ok(matching)
    }

    async fn set_process_count(
        &self,
        app: &str,
        process: &str,
        count: u32,
    ) -> Result<(), AutoscaleError> {
        let url = self.url(&format!("/apps/{}/formation/{}", app, process));

        let response = self
            .client
            .patch(&url)
            .header("Accept", ACCEPT_HEADER)
            .bearer_auth(&self.api_key)
            .json(&FormationUpdate { quantity: count })
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response).await?;

        debug!(app, process, count, "formation updated");
        Ok(())
    }
}
