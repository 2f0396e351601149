//! Autoscaling policy configuration
//!
//! `AutoscaleConfig` is a plain value constructed once by the host and handed
//! to the controller. Credentials can be assigned explicitly or fall back to
//! the `HEROKU_API_KEY` / `HEROKU_APP` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::autoscale::{DEFAULT_LOCK_STALE_SECS, DEFAULT_REQUEST_TIMEOUT_SECS};

pub const API_KEY_ENV: &str = "HEROKU_API_KEY";
pub const APP_NAME_ENV: &str = "HEROKU_APP";
pub const ENABLED_ENV: &str = "AUTOSCALE_ENABLED";
pub const MIN_WORKERS_ENV: &str = "AUTOSCALE_MIN_WORKERS";
pub const MAX_WORKERS_ENV: &str = "AUTOSCALE_MAX_WORKERS";
pub const PROCESS_ENV: &str = "AUTOSCALE_PROCESS";
pub const COOLDOWN_ENV: &str = "AUTOSCALE_COOLDOWN_SECS";
pub const QUEUES_ENV: &str = "AUTOSCALE_QUEUES";

pub const DEFAULT_PROCESS_NAME: &str = "worker";
pub const DEFAULT_API_BASE_URL: &str = "https://api.heroku.com";

/// Queue name matching every queue
pub const ALL_QUEUES: &str = "*";

/// Errors for configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

// ============================================================================
// SBIO: Pure data structures
// ============================================================================

/// Tunable autoscaling policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoscaleConfig {
    /// Master switch; when false no hook ever reaches the platform
    pub scaling_enabled: bool,

    /// Floor for the desired worker count
    pub min_workers: u32,

    /// Ceiling for the desired worker count, 0 means unbounded
    pub max_workers: u32,

    /// Platform process type that is scaled as a unit
    pub process_name: String,

    /// Queues whose depth drives the process type, `*` for all
    pub queues: Vec<String>,

    /// Minimum seconds between two scaling actions, 0 disables the cooldown
    pub cooldown_secs: u64,

    /// Platform API credential (falls back to `HEROKU_API_KEY`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Platform application identifier (falls back to `HEROKU_APP`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,

    /// Consult `HEROKU_API_KEY` / `HEROKU_APP` when no explicit value is set
    pub env_fallback: bool,

    pub api_base_url: String,

    /// Client-side bound on every platform request
    pub request_timeout_secs: u64,

    /// Age after which an in-progress marker no longer blocks evaluation
    pub lock_stale_after_secs: u64,

    /// Recycle through zero when shrinking while jobs are running
    pub recycle_on_shrink: bool,

    pub recycle_poll_attempts: u32,

    pub recycle_poll_interval_ms: u64,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            scaling_enabled: true,
            min_workers: 0,
            max_workers: 0,
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            queues: vec![ALL_QUEUES.to_string()],
            cooldown_secs: 0,
            api_key: None,
            app_name: None,
            env_fallback: true,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            lock_stale_after_secs: DEFAULT_LOCK_STALE_SECS,
            recycle_on_shrink: false,
            recycle_poll_attempts: 4,
            recycle_poll_interval_ms: 5000,
        }
    }
}

impl AutoscaleConfig {
    /// Create a config with default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn scaling on or off
    pub fn with_scaling_enabled(mut self, enabled: bool) -> Self {
        self.scaling_enabled = enabled;
        self
    }

    /// Set the worker floor
    pub fn with_min_workers(mut self, min: u32) -> Self {
        self.min_workers = min;
        self
    }

    /// Set the worker ceiling (0 = unbounded)
    pub fn with_max_workers(mut self, max: u32) -> Self {
        self.max_workers = max;
        self
    }

    /// Set the platform process type to scale
    pub fn with_process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = name.into();
        self
    }

    /// Set the queues whose depth drives scaling
    pub fn with_queues<I, S>(mut self, queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queues = queues.into_iter().map(Into::into).collect();
        self
    }

    /// Set the minimum seconds between scaling actions
    pub fn with_cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    /// Set the platform API credential
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the platform application identifier
    pub fn with_app_name(mut self, app: impl Into<String>) -> Self {
        self.app_name = Some(app.into());
        self
    }

    /// Enable or disable the environment fallback for credentials
    pub fn with_env_fallback(mut self, enabled: bool) -> Self {
        self.env_fallback = enabled;
        self
    }

    /// Set the platform API endpoint
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Set the client-side request timeout
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Set the age after which an in-progress marker is ignored
    pub fn with_lock_stale_after_secs(mut self, secs: u64) -> Self {
        self.lock_stale_after_secs = secs;
        self
    }

    /// Enable scale-through-zero recycling with the given poll budget
    pub fn with_recycle_on_shrink(mut self, attempts: u32, interval_ms: u64) -> Self {
        self.recycle_on_shrink = true;
        self.recycle_poll_attempts = attempts;
        self.recycle_poll_interval_ms = interval_ms;
        self
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_after_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn recycle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.recycle_poll_interval_ms)
    }

    /// Explicit credential, else the environment fallback
    pub fn resolved_api_key(&self) -> Option<String> {
        self.resolved_api_key_with(|k| std::env::var(k).ok())
    }

    /// Explicit application identifier, else the environment fallback
    pub fn resolved_app_name(&self) -> Option<String> {
        self.resolved_app_name_with(|k| std::env::var(k).ok())
    }

    /// Resolve the credential against a variable lookup
    pub fn resolved_api_key_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |k: &str| if self.env_fallback { lookup(k) } else { None };
        resolve(self.api_key.as_deref(), API_KEY_ENV, lookup)
    }

    /// Resolve the application identifier against a variable lookup
    pub fn resolved_app_name_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |k: &str| if self.env_fallback { lookup(k) } else { None };
        resolve(self.app_name.as_deref(), APP_NAME_ENV, lookup)
    }

    /// Log inconsistent bounds. Never fails: the formula clamps.
    pub fn validate(&self) {
        if self.max_workers > 0 && self.min_workers > self.max_workers {
            warn!(
                min = self.min_workers,
                max = self.max_workers,
                "min_workers exceeds max_workers; desired count will be capped at max"
            );
        }
        if self.queues.is_empty() {
            warn!("no queues configured; pending work will always read as zero");
        }
        if self.process_name.trim().is_empty() {
            warn!("process name is empty; platform calls will target nothing");
        }
    }

    /// Build a configuration from a variable lookup.
    ///
    /// Unset variables keep their defaults. Credentials read here become
    /// explicit values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup(ENABLED_ENV) {
            config.scaling_enabled = parse_bool(ENABLED_ENV, &v)?;
        }
        if let Some(v) = lookup(MIN_WORKERS_ENV) {
            config.min_workers = parse_number(MIN_WORKERS_ENV, &v)?;
        }
        if let Some(v) = lookup(MAX_WORKERS_ENV) {
            config.max_workers = parse_number(MAX_WORKERS_ENV, &v)?;
        }
        if let Some(v) = lookup(COOLDOWN_ENV) {
            config.cooldown_secs = parse_number(COOLDOWN_ENV, &v)?;
        }
        if let Some(v) = lookup(PROCESS_ENV).filter(|v| !v.trim().is_empty()) {
            config.process_name = v.trim().to_string();
        }
        if let Some(v) = lookup(QUEUES_ENV).filter(|v| !v.trim().is_empty()) {
            config.queues = parse_list(&v);
        }
        config.api_key = lookup(API_KEY_ENV).filter(|v| !v.is_empty());
        config.app_name = lookup(APP_NAME_ENV).filter(|v| !v.is_empty());

        Ok(config)
    }
}

// ============================================================================
// SBIO: Pure functions (no I/O)
// ============================================================================

fn resolve<F>(explicit: Option<&str>, env_name: &str, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| lookup(env_name).filter(|v| !v.is_empty()))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

// ============================================================================
// SBIO: I/O wrappers - thin layer over pure functions
// ============================================================================

impl AutoscaleConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }
}

/// Load a `.env` file into the process environment.
/// Variables already set in the environment are not overridden.
pub fn load_env_file(path: &Path) -> Result<(), ConfigError> {
    dotenvy::from_path(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AutoscaleConfig::default();
        assert!(config.scaling_enabled);
        assert_eq!(config.min_workers, 0);
        assert_eq!(config.max_workers, 0);
        assert_eq!(config.process_name, "worker");
        assert_eq!(config.cooldown_secs, 0);
        assert_eq!(config.lock_stale_after_secs, 30);
        assert_eq!(config.recycle_poll_attempts, 4);
        assert!(!config.recycle_on_shrink);
    }

    #[test]
    fn test_builder() {
        let config = AutoscaleConfig::new()
            .with_min_workers(1)
            .with_max_workers(5)
            .with_process_name("resque")
            .with_cooldown_secs(15)
            .with_app_name("my-grand-app")
            .with_lock_stale_after_secs(5)
            .with_recycle_on_shrink(2, 10);

        assert_eq!(config.min_workers, 1);
        assert_eq!(config.max_workers, 5);
        assert_eq!(config.process_name, "resque");
        assert_eq!(config.cooldown(), Duration::from_secs(15));
        assert_eq!(config.app_name.as_deref(), Some("my-grand-app"));
        assert!(config.recycle_on_shrink);
        assert_eq!(config.recycle_poll_interval(), Duration::from_millis(10));
        assert_eq!(config.lock_stale_after(), Duration::from_secs(5));
    }

    #[test]
    fn test_explicit_credential_wins_over_env() {
        let lookup = lookup_from(&[(API_KEY_ENV, "from-env")]);
        assert_eq!(
            resolve(Some("explicit"), API_KEY_ENV, &lookup).as_deref(),
            Some("explicit")
        );
        assert_eq!(resolve(None, API_KEY_ENV, &lookup).as_deref(), Some("from-env"));
        assert_eq!(resolve(Some(""), API_KEY_ENV, &lookup).as_deref(), Some("from-env"));
        assert_eq!(resolve(None, APP_NAME_ENV, &lookup), None);
    }

    #[test]
    fn test_from_lookup() {
        let config = AutoscaleConfig::from_lookup(lookup_from(&[
            (API_KEY_ENV, "abcdef"),
            (APP_NAME_ENV, "yaa"),
            (ENABLED_ENV, "false"),
            (MIN_WORKERS_ENV, "2"),
            (MAX_WORKERS_ENV, "8"),
            (COOLDOWN_ENV, "120"),
            (PROCESS_ENV, "resque"),
        ]))
        .unwrap();

        assert!(!config.scaling_enabled);
        assert_eq!(config.min_workers, 2);
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.cooldown_secs, 120);
        assert_eq!(config.process_name, "resque");
        assert_eq!(config.api_key.as_deref(), Some("abcdef"));
        assert_eq!(config.app_name.as_deref(), Some("yaa"));
    }

    #[test]
    fn test_env_fallback_can_be_disabled() {
        let lookup = lookup_from(&[(API_KEY_ENV, "from-env"), (APP_NAME_ENV, "env-app")]);

        let config = AutoscaleConfig::new();
        assert_eq!(config.resolved_api_key_with(&lookup).as_deref(), Some("from-env"));
        assert_eq!(config.resolved_app_name_with(&lookup).as_deref(), Some("env-app"));

        let config = AutoscaleConfig::new()
            .with_env_fallback(false)
            .with_app_name("explicit-app");
        assert_eq!(config.resolved_api_key_with(&lookup), None);
        assert_eq!(
            config.resolved_app_name_with(&lookup).as_deref(),
            Some("explicit-app")
        );
    }

    #[test]
    fn test_queues() {
        assert_eq!(AutoscaleConfig::default().queues, vec!["*".to_string()]);

        let config = AutoscaleConfig::new().with_queues(["high", "low"]);
        assert_eq!(config.queues, vec!["high".to_string(), "low".to_string()]);

        let config =
            AutoscaleConfig::from_lookup(lookup_from(&[(QUEUES_ENV, "mail, ,reports ")])).unwrap();
        assert_eq!(config.queues, vec!["mail".to_string(), "reports".to_string()]);
    }

    #[test]
    fn test_from_lookup_empty_keeps_defaults() {
        let config = AutoscaleConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, AutoscaleConfig::default());
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = AutoscaleConfig::from_lookup(lookup_from(&[(MIN_WORKERS_ENV, "many")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { name: MIN_WORKERS_ENV, .. })
        ));

        let result = AutoscaleConfig::from_lookup(lookup_from(&[(ENABLED_ENV, "maybe")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{"minWorkers": 1, "cooldownSecs": 60}"#;
        let config: AutoscaleConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.min_workers, 1);
        assert_eq!(config.cooldown_secs, 60);
        assert_eq!(config.process_name, "worker");
        assert!(config.scaling_enabled);
    }

    #[test]
    fn test_load_env_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "QUEUESCALE_TEST_ONLY_VAR=loaded").unwrap();

        load_env_file(file.path()).unwrap();
        assert_eq!(
            std::env::var("QUEUESCALE_TEST_ONLY_VAR").as_deref(),
            Ok("loaded")
        );
    }

    #[test]
    fn test_load_missing_env_file() {
        let result = load_env_file(Path::new("/nonexistent/.env"));
        assert!(matches!(result, Err(ConfigError::EnvFile(_))));
    }
}
