use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::WorkerSettings;
use crate::{Error, Result};

/// Smallest page size the Twitter timeline endpoint accepts
pub const MIN_FETCH_RESULTS: u32 = 5;
/// Largest page size the Twitter timeline endpoint accepts
pub const MAX_FETCH_RESULTS: u32 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory path (holds the entity database)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Tick interval in seconds; also the width of every fetch window
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Deadline for a single entity job in milliseconds
    #[serde(default = "default_job_timeout")]
    pub job_timeout_ms: u64,
    /// Number of concurrent jobs per tick
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            job_timeout_ms: default_job_timeout(),
            worker_count: default_worker_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    /// Bearer token for the Twitter API v2
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// API base URL
    #[serde(default = "default_twitter_base_url")]
    pub base_url: String,
    /// Page size for timeline requests (5-100)
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            bearer_token: None,
            base_url: default_twitter_base_url(),
            max_results: default_max_results(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Prediction endpoint URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// SQS queue URL that receives fake news events
    #[serde(default)]
    pub queue_url: Option<String>,
    /// AWS region of the queue
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override (e.g. a local SQS emulator)
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("newswatch")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval() -> u64 {
    10
}

fn default_job_timeout() -> u64 {
    20_000 // Covers a paginated timeline fetch plus one prediction call
}

fn default_worker_count() -> usize {
    2
}

fn default_twitter_base_url() -> String {
    "https://api.twitter.com/2".to_string()
}

fn default_max_results() -> u32 {
    MAX_FETCH_RESULTS
}

fn default_request_timeout() -> u64 {
    10
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

/// Treat empty strings from the environment as unset
fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has an invalid value: {:?}", name, value)))
}

impl AppConfig {
    /// Load configuration from the default path, then apply environment overrides
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file (defaults when it does not exist)
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Overlay values from the environment on top of the file contents
    ///
    /// The lookup is injected so tests do not have to touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LOG_LEVEL").and_then(non_empty) {
            self.general.log_level = v;
        }
        if let Some(v) = lookup("DATA_DIR").and_then(non_empty) {
            self.general.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("WORKER_INTERVAL_SECONDS").and_then(non_empty) {
            self.worker.interval_secs = parse_env("WORKER_INTERVAL_SECONDS", &v)?;
        }
        if let Some(v) = lookup("WORKER_JOB_TIMEOUT_MS").and_then(non_empty) {
            self.worker.job_timeout_ms = parse_env("WORKER_JOB_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("WORKER_COUNT").and_then(non_empty) {
            self.worker.worker_count = parse_env("WORKER_COUNT", &v)?;
        }
        if let Some(v) = lookup("TWITTER_BEARER_TOKEN").and_then(non_empty) {
            self.twitter.bearer_token = Some(v);
        }
        if let Some(v) = lookup("PREDICTOR_BASE_URL").and_then(non_empty) {
            self.predictor.base_url = Some(v);
        }
        if let Some(v) = lookup("FAKE_NEWS_QUEUE_URL").and_then(non_empty) {
            self.queue.queue_url = Some(v);
        }
        if let Some(v) = lookup("FAKE_NEWS_QUEUE_REGION").and_then(non_empty) {
            self.queue.region = Some(v);
        }
        if let Some(v) = lookup("FAKE_NEWS_QUEUE_ENDPOINT").and_then(non_empty) {
            self.queue.endpoint_url = Some(v);
        }
        Ok(())
    }

    /// Check everything the daemon needs before any collaborator is built
    ///
    /// With `dry_run` the queue settings are not required since events are only logged.
    pub fn validate_for_daemon(&self, dry_run: bool) -> Result<()> {
        if self.worker.interval_secs == 0 {
            return Err(Error::Config("worker.interval_secs must be greater than 0".into()));
        }
        if self.worker.job_timeout_ms == 0 {
            return Err(Error::Config("worker.job_timeout_ms must be greater than 0".into()));
        }
        if self.worker.worker_count == 0 {
            return Err(Error::Config("worker.worker_count must be greater than 0".into()));
        }
        if !(MIN_FETCH_RESULTS..=MAX_FETCH_RESULTS).contains(&self.twitter.max_results) {
            return Err(Error::Config(format!(
                "twitter.max_results must be between {} and {}",
                MIN_FETCH_RESULTS, MAX_FETCH_RESULTS
            )));
        }
        if self.twitter.bearer_token.is_none() {
            return Err(Error::Config("twitter.bearer_token is required".into()));
        }
        if self.predictor.base_url.is_none() {
            return Err(Error::Config("predictor.base_url is required".into()));
        }
        if !dry_run {
            if self.queue.queue_url.is_none() {
                return Err(Error::Config("queue.queue_url is required".into()));
            }
            if self.queue.region.is_none() {
                return Err(Error::Config("queue.region is required".into()));
            }
        }
        Ok(())
    }

    /// Scheduler settings derived from the `[worker]` section
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            tick_interval: Duration::from_secs(self.worker.interval_secs),
            job_timeout: Duration::from_millis(self.worker.job_timeout_ms),
            worker_count: self.worker.worker_count,
        }
    }

    /// Get the configuration file path
    /// Always uses ~/.config/newswatch/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("newswatch")
            .join("config.toml")
    }

    /// Get the database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("newswatch.db")
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn complete_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.twitter.bearer_token = Some("token".into());
        config.predictor.base_url = Some("http://localhost:5000/predict".into());
        config.queue.queue_url = Some("http://localhost:4566/000000000000/fake-news".into());
        config.queue.region = Some("eu-central-1".into());
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.worker.interval_secs, 10);
        assert_eq!(config.worker.worker_count, 2);
        assert_eq!(config.twitter.max_results, 100);
        assert_eq!(config.general.log_level, "info");
        assert!(config.database_path().ends_with("newswatch.db"));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[worker]
interval_secs = 30
worker_count = 4

[twitter]
bearer_token = "abc"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.worker.interval_secs, 30);
        assert_eq!(config.worker.worker_count, 4);
        assert_eq!(config.worker.job_timeout_ms, 20_000);
        assert_eq!(config.twitter.bearer_token.as_deref(), Some("abc"));
        assert_eq!(config.twitter.base_url, "https://api.twitter.com/2");
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[worker\ninterval_secs = ").unwrap();

        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("WORKER_INTERVAL_SECONDS", "5"),
            ("WORKER_COUNT", "3"),
            ("TWITTER_BEARER_TOKEN", "from-env"),
            ("FAKE_NEWS_QUEUE_ENDPOINT", ""),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.worker.interval_secs, 5);
        assert_eq!(config.worker.worker_count, 3);
        assert_eq!(config.twitter.bearer_token.as_deref(), Some("from-env"));
        assert!(config.queue.endpoint_url.is_none());
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|name| {
                (name == "WORKER_INTERVAL_SECONDS").then(|| "ten".to_string())
            })
            .unwrap_err();
        assert!(err.to_string().contains("WORKER_INTERVAL_SECONDS"));
    }

    #[test]
    fn test_validate_for_daemon() {
        assert!(complete_config().validate_for_daemon(false).is_ok());

        let mut config = complete_config();
        config.queue.queue_url = None;
        assert!(config.validate_for_daemon(false).is_err());
        assert!(config.validate_for_daemon(true).is_ok());

        let mut config = complete_config();
        config.twitter.max_results = 101;
        assert!(config.validate_for_daemon(true).is_err());

        let mut config = complete_config();
        config.worker.worker_count = 0;
        assert!(config.validate_for_daemon(true).is_err());

        let mut config = complete_config();
        config.twitter.bearer_token = None;
        assert!(config.validate_for_daemon(true).is_err());
    }

    #[test]
    fn test_worker_settings() {
        let mut config = AppConfig::default();
        config.worker.interval_secs = 15;
        config.worker.job_timeout_ms = 250;
        config.worker.worker_count = 3;

        let settings = config.worker_settings();
        assert_eq!(settings.tick_interval, Duration::from_secs(15));
        assert_eq!(settings.job_timeout, Duration::from_millis(250));
        assert_eq!(settings.worker_count, 3);
    }
}
