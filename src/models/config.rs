//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Search API client settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Pagination, pacing and error budget settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Sink, checkpoint and fallback locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Out-of-band failure notifications
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Log level and log file locations
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Directory relative paths are resolved against (the config file's directory)
    #[serde(skip)]
    pub root: PathBuf,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    /// Load configuration, using defaults only when the file does not exist.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!("Config not found at {:?}. Using defaults.", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Resolve a configured path against the config root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Directory holding term lists, checkpoints and fallback files.
    pub fn data_path(&self) -> PathBuf {
        self.resolve(&self.storage.data_path)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_path().join(&self.storage.checkpoint_file)
    }

    pub fn fallback_dir(&self) -> PathBuf {
        self.data_path().join(&self.storage.fallback_dir)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.resolve(&self.api.credentials_file)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.api.base_url)
            .map_err(|e| AppError::validation(format!("api.base_url is invalid: {e}")))?;
        if self.api.user_agent.trim().is_empty() {
            return Err(AppError::validation("api.user_agent is empty"));
        }
        if self.api.timeout_secs == 0 {
            return Err(AppError::validation("api.timeout_secs must be > 0"));
        }
        if self.api.page_size == 0 || self.api.page_size > 100 {
            return Err(AppError::validation("api.page_size must be within 1..=100"));
        }
        if self.search.flush_threshold == 0 || self.search.testing_flush_threshold == 0 {
            return Err(AppError::validation("search flush thresholds must be > 0"));
        }
        if self.search.max_errors == 0 {
            return Err(AppError::validation("search.max_errors must be > 0"));
        }
        if self.storage.database.trim().is_empty() || self.storage.collection.trim().is_empty() {
            return Err(AppError::validation(
                "storage.database and storage.collection must be set",
            ));
        }
        if self.storage.backend == SinkBackend::S3 && self.storage.bucket.trim().is_empty() {
            return Err(AppError::validation(
                "storage.bucket is required for the s3 backend",
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            search: SearchConfig::default(),
            storage: StorageConfig::default(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
            root: PathBuf::from("."),
        }
    }
}

/// Search API client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the v1.1 REST API (trailing slash matters for joins)
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// JSON file holding `{ "bearer_token": "..." }`
    #[serde(default = "defaults::credentials_file")]
    pub credentials_file: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Records requested per page (the API caps this at 100)
    #[serde(default = "defaults::page_size")]
    pub page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            credentials_file: defaults::credentials_file(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            page_size: defaults::page_size(),
        }
    }
}

/// Pagination, pacing and error budget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Fixed delay before every page request
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Suspension after the API reports the rate limit is exhausted
    #[serde(default = "defaults::rate_limit_cooldown")]
    pub rate_limit_cooldown_secs: u64,

    /// Delay before retrying after an empty page
    #[serde(default = "defaults::empty_retry_delay")]
    pub empty_retry_delay_ms: u64,

    /// Retries allowed after an empty page before the search ends
    #[serde(default = "defaults::max_empty_retries")]
    pub max_empty_retries: u32,

    /// Consecutive failures tolerated per term search
    #[serde(default = "defaults::max_errors")]
    pub max_errors: usize,

    /// Pending records that trigger a flush once exceeded
    #[serde(default = "defaults::flush_threshold")]
    pub flush_threshold: usize,

    /// Flush threshold in testing mode
    #[serde(default = "defaults::testing_flush_threshold")]
    pub testing_flush_threshold: usize,

    /// Terms searched in testing mode
    #[serde(default = "defaults::testing_term_limit")]
    pub testing_term_limit: usize,
}

impl SearchConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn empty_retry_delay(&self) -> Duration {
        Duration::from_millis(self.empty_retry_delay_ms)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: defaults::request_delay(),
            rate_limit_cooldown_secs: defaults::rate_limit_cooldown(),
            empty_retry_delay_ms: defaults::empty_retry_delay(),
            max_empty_retries: defaults::max_empty_retries(),
            max_errors: defaults::max_errors(),
            flush_threshold: defaults::flush_threshold(),
            testing_flush_threshold: defaults::testing_flush_threshold(),
            testing_term_limit: defaults::testing_term_limit(),
        }
    }
}

/// Which store receives flushed batches when it is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkBackend {
    /// JSON-lines files only
    #[default]
    Local,
    /// S3 document store, JSON-lines files as fallback
    S3,
}

/// Sink, checkpoint and fallback locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::data_path")]
    pub data_path: String,

    #[serde(default)]
    pub backend: SinkBackend,

    #[serde(default = "defaults::database")]
    pub database: String,

    #[serde(default = "defaults::collection")]
    pub collection: String,

    /// S3 bucket (s3 backend only)
    #[serde(default)]
    pub bucket: String,

    /// S3 key prefix (s3 backend only)
    #[serde(default = "defaults::prefix")]
    pub prefix: String,

    /// Checkpoint file, relative to `data_path`
    #[serde(default = "defaults::checkpoint_file")]
    pub checkpoint_file: String,

    /// Fallback JSON-lines directory, relative to `data_path`
    #[serde(default = "defaults::fallback_dir")]
    pub fallback_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: defaults::data_path(),
            backend: SinkBackend::default(),
            database: defaults::database(),
            collection: defaults::collection(),
            bucket: String::new(),
            prefix: defaults::prefix(),
            checkpoint_file: defaults::checkpoint_file(),
            fallback_dir: defaults::fallback_dir(),
        }
    }
}

/// Out-of-band failure notifications.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifyConfig {
    /// Mail relay endpoint; notifications are only logged when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default)]
    pub recipients: Vec<String>,
}

/// Log level and log file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Append-only failure log
    #[serde(default = "defaults::error_log")]
    pub error_log: String,

    /// Per-pass new record counts (CSV)
    #[serde(default = "defaults::pass_report")]
    pub pass_report: String,

    #[serde(default = "defaults::runtime_log")]
    pub runtime_log: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            error_log: defaults::error_log(),
            pass_report: defaults::pass_report(),
            runtime_log: defaults::runtime_log(),
        }
    }
}

mod defaults {
    // API defaults
    pub fn base_url() -> String {
        "https://api.twitter.com/1.1/".into()
    }
    pub fn credentials_file() -> String {
        "twitter_api.json".into()
    }
    pub fn user_agent() -> String {
        "tweet-harvester/0.1".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn page_size() -> u32 {
        100
    }

    // Search defaults
    pub fn request_delay() -> u64 {
        3_000
    }
    pub fn rate_limit_cooldown() -> u64 {
        15 * 60
    }
    pub fn empty_retry_delay() -> u64 {
        3_000
    }
    pub fn max_empty_retries() -> u32 {
        1
    }
    pub fn max_errors() -> usize {
        5
    }
    pub fn flush_threshold() -> usize {
        1500
    }
    pub fn testing_flush_threshold() -> usize {
        5
    }
    pub fn testing_term_limit() -> usize {
        10
    }

    // Storage defaults
    pub fn data_path() -> String {
        "data".into()
    }
    pub fn database() -> String {
        "twitter".into()
    }
    pub fn collection() -> String {
        "tweets".into()
    }
    pub fn prefix() -> String {
        "harvest".into()
    }
    pub fn checkpoint_file() -> String {
        "tweets/last_ids.json".into()
    }
    pub fn fallback_dir() -> String {
        "tweets".into()
    }

    // Logging defaults
    pub fn log_level() -> String {
        "info".into()
    }
    pub fn error_log() -> String {
        "errors.log".into()
    }
    pub fn pass_report() -> String {
        "pass_report.csv".into()
    }
    pub fn runtime_log() -> String {
        "runtime.log".into()
    }
}
