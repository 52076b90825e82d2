//! Collector configuration
//!
//! Values are resolved once at startup from, in order of precedence:
//! command-line flags, `OC_*` environment variables, an optional JSON config
//! file, and finally the defaults below. The resulting [`CollectorConfig`] is
//! handed to every component by value; nothing reads configuration globally.

use crate::error::CollectorError;
use crate::monitoring::MonitoringConfig;
use crate::retry::BackoffConfig;
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_SCHEDULE_SECS: u64 = 30;
pub const DEFAULT_QUEUE_CAPACITY: usize = 5000;
pub const DEFAULT_PAGE_LIMIT: u32 = 1000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_AUTH_SCHEME: &str = "SSWS";
pub const DEFAULT_STATE_PATH: &str = "state.json";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// API host, e.g. `acme.okta.com`. A value with an explicit
    /// `http://` or `https://` scheme is used as the base URL verbatim.
    pub domain: String,
    /// API credential
    pub api_token: String,
    /// Scheme placed before the credential in the `Authorization` header
    pub auth_scheme: String,
    /// Time between two fetch cycles
    pub schedule: Duration,
    /// Location of the checkpoint file
    pub state_path: PathBuf,
    /// Directory for rotated temp files, owned by this collector
    pub tmp_dir: PathBuf,
    /// Directory the output sink writes batches to
    pub output_dir: PathBuf,
    /// Capacity of the bounded event queue
    pub queue_capacity: usize,
    /// Records requested per page
    pub page_limit: u32,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
    /// Rate-limit backoff settings
    pub backoff: BackoffConfig,
    /// Lower bound of the first window when no checkpoint exists
    pub start_time: Option<DateTime<Utc>>,
    pub monitoring: MonitoringConfig,
    pub verbose: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            api_token: String::new(),
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
            schedule: Duration::from_secs(DEFAULT_SCHEDULE_SECS),
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            tmp_dir: std::env::temp_dir().join("audit-log-collector"),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            page_limit: DEFAULT_PAGE_LIMIT,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            backoff: BackoffConfig::default(),
            start_time: None,
            monitoring: MonitoringConfig::default(),
            verbose: false,
        }
    }
}

impl CollectorConfig {
    pub fn base_url(&self) -> String {
        if self.domain.starts_with("http://") || self.domain.starts_with("https://") {
            self.domain.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.domain)
        }
    }

    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.domain.trim().is_empty() {
            return Err(CollectorError::Config(
                "missing okta domain param (--okta-domain)".to_string(),
            ));
        }
        if self.api_token.trim().is_empty() {
            return Err(CollectorError::Config(
                "missing okta api key param (--okta-api-key)".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(CollectorError::Config(
                "queue capacity must be greater than zero".to_string(),
            ));
        }
        if self.page_limit == 0 {
            return Err(CollectorError::Config(
                "page limit must be greater than zero".to_string(),
            ));
        }
        if self.backoff.multiplier < 2 {
            return Err(CollectorError::Config(
                "backoff multiplier must be at least 2".to_string(),
            ));
        }
        if self.backoff.initial_delay.is_zero() {
            return Err(CollectorError::Config(
                "initial backoff must be greater than zero".to_string(),
            ));
        }
        if self.backoff.max_delay < self.backoff.initial_delay {
            return Err(CollectorError::Config(format!(
                "max backoff ({}ms) must not be lower than initial backoff ({}ms)",
                self.backoff.max_delay.as_millis(),
                self.backoff.initial_delay.as_millis()
            )));
        }
        Ok(())
    }
}

/// Command-line interface. Every flag can also be set through the
/// environment with the `OC_` prefix.
#[derive(Debug, Default, Parser)]
#[command(name = "audit-log-collector")]
#[command(about = "Incrementally collect audit logs and forward them to an output directory")]
#[command(version)]
pub struct Cli {
    /// Time in seconds between collections
    #[arg(long, env = "OC_SCHEDULE")]
    pub schedule: Option<u64>,

    /// Okta domain for the organization
    #[arg(long, env = "OC_OKTA_DOMAIN")]
    pub okta_domain: Option<String>,

    /// Okta API key for authentication
    #[arg(long, env = "OC_OKTA_API_KEY", hide_env_values = true)]
    pub okta_api_key: Option<String>,

    /// Authorization scheme placed before the API key
    #[arg(long, env = "OC_AUTH_SCHEME")]
    pub auth_scheme: Option<String>,

    /// Checkpoint file path
    #[arg(long, env = "OC_STATE_PATH")]
    pub state_path: Option<PathBuf>,

    /// Directory for temporary batch files
    #[arg(long, env = "OC_TMP_DIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Directory receiving flushed batches
    #[arg(long, env = "OC_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Capacity of the in-process event queue
    #[arg(long, env = "OC_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Records requested per page
    #[arg(long, env = "OC_PAGE_LIMIT")]
    pub page_limit: Option<u32>,

    /// HTTP timeout in seconds
    #[arg(long, env = "OC_HTTP_TIMEOUT")]
    pub http_timeout: Option<u64>,

    /// First rate-limit backoff in milliseconds
    #[arg(long, env = "OC_INITIAL_BACKOFF_MS")]
    pub initial_backoff_ms: Option<u64>,

    /// Largest rate-limit backoff in milliseconds
    #[arg(long, env = "OC_MAX_BACKOFF_MS")]
    pub max_backoff_ms: Option<u64>,

    /// Backoff growth factor
    #[arg(long, env = "OC_BACKOFF_MULTIPLIER")]
    pub backoff_multiplier: Option<u32>,

    /// RFC3339 lower bound for the first collection when no state exists
    #[arg(long, env = "OC_START_TIME")]
    pub start_time: Option<DateTime<Utc>>,

    /// Publish poll events (cycles, pages, rate limiting) to the log
    #[arg(long, env = "OC_MONITORING")]
    pub monitoring: bool,

    /// Verbose logging
    #[arg(short, long, env = "OC_VERBOSE")]
    pub verbose: bool,

    /// JSON config file path
    #[arg(short = 'c', long, env = "OC_CONFIG_PATH")]
    pub config_path: Option<PathBuf>,
}

/// Settings accepted in the JSON config file. Keys use the flag names.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub schedule: Option<u64>,
    pub okta_domain: Option<String>,
    pub okta_api_key: Option<String>,
    pub auth_scheme: Option<String>,
    pub state_path: Option<PathBuf>,
    pub tmp_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub queue_capacity: Option<usize>,
    pub page_limit: Option<u32>,
    pub http_timeout: Option<u64>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub monitoring: Option<bool>,
    pub verbose: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, CollectorError> {
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            return Err(CollectorError::Config(format!(
                "invalid config file type for {} (supported: json)",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            CollectorError::Config(format!("unable to read config file {}: {e}", path.display()))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            CollectorError::Config(format!("invalid config file {}: {e}", path.display()))
        })
    }
}

impl Cli {
    /// Merge flags, environment, config file and defaults, then validate
    pub fn resolve(self) -> Result<CollectorConfig, CollectorError> {
        let file = match &self.config_path {
            Some(path) => {
                debug!(path = %path.display(), "Loading config file");
                FileConfig::load(path)?
            }
            None => FileConfig::default(),
        };
        let defaults = CollectorConfig::default();

        let config = CollectorConfig {
            domain: self.okta_domain.or(file.okta_domain).unwrap_or(defaults.domain),
            api_token: self.okta_api_key.or(file.okta_api_key).unwrap_or(defaults.api_token),
            auth_scheme: self.auth_scheme.or(file.auth_scheme).unwrap_or(defaults.auth_scheme),
            schedule: self
                .schedule
                .or(file.schedule)
                .map(Duration::from_secs)
                .unwrap_or(defaults.schedule),
            state_path: self.state_path.or(file.state_path).unwrap_or(defaults.state_path),
            tmp_dir: self.tmp_dir.or(file.tmp_dir).unwrap_or(defaults.tmp_dir),
            output_dir: self.output_dir.or(file.output_dir).unwrap_or(defaults.output_dir),
            queue_capacity: self
                .queue_capacity
                .or(file.queue_capacity)
                .unwrap_or(defaults.queue_capacity),
            page_limit: self.page_limit.or(file.page_limit).unwrap_or(defaults.page_limit),
            http_timeout: self
                .http_timeout
                .or(file.http_timeout)
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            backoff: BackoffConfig {
                initial_delay: self
                    .initial_backoff_ms
                    .or(file.initial_backoff_ms)
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.backoff.initial_delay),
                max_delay: self
                    .max_backoff_ms
                    .or(file.max_backoff_ms)
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.backoff.max_delay),
                multiplier: self
                    .backoff_multiplier
                    .or(file.backoff_multiplier)
                    .unwrap_or(defaults.backoff.multiplier),
            },
            start_time: self.start_time.or(file.start_time),
            monitoring: MonitoringConfig {
                enabled: self.monitoring || file.monitoring.unwrap_or(defaults.monitoring.enabled),
                ..defaults.monitoring
            },
            verbose: self.verbose || file.verbose.unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }
}
