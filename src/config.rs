//! Configuration for VIRTA

use crate::error::{Result, VirtaError};
use crate::retry::BackoffConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Where the simulator publishes objects
///
/// The original deployment asked interactively whether to upload; here the
/// choice is resolved before the pipeline starts so the core never blocks on
/// input.
#[derive(Debug, Clone)]
pub enum SinkMode {
    /// Write files under a local directory
    Local { data_dir: PathBuf },
    /// Upload to an object store bucket
    Remote {
        bucket: String,
        prefix: Option<String>,
        region: String,
    },
}

/// Main configuration for VIRTA
#[derive(Debug, Clone)]
pub struct Config {
    /// Publish destination
    pub sink: SinkMode,

    /// Sites to simulate, one reading per site per tick
    pub sites: Vec<String>,

    /// Interval between simulator ticks
    pub tick_interval: Duration,

    /// Backoff for simulator publishes
    pub publish_backoff: BackoffConfig,

    /// Backoff for processor fetches and puts
    pub process_backoff: BackoffConfig,

    /// Deadline for each individual external call
    pub op_timeout: Duration,

    /// Deadline for one processor invocation
    pub deadline: Duration,

    /// Capacity of the poison payload buffer
    pub dead_letter_capacity: usize,

    /// Log level
    pub log_level: String,

    /// Log format (json or pretty)
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sink: SinkMode::Local {
                data_dir: PathBuf::from("data"),
            },
            sites: vec![
                "site-001".to_string(),
                "site-002".to_string(),
                "site-003".to_string(),
            ],
            tick_interval: Duration::from_secs(5),
            publish_backoff: BackoffConfig::default(),
            process_backoff: BackoffConfig::default(),
            op_timeout: Duration::from_secs(10),
            deadline: Duration::from_secs(30),
            dead_letter_capacity: 1000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Setting `VIRTA_BUCKET` selects the remote sink; otherwise readings go
    /// under `VIRTA_DATA_DIR` (default `data/`).
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(bucket) = env::var("VIRTA_BUCKET") {
            if bucket.is_empty() {
                return Err(VirtaError::Config("VIRTA_BUCKET is empty".into()));
            }
            config.sink = SinkMode::Remote {
                bucket,
                prefix: env::var("VIRTA_KEY_PREFIX").ok().filter(|p| !p.is_empty()),
                region: env::var("VIRTA_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            };
        } else if let Ok(dir) = env::var("VIRTA_DATA_DIR") {
            config.sink = SinkMode::Local {
                data_dir: PathBuf::from(dir),
            };
        }

        if let Ok(sites) = env::var("VIRTA_SITES") {
            let sites: Vec<String> = sites
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if sites.is_empty() {
                return Err(VirtaError::Config("VIRTA_SITES names no sites".into()));
            }
            config.sites = sites;
        }

        if let Ok(interval) = env::var("VIRTA_TICK_INTERVAL_MS") {
            let ms: u64 = interval
                .parse()
                .map_err(|e| VirtaError::Config(format!("invalid VIRTA_TICK_INTERVAL_MS: {e}")))?;
            config.tick_interval = Duration::from_millis(ms);
        }

        if let Ok(attempts) = env::var("VIRTA_RETRY_ATTEMPTS") {
            let attempts: u32 = attempts
                .parse()
                .map_err(|e| VirtaError::Config(format!("invalid VIRTA_RETRY_ATTEMPTS: {e}")))?;
            config.publish_backoff.max_attempts = attempts;
            config.process_backoff.max_attempts = attempts;
        }

        if let Ok(base) = env::var("VIRTA_RETRY_BASE_MS") {
            let ms: u64 = base
                .parse()
                .map_err(|e| VirtaError::Config(format!("invalid VIRTA_RETRY_BASE_MS: {e}")))?;
            config.publish_backoff.initial_delay = Duration::from_millis(ms);
            config.process_backoff.initial_delay = Duration::from_millis(ms);
        }

        if let Ok(timeout) = env::var("VIRTA_OP_TIMEOUT_MS") {
            let ms: u64 = timeout
                .parse()
                .map_err(|e| VirtaError::Config(format!("invalid VIRTA_OP_TIMEOUT_MS: {e}")))?;
            config.op_timeout = Duration::from_millis(ms);
        }

        if let Ok(deadline) = env::var("VIRTA_DEADLINE_MS") {
            let ms: u64 = deadline
                .parse()
                .map_err(|e| VirtaError::Config(format!("invalid VIRTA_DEADLINE_MS: {e}")))?;
            config.deadline = Duration::from_millis(ms);
        }

        if let Ok(capacity) = env::var("VIRTA_DEAD_LETTER_CAPACITY") {
            config.dead_letter_capacity = capacity.parse().map_err(|e| {
                VirtaError::Config(format!("invalid VIRTA_DEAD_LETTER_CAPACITY: {e}"))
            })?;
        }

        if let Ok(level) = env::var("VIRTA_LOG_LEVEL") {
            config.log_level = level;
        }

        if let Ok(format) = env::var("VIRTA_LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(VirtaError::Config(format!(
                        "invalid VIRTA_LOG_FORMAT: {other} (expected 'json' or 'pretty')"
                    )));
                }
            };
        }

        Ok(config)
    }
}
