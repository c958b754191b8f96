//! Configuration System
//!
//! Single typed configuration structure for the bridge, validated once at
//! daemon construction. Values are layered: built-in defaults, then an
//! optional TOML file, then `TELEBRIDGE_*` environment overrides. CLI flags
//! are applied on top by the binary.

use crate::error::BridgeError;
use crate::logging::LoggingConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How long an ingested session identifier stays in the seen-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Once ingested, never re-emitted for the lifetime of the process.
    Permanent,
    /// An identifier expires once it has been quiet longer than the
    /// recency window, so a long-lived session is re-ingested per window.
    Window,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        DedupPolicy::Permanent
    }
}

/// Root configuration for the polling bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Gateway base URL (upstream, sessions are fetched from here)
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Ingestion API base URL (downstream, events are pushed here)
    #[serde(default = "default_downstream_url")]
    pub downstream_url: String,

    /// Seconds between poll cycles
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum sessions fetched per cycle
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum events per bulk push; larger cycles are split
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Consecutive failed cycles before the daemon stops
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,

    /// Per-request deadline for both HTTP clients, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Sessions idle longer than this are not ingested, in minutes
    #[serde(default = "default_recency_window_mins")]
    pub recency_window_mins: i64,

    /// Sessions below this combined token count are noise
    #[serde(default = "default_min_tokens")]
    pub min_tokens: u64,

    /// Seen-set expiry policy
    #[serde(default)]
    pub dedup: DedupPolicy,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:18789".to_string()
}

fn default_downstream_url() -> String {
    "http://localhost:8765".to_string()
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_page_size() -> usize {
    50
}

fn default_batch_size() -> usize {
    25
}

fn default_max_errors() -> u32 {
    10
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_recency_window_mins() -> i64 {
    30
}

fn default_min_tokens() -> u64 {
    10
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            upstream_url: default_upstream_url(),
            downstream_url: default_downstream_url(),
            poll_interval_secs: default_poll_interval_secs(),
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            max_errors: default_max_errors(),
            request_timeout_secs: default_request_timeout_secs(),
            recency_window_mins: default_recency_window_mins(),
            min_tokens: default_min_tokens(),
            dedup: DedupPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let mut errors = Vec::new();

        for (name, url) in [
            ("upstream_url", &self.upstream_url),
            ("downstream_url", &self.downstream_url),
        ] {
            if url.trim().is_empty() {
                errors.push(format!("{} cannot be empty", name));
            } else if !url.starts_with("http://") && !url.starts_with("https://") {
                errors.push(format!("{} must be an http(s) URL: {}", name, url));
            }
        }

        if self.poll_interval_secs == 0 {
            errors.push("poll_interval_secs must be at least 1".to_string());
        }
        if self.page_size == 0 {
            errors.push("page_size must be at least 1".to_string());
        }
        if self.batch_size == 0 {
            errors.push("batch_size must be at least 1".to_string());
        }
        if self.max_errors == 0 {
            errors.push("max_errors must be at least 1".to_string());
        }
        if self.request_timeout_secs == 0 {
            errors.push("request_timeout_secs must be at least 1".to_string());
        }
        if self.recency_window_mins <= 0 {
            errors.push("recency_window_mins must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::Config(errors.join("; ")))
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn recency_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.recency_window_mins)
    }

    /// Base URL with any trailing slash removed, for joining paths.
    pub fn upstream_base(&self) -> &str {
        self.upstream_url.trim_end_matches('/')
    }

    pub fn downstream_base(&self) -> &str {
        self.downstream_url.trim_end_matches('/')
    }
}

/// Layered configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration: defaults, then `telebridge.toml` in the working
    /// directory (or the explicit path), then `TELEBRIDGE_*` env overrides.
    pub fn load(config_path: Option<&Path>) -> Result<BridgeConfig, BridgeError> {
        let mut builder = Config::builder();

        match config_path {
            Some(path) => {
                let path_str = path.to_str().ok_or_else(|| {
                    BridgeError::Config(format!("Config path is not valid UTF-8: {:?}", path))
                })?;
                builder = builder.add_source(File::with_name(path_str).required(true));
            }
            None => {
                builder = builder.add_source(File::with_name("telebridge").required(false));
            }
        }

        // prefix attaches with a single underscore; `__` only separates
        // nested keys, e.g. TELEBRIDGE_LOGGING__LEVEL
        builder = builder.add_source(
            Environment::with_prefix("TELEBRIDGE")
                .prefix_separator("_")
                .separator("__"),
        );

        let settings = builder.build()?;
        let config: BridgeConfig = settings.try_deserialize()?;
        Ok(config)
    }
}
