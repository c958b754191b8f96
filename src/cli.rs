//! CLI parse: clap types for the bridge daemon. Definitions and config
//! overrides only; orchestration lives in the daemon module.

use crate::config::BridgeConfig;
use clap::Parser;
use std::path::PathBuf;

/// Telebridge - gateway-to-ingestion telemetry bridge
#[derive(Parser, Debug)]
#[command(name = "telebridge")]
#[command(about = "Polls an agent gateway for sessions and pushes telemetry events downstream")]
pub struct Cli {
    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Gateway base URL
    #[arg(long)]
    pub upstream_url: Option<String>,

    /// Ingestion API base URL
    #[arg(long)]
    pub downstream_url: Option<String>,

    /// Seconds between poll cycles
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Maximum sessions fetched per cycle
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Maximum events per bulk push
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Stop after this many consecutive failed cycles
    #[arg(long)]
    pub max_errors: Option<u32>,

    /// Run exactly one cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Shortcut for --log-level debug
    #[arg(long)]
    pub verbose: bool,

    /// Shortcut for --log-level error
    #[arg(long)]
    pub quiet: bool,
}

impl Cli {
    /// Apply CLI flags on top of the loaded configuration.
    /// An explicit --log-level wins over --verbose/--quiet.
    pub fn apply_overrides(&self, config: &mut BridgeConfig) {
        if let Some(ref url) = self.upstream_url {
            config.upstream_url = url.clone();
        }
        if let Some(ref url) = self.downstream_url {
            config.downstream_url = url.clone();
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval_secs = interval;
        }
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(max_errors) = self.max_errors {
            config.max_errors = max_errors;
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
        if self.quiet {
            config.logging.level = "error".to_string();
        }
        if let Some(ref level) = self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(ref format) = self.log_format {
            config.logging.format = format.clone();
        }
    }
}
