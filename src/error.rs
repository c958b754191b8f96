//! Error types for the telemetry bridge.

use thiserror::Error;

/// Errors raised by the polling pipeline.
///
/// Transport errors are split by side (gateway fetch vs. ingestion push) so
/// the daemon can log which collaborator failed; all of them are recovered at
/// the cycle level and only the consecutive-error threshold is fatal.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Gateway unreachable: {0}")]
    UpstreamUnavailable(String),

    #[error("Gateway request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Gateway request failed with status {status}: {message}")]
    UpstreamError { status: u16, message: String },

    #[error("Ingestion API unreachable: {0}")]
    DownstreamUnavailable(String),

    #[error("Ingestion request timed out: {0}")]
    DownstreamTimeout(String),

    #[error("Ingestion request failed with status {status}: {message}")]
    DownstreamError { status: u16, message: String },

    #[error("Malformed session record: {0}")]
    MalformedSession(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Whether this error counts against the daemon's consecutive-error
    /// threshold. Malformed sessions are recovered per record, not per cycle.
    pub fn is_cycle_failure(&self) -> bool {
        !matches!(self, BridgeError::MalformedSession(_))
    }
}

impl From<config::ConfigError> for BridgeError {
    fn from(err: config::ConfigError) -> Self {
        BridgeError::Config(err.to_string())
    }
}
