//! Session records as reported by the upstream gateway.
//!
//! The gateway speaks camelCase JSON; unknown fields are ignored so a newer
//! gateway does not break the bridge. Session identifiers are stable across
//! polls for the same underlying execution.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Session kind reported by the gateway.
///
/// `cron` sessions are internal monitoring noise and are never ingested;
/// kinds this bridge does not recognize are treated the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Main,
    Subagent,
    Group,
    Cron,
    #[serde(other)]
    Unknown,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Main => "main",
            SessionKind::Subagent => "subagent",
            SessionKind::Group => "group",
            SessionKind::Cron => "cron",
            SessionKind::Unknown => "unknown",
        }
    }
}

fn default_kind() -> SessionKind {
    SessionKind::Unknown
}

fn default_model() -> String {
    "unknown".to_string()
}

fn default_status() -> String {
    "active".to_string()
}

/// One active execution context as listed by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,

    #[serde(default = "default_kind")]
    pub kind: SessionKind,

    /// Optional agent identifier; falls back to the session id downstream.
    #[serde(default)]
    pub agent_id: Option<String>,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub channel: Option<String>,

    /// Last activity, epoch milliseconds.
    #[serde(default)]
    pub updated_at: i64,

    #[serde(default)]
    pub input_tokens: u64,

    #[serde(default)]
    pub output_tokens: u64,

    #[serde(default = "default_status")]
    pub status: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub context_used_pct: u8,
}

impl Session {
    /// Combined token volume, used by the noise floor filter.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Last activity as a UTC instant. Out-of-range timestamps clamp to the
    /// epoch, which the recency filter then rejects as stale.
    pub fn last_activity(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.updated_at)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Gateway list responses come either as a bare array or wrapped in an
/// object with a `sessions` key; accept both.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SessionListResponse {
    Wrapped { sessions: Vec<Session> },
    Bare(Vec<Session>),
}

impl SessionListResponse {
    pub fn into_sessions(self) -> Vec<Session> {
        match self {
            SessionListResponse::Wrapped { sessions } => sessions,
            SessionListResponse::Bare(sessions) => sessions,
        }
    }
}
