//! Session to telemetry event mapping.
//!
//! Pure conversion of one surviving session into one normalized telemetry
//! event in the ingestion API schema. Mapping must not fail for anything the
//! filter passed; the only defect it reports is a session without an
//! identifier, which the daemon skips without aborting the cycle.

use crate::error::BridgeError;
use crate::session::Session;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Event type emitted by this pipeline. Completion/error classification is a
/// downstream concern; the bridge only reports executions.
pub const EVENT_TYPE_EXECUTION: &str = "execution";

static TRACE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique trace id. Fresh per event, never reused across polls.
pub fn new_trace_id() -> String {
    let ts = Utc::now().timestamp_millis();
    let pid = std::process::id();
    let seq = TRACE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("trace-{ts}-{pid}-{seq}")
}

/// Session context carried alongside each event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub kind: String,
    pub label: Option<String>,
    pub channel: Option<String>,
    pub context_used_pct: u8,
}

/// Normalized record pushed to the ingestion API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub agent_name: String,
    pub agent_id: String,
    pub event_type: String,
    pub trace_id: String,
    pub session_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub model: String,
    pub status: String,
    pub metadata: EventMetadata,
    /// ISO-8601 UTC, millisecond precision. Emission time, not the
    /// session's last activity.
    pub timestamp: String,
}

/// Convert one session into one telemetry event, stamped at `now`.
pub fn map_session(session: &Session, now: DateTime<Utc>) -> Result<TelemetryEvent, BridgeError> {
    if session.session_id.trim().is_empty() {
        return Err(BridgeError::MalformedSession(
            "session has no identifier".to_string(),
        ));
    }

    let agent_id = session
        .agent_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or(&session.session_id)
        .to_string();

    Ok(TelemetryEvent {
        agent_name: infer_agent_name(session, &agent_id),
        agent_id,
        event_type: EVENT_TYPE_EXECUTION.to_string(),
        trace_id: new_trace_id(),
        session_id: session.session_id.clone(),
        input_tokens: session.input_tokens,
        output_tokens: session.output_tokens,
        model: session.model.clone(),
        status: session.status.clone(),
        metadata: EventMetadata {
            kind: session.kind.as_str().to_string(),
            label: session.label.clone(),
            channel: session.channel.clone(),
            context_used_pct: session.context_used_pct,
        },
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// Readable agent name from the session label: strip a `namespace:` prefix
/// and a `--qualifier` suffix, falling back to the agent id.
fn infer_agent_name(session: &Session, agent_id: &str) -> String {
    if let Some(label) = session.label.as_deref() {
        let name = label.split_once(':').map(|(_, rest)| rest).unwrap_or(label);
        let name = name.split("--").next().unwrap_or(name).trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    agent_id.to_string()
}
