//! Session filtering and dedup bookkeeping.
//!
//! Four independent rules decide whether a fetched session is ingested: kind
//! allow-list, recency window, token floor, and the seen-set. The first three
//! are pure predicates over a session and an evaluation instant; the seen-set
//! is cross-poll memory owned by the daemon and only written after a
//! confirmed push.

use crate::config::DedupPolicy;
use crate::session::{Session, SessionKind};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Tunable thresholds for the pure filter rules.
#[derive(Debug, Clone, Copy)]
pub struct FilterPolicy {
    /// Sessions idle longer than this are stale.
    pub recency_window: Duration,
    /// Sessions below this combined token count are noise.
    pub min_tokens: u64,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            recency_window: Duration::minutes(30),
            min_tokens: 10,
        }
    }
}

/// Only real execution kinds are ingested; `cron` is internal monitoring
/// noise and unrecognized kinds are treated the same way.
pub fn kind_allowed(kind: SessionKind) -> bool {
    matches!(
        kind,
        SessionKind::Main | SessionKind::Subagent | SessionKind::Group
    )
}

/// Whether all three pure rules pass for this session at `now`.
pub fn survives(session: &Session, now: DateTime<Utc>, policy: &FilterPolicy) -> bool {
    if !kind_allowed(session.kind) {
        return false;
    }
    if now.signed_duration_since(session.last_activity()) > policy.recency_window {
        return false;
    }
    session.total_tokens() >= policy.min_tokens
}

/// Dedup memory of previously ingested session identifiers.
///
/// Entries record when the identifier was last marked, so the `window`
/// policy can expire them; the `permanent` policy ignores the timestamps.
#[derive(Debug)]
pub struct SeenSet {
    policy: DedupPolicy,
    window: Duration,
    entries: HashMap<String, DateTime<Utc>>,
}

impl SeenSet {
    pub fn new(policy: DedupPolicy, window: Duration) -> Self {
        Self {
            policy,
            window,
            entries: HashMap::new(),
        }
    }

    /// Whether this identifier is considered already ingested at `now`.
    pub fn contains(&self, session_id: &str, now: DateTime<Utc>) -> bool {
        match self.policy {
            DedupPolicy::Permanent => self.entries.contains_key(session_id),
            DedupPolicy::Window => self
                .entries
                .get(session_id)
                .map(|marked| now.signed_duration_since(*marked) <= self.window)
                .unwrap_or(false),
        }
    }

    /// Record an identifier as ingested. Called only after a confirmed push.
    pub fn mark(&mut self, session_id: &str, now: DateTime<Utc>) {
        self.entries.insert(session_id.to_string(), now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Apply all four rules, preserving fetch order among survivors.
pub fn filter_sessions<'a>(
    sessions: &'a [Session],
    seen: &SeenSet,
    now: DateTime<Utc>,
    policy: &FilterPolicy,
) -> Vec<&'a Session> {
    sessions
        .iter()
        .filter(|session| survives(session, now, policy) && !seen.contains(&session.session_id, now))
        .collect()
}
