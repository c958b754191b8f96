//! Daemon loop integration: scripted source and sink driving full cycles.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use telebridge::config::BridgeConfig;
use telebridge::daemon::{PollingDaemon, RunOutcome};
use telebridge::error::BridgeError;
use telebridge::gateway::SessionSource;
use telebridge::ingest::EventSink;
use telebridge::mapper::TelemetryEvent;
use telebridge::session::{Session, SessionKind};
use tokio::sync::Notify;

fn session(id: &str, kind: SessionKind, idle_mins: i64, tokens: u64) -> Session {
    Session {
        session_id: id.to_string(),
        kind,
        agent_id: None,
        label: None,
        channel: None,
        updated_at: (Utc::now() - Duration::minutes(idle_mins)).timestamp_millis(),
        input_tokens: tokens,
        output_tokens: 0,
        status: "active".to_string(),
        model: "unknown".to_string(),
        context_used_pct: 0,
    }
}

/// Returns each scripted response once, then empty lists.
struct ScriptedSource {
    responses: Mutex<VecDeque<Result<Vec<Session>, BridgeError>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(responses: Vec<Result<Vec<Session>, BridgeError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionSource for ScriptedSource {
    async fn fetch_sessions(&self, _limit: usize) -> Result<Vec<Session>, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Fails every fetch, for error-threshold tests.
struct FailingSource {
    calls: AtomicUsize,
}

#[async_trait]
impl SessionSource for FailingSource {
    async fn fetch_sessions(&self, _limit: usize) -> Result<Vec<Session>, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(BridgeError::UpstreamTimeout("deadline exceeded".to_string()))
    }
}

/// Records successful batches; consumes scripted failures first.
struct RecordingSink {
    batches: Mutex<Vec<Vec<TelemetryEvent>>>,
    failures: Mutex<VecDeque<Result<(), BridgeError>>>,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Self::with_script(Vec::new())
    }

    fn with_script(script: Vec<Result<(), BridgeError>>) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
            failures: Mutex::new(script.into_iter().collect()),
        })
    }

    fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    fn pushed_session_ids(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|event| event.session_id.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn push_events(&self, events: &[TelemetryEvent]) -> Result<usize, BridgeError> {
        if let Some(result) = self.failures.lock().unwrap().pop_front() {
            result?;
        }
        self.batches.lock().unwrap().push(events.to_vec());
        Ok(events.len())
    }
}

fn config() -> BridgeConfig {
    BridgeConfig::default()
}

#[tokio::test]
async fn mixed_kinds_scenario_pushes_only_fresh_main_sessions() {
    let source = ScriptedSource::new(vec![Ok(vec![
        session("m-1", SessionKind::Main, 1, 100),
        session("cron-1", SessionKind::Cron, 0, 5_000),
        session("m-2", SessionKind::Main, 5, 50),
        session("stale", SessionKind::Main, 40, 5_000),
        session("m-3", SessionKind::Main, 10, 20),
    ])]);
    let sink = RecordingSink::new();
    let mut daemon = PollingDaemon::new(config(), source.clone(), sink.clone()).unwrap();

    let outcome = daemon.run(true, Arc::new(Notify::new())).await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(sink.batch_sizes(), vec![3]);
    assert_eq!(sink.pushed_session_ids(), vec!["m-1", "m-2", "m-3"]);
    assert_eq!(daemon.state().seen.len(), 3);
    assert_eq!(daemon.state().polls, 1);
    assert_eq!(daemon.state().consecutive_errors, 0);
}

#[tokio::test]
async fn fetch_timeout_ends_cycle_without_pushing() {
    let source = ScriptedSource::new(vec![Err(BridgeError::UpstreamTimeout(
        "deadline exceeded".to_string(),
    ))]);
    let sink = RecordingSink::new();
    let mut daemon = PollingDaemon::new(config(), source.clone(), sink.clone()).unwrap();

    let outcome = daemon.run(true, Arc::new(Notify::new())).await;

    // single-shot stops after its one cycle even when that cycle failed
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(daemon.state().consecutive_errors, 1);
    assert!(daemon.state().seen.is_empty());
    assert_eq!(daemon.state().polls, 0);
    assert!(sink.batch_sizes().is_empty());
}

#[tokio::test]
async fn large_cycle_splits_into_capped_batches() {
    let sessions: Vec<Session> = (0..7)
        .map(|i| session(&format!("s-{i}"), SessionKind::Main, 0, 100))
        .collect();
    let source = ScriptedSource::new(vec![Ok(sessions)]);
    let sink = RecordingSink::new();
    let cfg = BridgeConfig {
        batch_size: 3,
        ..config()
    };
    let mut daemon = PollingDaemon::new(cfg, source, sink.clone()).unwrap();

    let outcome = daemon.run(true, Arc::new(Notify::new())).await;

    assert_eq!(outcome, RunOutcome::Completed);
    // ceil(7 / 3) pushes, none larger than the cap, union covers everything
    assert_eq!(sink.batch_sizes(), vec![3, 3, 1]);
    let ids = sink.pushed_session_ids();
    assert_eq!(ids.len(), 7);
    assert_eq!(
        ids,
        (0..7).map(|i| format!("s-{i}")).collect::<Vec<_>>()
    );
    assert_eq!(daemon.state().seen.len(), 7);
}

#[tokio::test]
async fn re_presented_sessions_are_not_re_ingested() {
    let batch = vec![
        session("a", SessionKind::Main, 0, 100),
        session("b", SessionKind::Subagent, 0, 100),
        session("c", SessionKind::Group, 0, 100),
    ];
    let source = ScriptedSource::new(vec![Ok(batch.clone()), Ok(batch)]);
    let sink = RecordingSink::new();
    let mut daemon = PollingDaemon::new(config(), source, sink.clone()).unwrap();

    let first = daemon.run(true, Arc::new(Notify::new())).await;
    let second = daemon.run(true, Arc::new(Notify::new())).await;

    assert_eq!(first, RunOutcome::Completed);
    assert_eq!(second, RunOutcome::Completed);
    assert_eq!(sink.batch_sizes(), vec![3]);
    assert_eq!(daemon.state().seen.len(), 3);
    assert_eq!(daemon.state().polls, 2);
}

#[tokio::test(start_paused = true)]
async fn error_threshold_stops_the_daemon() {
    let source = Arc::new(FailingSource {
        calls: AtomicUsize::new(0),
    });
    let sink = RecordingSink::new();
    let cfg = BridgeConfig {
        max_errors: 3,
        poll_interval_secs: 1,
        ..config()
    };
    let mut daemon = PollingDaemon::new(cfg, source.clone(), sink.clone()).unwrap();

    let outcome = daemon.run(false, Arc::new(Notify::new())).await;

    assert_eq!(outcome, RunOutcome::ErrorLimit);
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    assert_eq!(daemon.state().consecutive_errors, 3);
    assert!(sink.batch_sizes().is_empty());
}

#[tokio::test]
async fn failed_batch_is_retried_next_cycle() {
    let sessions: Vec<Session> = (0..5)
        .map(|i| session(&format!("s-{i}"), SessionKind::Main, 0, 100))
        .collect();
    let source = ScriptedSource::new(vec![Ok(sessions.clone()), Ok(sessions)]);
    // first batch lands, second batch of the cycle fails
    let sink = RecordingSink::with_script(vec![
        Ok(()),
        Err(BridgeError::DownstreamError {
            status: 503,
            message: "overloaded".to_string(),
        }),
    ]);
    let cfg = BridgeConfig {
        batch_size: 3,
        ..config()
    };
    let mut daemon = PollingDaemon::new(cfg, source, sink.clone()).unwrap();

    let first = daemon.run(true, Arc::new(Notify::new())).await;
    assert_eq!(first, RunOutcome::Completed);
    assert_eq!(daemon.state().consecutive_errors, 1);
    assert_eq!(daemon.state().seen.len(), 3);
    assert_eq!(sink.pushed_session_ids(), vec!["s-0", "s-1", "s-2"]);
    // the confirmed batch counts as a poll and stamps last_poll even
    // though the cycle as a whole failed
    assert_eq!(daemon.state().polls, 1);
    assert!(daemon.state().last_poll.is_some());

    // next cycle only the unmarked sessions are re-sent
    let second = daemon.run(true, Arc::new(Notify::new())).await;
    assert_eq!(second, RunOutcome::Completed);
    assert_eq!(daemon.state().consecutive_errors, 0);
    assert_eq!(daemon.state().seen.len(), 5);
    assert_eq!(daemon.state().polls, 2);
    assert_eq!(
        sink.pushed_session_ids(),
        vec!["s-0", "s-1", "s-2", "s-3", "s-4"]
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_signal_interrupts_at_sleep_boundary() {
    let source = ScriptedSource::new(vec![Ok(Vec::new())]);
    let sink = RecordingSink::new();
    let mut daemon = PollingDaemon::new(config(), source.clone(), sink).unwrap();

    let shutdown = Arc::new(Notify::new());
    // permit buffered before the loop reaches its sleep
    shutdown.notify_one();
    let outcome = daemon.run(false, shutdown).await;

    assert_eq!(outcome, RunOutcome::Interrupted);
    assert_eq!(source.calls(), 1);
}
