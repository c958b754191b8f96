//! Polling daemon: fetch, filter, map, push, bookkeeping.
//!
//! One logical thread of control drives the loop; a cycle runs to completion
//! before the next begins and `DaemonState` is owned exclusively by the
//! daemon, so no locking is needed. The inter-cycle sleep races against a
//! shutdown `Notify`, making cancellation a first-class interrupt at the
//! sleep boundary without aborting an in-flight request.

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::filter::{self, FilterPolicy, SeenSet};
use crate::gateway::SessionSource;
use crate::ingest::EventSink;
use crate::mapper;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Cross-poll memory. Created empty at daemon start, mutated only between
/// cycles, discarded on exit; dedup memory does not survive a restart.
#[derive(Debug)]
pub struct DaemonState {
    /// Identifiers of sessions whose events were confirmed pushed.
    pub seen: SeenSet,
    /// Failure streak; reset by any successful push or clean cycle.
    pub consecutive_errors: u32,
    /// Wall-clock time of the last confirmed push or clean cycle.
    pub last_poll: Option<DateTime<Utc>>,
    /// Count of cycles that completed or pushed at least one batch.
    pub polls: u64,
    /// Events accepted downstream over the process lifetime.
    pub total_events: u64,
}

impl DaemonState {
    fn new(config: &BridgeConfig) -> Self {
        Self {
            seen: SeenSet::new(config.dedup, config.recency_window()),
            consecutive_errors: 0,
            last_poll: None,
            polls: 0,
            total_events: 0,
        }
    }
}

/// Counters for one completed cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleReport {
    pub fetched: usize,
    pub filtered: usize,
    pub mapped: usize,
    pub pushed: usize,
    pub batches: usize,
}

/// Why the daemon stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Single-shot mode finished its cycle.
    Completed,
    /// Stop signal honored at the sleep boundary.
    Interrupted,
    /// Consecutive-error threshold reached; a supervisor must restart us.
    ErrorLimit,
}

/// Orchestrator for the fetch → filter → map → push loop.
pub struct PollingDaemon {
    config: BridgeConfig,
    policy: FilterPolicy,
    source: Arc<dyn SessionSource>,
    sink: Arc<dyn EventSink>,
    state: DaemonState,
}

impl PollingDaemon {
    /// Build a daemon over the given source and sink. The configuration is
    /// validated here, once.
    pub fn new(
        config: BridgeConfig,
        source: Arc<dyn SessionSource>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let policy = FilterPolicy {
            recency_window: config.recency_window(),
            min_tokens: config.min_tokens,
        };
        let state = DaemonState::new(&config);
        Ok(Self {
            config,
            policy,
            source,
            sink,
            state,
        })
    }

    pub fn state(&self) -> &DaemonState {
        &self.state
    }

    /// Run the polling loop until single-shot completion, shutdown, or the
    /// error threshold.
    pub async fn run(&mut self, single_shot: bool, shutdown: Arc<Notify>) -> RunOutcome {
        info!(
            upstream = %self.config.upstream_url,
            downstream = %self.config.downstream_url,
            interval_secs = self.config.poll_interval_secs,
            single_shot,
            "Polling daemon starting"
        );

        let mut cycle: u64 = 0;
        let outcome = loop {
            cycle += 1;
            let started = Instant::now();
            match self.run_cycle().await {
                Ok(report) => {
                    self.state.consecutive_errors = 0;
                    self.state.last_poll = Some(Utc::now());
                    self.state.polls += 1;
                    info!(
                        cycle,
                        fetched = report.fetched,
                        filtered = report.filtered,
                        mapped = report.mapped,
                        pushed = report.pushed,
                        batches = report.batches,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Poll cycle complete"
                    );
                }
                Err(err) => {
                    self.state.consecutive_errors += 1;
                    warn!(
                        cycle,
                        error = %err,
                        attempt = self.state.consecutive_errors,
                        max = self.config.max_errors,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Poll cycle failed"
                    );
                    if self.state.consecutive_errors >= self.config.max_errors {
                        error!(
                            max_errors = self.config.max_errors,
                            "Consecutive error threshold reached, stopping"
                        );
                        break RunOutcome::ErrorLimit;
                    }
                }
            }

            if single_shot {
                break RunOutcome::Completed;
            }

            tokio::select! {
                _ = shutdown.notified() => {
                    info!("Shutdown requested");
                    break RunOutcome::Interrupted;
                }
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        };

        info!(
            polls = self.state.polls,
            total_events = self.state.total_events,
            "Daemon stopped"
        );
        outcome
    }

    /// One cycle: fetch, filter against the current seen-set, map survivors,
    /// push in size-bounded batches. Identifiers are marked seen strictly
    /// after their batch is confirmed pushed, so a failed push is retried
    /// next cycle.
    async fn run_cycle(&mut self) -> Result<CycleReport, BridgeError> {
        let mut report = CycleReport::default();

        let sessions = self.source.fetch_sessions(self.config.page_size).await?;
        report.fetched = sessions.len();

        let now = Utc::now();
        let survivors = filter::filter_sessions(&sessions, &self.state.seen, now, &self.policy);
        report.filtered = survivors.len();

        let mut events = Vec::with_capacity(survivors.len());
        let mut session_ids = Vec::with_capacity(survivors.len());
        for session in survivors {
            match mapper::map_session(session, Utc::now()) {
                Ok(event) => {
                    session_ids.push(session.session_id.clone());
                    events.push(event);
                }
                Err(err) => {
                    warn!(session_id = %session.session_id, error = %err, "Skipping session");
                }
            }
        }
        report.mapped = events.len();

        for (batch, ids) in events
            .chunks(self.config.batch_size)
            .zip(session_ids.chunks(self.config.batch_size))
        {
            let accepted = match self.sink.push_events(batch).await {
                Ok(accepted) => accepted,
                Err(err) => {
                    // a cycle that landed at least one batch still counts
                    // as a poll, even though the cycle itself failed
                    if report.batches > 0 {
                        self.state.polls += 1;
                    }
                    return Err(err);
                }
            };
            let marked_at = Utc::now();
            for id in ids {
                self.state.seen.mark(id, marked_at);
            }
            // A batch that succeeded keeps its sessions marked and its
            // bookkeeping even if a later batch in the same cycle fails.
            self.state.consecutive_errors = 0;
            self.state.last_poll = Some(marked_at);
            self.state.total_events += accepted as u64;
            report.pushed += batch.len();
            report.batches += 1;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::TelemetryEvent;
    use crate::session::Session;
    use async_trait::async_trait;

    struct EmptySource;

    #[async_trait]
    impl SessionSource for EmptySource {
        async fn fetch_sessions(&self, _limit: usize) -> Result<Vec<Session>, BridgeError> {
            Ok(Vec::new())
        }
    }

    struct CountingSink {
        pushes: std::sync::Mutex<usize>,
    }

    #[async_trait]
    impl EventSink for CountingSink {
        async fn push_events(&self, events: &[TelemetryEvent]) -> Result<usize, BridgeError> {
            *self.pushes.lock().unwrap() += 1;
            Ok(events.len())
        }
    }

    fn config() -> BridgeConfig {
        BridgeConfig::default()
    }

    #[test]
    fn new_daemon_starts_with_empty_state() {
        let daemon = PollingDaemon::new(
            config(),
            Arc::new(EmptySource),
            Arc::new(CountingSink {
                pushes: std::sync::Mutex::new(0),
            }),
        )
        .unwrap();
        let state = daemon.state();
        assert!(state.seen.is_empty());
        assert_eq!(state.consecutive_errors, 0);
        assert_eq!(state.polls, 0);
        assert!(state.last_poll.is_none());
    }

    #[test]
    fn new_daemon_rejects_invalid_config() {
        let bad = BridgeConfig {
            batch_size: 0,
            ..config()
        };
        let result = PollingDaemon::new(
            bad,
            Arc::new(EmptySource),
            Arc::new(CountingSink {
                pushes: std::sync::Mutex::new(0),
            }),
        );
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[tokio::test]
    async fn single_shot_with_no_sessions_completes_without_pushing() {
        let sink = Arc::new(CountingSink {
            pushes: std::sync::Mutex::new(0),
        });
        let mut daemon =
            PollingDaemon::new(config(), Arc::new(EmptySource), sink.clone()).unwrap();

        let outcome = daemon.run(true, Arc::new(Notify::new())).await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(*sink.pushes.lock().unwrap(), 0);
        assert_eq!(daemon.state().polls, 1);
        assert!(daemon.state().last_poll.is_some());
    }
}
