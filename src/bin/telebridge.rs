//! Telebridge daemon binary.
//!
//! Loads layered configuration, initializes logging, wires the HTTP clients
//! into the polling daemon, and maps the run outcome to an exit code:
//! 0 for completion or interrupted shutdown, 1 for startup failure, 2 when
//! the consecutive-error threshold stopped the daemon.

use clap::Parser;
use std::process;
use std::sync::Arc;
use telebridge::cli::Cli;
use telebridge::config::{BridgeConfig, ConfigLoader};
use telebridge::daemon::{PollingDaemon, RunOutcome};
use telebridge::error::BridgeError;
use telebridge::gateway::HttpSessionFetcher;
use telebridge::ingest::HttpIngestClient;
use telebridge::logging::init_logging;
use tokio::sync::Notify;
use tracing::{info, warn};

fn main() {
    let cli = Cli::parse();

    let mut config = match ConfigLoader::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };
    cli.apply_overrides(&mut config);

    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        process::exit(1);
    }

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let code = match run(config, cli.once) {
        Ok(RunOutcome::Completed) | Ok(RunOutcome::Interrupted) => 0,
        Ok(RunOutcome::ErrorLimit) => 2,
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    };
    process::exit(code);
}

#[tokio::main]
async fn run(config: BridgeConfig, once: bool) -> Result<RunOutcome, BridgeError> {
    let fetcher = HttpSessionFetcher::new(config.upstream_base(), config.request_timeout())?;
    let ingest = HttpIngestClient::new(config.downstream_base(), config.request_timeout())?;
    let mut daemon = PollingDaemon::new(config, Arc::new(fetcher), Arc::new(ingest))?;

    let shutdown = Arc::new(Notify::new());
    let signal_target = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            // notify_one buffers a permit, so a signal arriving mid-cycle
            // is honored at the next sleep boundary.
            Ok(()) => {
                info!("Interrupt received");
                signal_target.notify_one();
            }
            Err(e) => warn!(error = %e, "Failed to listen for interrupt signal"),
        }
    });

    Ok(daemon.run(once, shutdown).await)
}
