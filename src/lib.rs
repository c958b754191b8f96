//! Telebridge: gateway-to-ingestion telemetry bridge
//!
//! Polls an agent-orchestration gateway for active execution sessions,
//! filters and deduplicates them, maps survivors into normalized telemetry
//! events, and pushes batches to an ingestion API.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod ingest;
pub mod logging;
pub mod mapper;
pub mod session;
