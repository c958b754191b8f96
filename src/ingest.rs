//! Ingestion client: bulk-pushes telemetry events downstream.
//!
//! One bulk request per batch; the daemon caps batch sizes and splits larger
//! cycles into sequential pushes. The `EventSink` trait mirrors
//! `SessionSource` as the injectable seam for tests.

use crate::error::BridgeError;
use crate::mapper::TelemetryEvent;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const INGEST_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Destination for normalized telemetry events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Push one non-empty batch; returns the count accepted downstream.
    async fn push_events(&self, events: &[TelemetryEvent]) -> Result<usize, BridgeError>;
}

#[derive(Debug, Deserialize)]
struct IngestResponse {
    accepted: usize,
}

/// HTTP implementation against the ingestion API's bulk endpoint.
pub struct HttpIngestClient {
    client: Client,
    base_url: String,
}

impl HttpIngestClient {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, BridgeError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(INGEST_CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to create HTTP client: {}", e)))?;
        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn map_push_error(error: reqwest::Error) -> BridgeError {
    if error.is_timeout() {
        BridgeError::DownstreamTimeout(error.to_string())
    } else if let Some(status) = error.status() {
        BridgeError::DownstreamError {
            status: status.as_u16(),
            message: error.to_string(),
        }
    } else {
        BridgeError::DownstreamUnavailable(error.to_string())
    }
}

#[async_trait]
impl EventSink for HttpIngestClient {
    async fn push_events(&self, events: &[TelemetryEvent]) -> Result<usize, BridgeError> {
        if events.is_empty() {
            return Ok(0);
        }

        let url = format!("{}/api/events/bulk", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&events)
            .send()
            .await
            .map_err(map_push_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BridgeError::DownstreamError {
                status: status.as_u16(),
                message,
            });
        }

        // An empty or unparseable success body counts the whole batch as
        // accepted; a successful status already confirms delivery.
        match response.json::<IngestResponse>().await {
            Ok(body) => Ok(body.accepted),
            Err(e) => {
                debug!(error = %e, "Ingest response had no accepted count");
                Ok(events.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let client =
            HttpIngestClient::new("http://localhost:8765/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, "http://localhost:8765");
    }

    #[test]
    fn ingest_response_parses_accepted_count() {
        let body: IngestResponse = serde_json::from_str(r#"{"accepted": 7}"#).unwrap();
        assert_eq!(body.accepted, 7);
    }
}
