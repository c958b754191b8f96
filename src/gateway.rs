//! Gateway client: lists active sessions from the upstream orchestrator.
//!
//! The daemon only ever consumes the session-list endpoint; there is no
//! analysis or per-session follow-up call. The `SessionSource` trait is the
//! seam the daemon's tests use to inject scripted sessions.

use crate::error::BridgeError;
use crate::session::{Session, SessionListResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const GATEWAY_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of currently active sessions.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Fetch up to `limit` sessions, in the gateway's reported order.
    /// Must not mutate any daemon state.
    async fn fetch_sessions(&self, limit: usize) -> Result<Vec<Session>, BridgeError>;
}

/// HTTP implementation against the gateway's `/api/sessions` endpoint.
pub struct HttpSessionFetcher {
    client: Client,
    base_url: String,
}

impl HttpSessionFetcher {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, BridgeError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(GATEWAY_CONNECT_TIMEOUT)
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

fn map_fetch_error(error: reqwest::Error) -> BridgeError {
    if error.is_timeout() {
        BridgeError::UpstreamTimeout(error.to_string())
    } else if let Some(status) = error.status() {
        BridgeError::UpstreamError {
            status: status.as_u16(),
            message: error.to_string(),
        }
    } else {
        BridgeError::UpstreamUnavailable(error.to_string())
    }
}

#[async_trait]
impl SessionSource for HttpSessionFetcher {
    async fn fetch_sessions(&self, limit: usize) -> Result<Vec<Session>, BridgeError> {
        let url = format!("{}/api/sessions", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(map_fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BridgeError::UpstreamError {
                status: status.as_u16(),
                message,
            });
        }

        let payload: SessionListResponse = response.json().await.map_err(|e| {
            BridgeError::UpstreamError {
                status: status.as_u16(),
                message: format!("Invalid session list payload: {}", e),
            }
        })?;

        Ok(payload.into_sessions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let fetcher =
            HttpSessionFetcher::new("http://localhost:18789/", Duration::from_secs(5)).unwrap();
        assert_eq!(fetcher.base_url, "http://localhost:18789");
    }
}
