// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Batch delivery to the remote collector

use async_trait::async_trait;
use beacon_core::AgentConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use std::time::Duration;
use thiserror::Error;

/// Why a delivery attempt failed. Both variants are handled the same way:
/// persist and retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("collector responded with HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),
}

/// One network attempt to deliver an encoded batch.
///
/// Timeouts are the implementation's responsibility; the flush cycle awaits
/// whatever this returns.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, body: Vec<u8>) -> Result<(), TransportError>;
}

/// POSTs batches as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            headers: HeaderMap::new(),
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, TransportError> {
        Self::new(config.endpoint.clone(), config.request_timeout())
    }

    /// Attach an extra header to every request.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, TransportError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Request(format!("invalid header name: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Request(format!("invalid header value: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, body: Vec<u8>) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_posts_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/collect")
            .match_header("content-type", "application/json")
            .match_header("x-beacon-client", "test")
            .match_body(r#"{"events":[{"type":"click","data":"btn1"}]}"#)
            .with_status(200)
            .create_async()
            .await;

        let transport = HttpTransport::new(format!("{}/collect", server.url()), Duration::from_secs(5))
            .unwrap()
            .with_header("x-beacon-client", "test")
            .unwrap();

        let body = br#"{"events":[{"type":"click","data":"btn1"}]}"#.to_vec();
        assert_eq!(transport.send(body).await, Ok(()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(503)
            .create_async()
            .await;

        let transport = HttpTransport::new(server.url(), Duration::from_secs(5)).unwrap();
        assert_eq!(
            transport.send(b"{}".to_vec()).await,
            Err(TransportError::Status(503))
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_request_error() {
        // Port 9 (discard) on localhost is not expected to accept HTTP
        let transport = HttpTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let result = transport.send(b"{}".to_vec()).await;
        assert!(matches!(result, Err(TransportError::Request(_))));
    }

    #[test]
    fn test_rejects_invalid_header() {
        let transport = HttpTransport::new("http://localhost", Duration::from_secs(1)).unwrap();
        assert!(transport.with_header("bad header", "x").is_err());
    }
}
