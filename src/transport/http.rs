//! HTTP binding of the publish/subscribe transport.
//!
//! A topic is published with `POST {endpoint}/publish/{topic}`; liveness is
//! checked with `GET {endpoint}/health`. The async `reqwest` client is driven
//! from the producer's synchronous loop through a private current-thread
//! runtime, so call this from a plain thread (or `spawn_blocking`), never
//! from inside an async task.

use crate::transport::{Transport, TransportError};
use std::time::Duration;

/// Default bound on connect and publish calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A [`Transport`] speaking to the gateway server over HTTP.
pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    connected: bool,
}

impl HttpTransport {
    /// Create a transport for `endpoint` (e.g. `http://127.0.0.1:7878`).
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connect(format!("Failed to create HTTP client: {e}")))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::Connect(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
            runtime,
            connected: false,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get the health check URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.endpoint)
    }

    /// Get the publish URL for a topic.
    pub fn publish_url(&self, topic: &str) -> String {
        format!("{}/publish/{}", self.endpoint, topic.trim_start_matches('/'))
    }
}

impl Transport for HttpTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        let url = self.health_url();
        let client = self.client.clone();
        let result = self.runtime.block_on(async move { client.get(url).send().await });

        let response = result.map_err(|e| {
            self.connected = false;
            TransportError::Connect(e.to_string())
        })?;

        if !response.status().is_success() {
            self.connected = false;
            return Err(TransportError::Connect(format!(
                "Health check returned {}",
                response.status()
            )));
        }

        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let url = self.publish_url(topic);
        let client = self.client.clone();
        let body = payload.to_vec();

        self.runtime.block_on(async move {
            let response = client
                .post(url)
                .header("Content-Type", "application/json")
                .body(body)
                .send()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(TransportError::Refused {
                    status: status.as_u16(),
                    message,
                });
            }
            Ok(())
        })
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let transport = HttpTransport::new("http://127.0.0.1:7878/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(transport.endpoint(), "http://127.0.0.1:7878");
        assert_eq!(transport.health_url(), "http://127.0.0.1:7878/health");
        assert_eq!(
            transport.publish_url("vitals/readings"),
            "http://127.0.0.1:7878/publish/vitals/readings"
        );
    }

    #[test]
    fn test_publish_requires_connection() {
        let mut transport = HttpTransport::new("http://127.0.0.1:9", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(
            transport.publish("vitals/readings", b"{}"),
            Err(TransportError::NotConnected)
        );
    }

    #[test]
    fn test_connect_to_closed_port_fails() {
        let mut transport =
            HttpTransport::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(matches!(transport.connect(), Err(TransportError::Connect(_))));
        assert!(!transport.is_connected());
    }
}
