//! Transport seam — how encoded payloads leave the process
//!
//! The sender consumes transports only through [`ProbeTransport`]: a cheap
//! availability check and a single-attempt send. Any concrete transport (the
//! real HTTP client or a test fake) substitutes without touching the sender.

use std::time::Duration;

use async_trait::async_trait;

/// HTTP client timeout for collector calls
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport errors
///
/// A failed send is a recoverable value — the sender reconciles it into the
/// retention queue; nothing here escapes as a panic.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("collector returned status {0}")]
    Server(reqwest::StatusCode),
}

/// Capability contract for delivering payloads to the collector.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Cheap check whether the collector is reachable right now.
    async fn is_available(&self) -> bool;

    /// Single delivery attempt, no internal retry.
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError>;
}

/// HTTP transport to the probe collector.
pub struct HttpTransport {
    http: reqwest::Client,
    collector_url: String,
    api_key: String,
    instance_id: String,
    /// Declared encoding of the payload body
    content_encoding: &'static str,
}

impl HttpTransport {
    /// Build a transport for the given collector.
    ///
    /// `text_encoded` must match the encoding pipeline's setting so the
    /// collector knows whether the body is raw zstd or base64 text.
    pub fn new(
        collector_url: &str,
        api_key: &str,
        instance_id: &str,
        text_encoded: bool,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            http,
            collector_url: collector_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            instance_id: instance_id.to_string(),
            content_encoding: if text_encoded { "base64" } else { "zstd" },
        })
    }

    /// Collector base URL for logging.
    pub fn collector_url(&self) -> &str {
        &self.collector_url
    }
}

#[async_trait]
impl ProbeTransport for HttpTransport {
    async fn is_available(&self) -> bool {
        let health = format!("{}/health", self.collector_url);
        match self.http.get(&health).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        let resp = self
            .http
            .post(format!("{}/api/coverage", self.collector_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/octet-stream")
            .header("Content-Encoding", self.content_encoding)
            .header("X-Instance-ID", &self.instance_id)
            .body(payload.to_vec())
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::Server(resp.status()))
        }
    }
}
