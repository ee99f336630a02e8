//! External publish sink.

use {
    async_trait::async_trait,
    tracing::{debug, warn},
};

use bloom_extensions::{Error, Result};

/// Fire-and-forget sink for published content. No retries, no delivery
/// confirmation.
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, url: &str, content: &str, source_key: Option<&str>) -> Result<()>;
}

/// HTTP sink posting JSON to the configured endpoint.
#[derive(Default)]
pub struct HttpSink {
    client: reqwest::Client,
}

impl HttpSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PublishSink for HttpSink {
    async fn publish(&self, url: &str, content: &str, source_key: Option<&str>) -> Result<()> {
        let body = serde_json::json!({
            "content": content,
            "source_key": source_key,
        });

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::external("publish request failed", e))?;

        // Best-effort forward: a non-success status is logged, never retried.
        if response.status().is_success() {
            debug!(url, "published content");
        } else {
            warn!(url, status = %response.status(), "publish endpoint returned an error");
        }
        Ok(())
    }
}
