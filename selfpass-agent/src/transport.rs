use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, SelfpassError};

/// Request/response carrier to the credential server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a JSON body to `url` and return the response body.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>>;
}

/// HTTPS transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("selfpass-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        debug!("POST {} ({} bytes)", url, body.len());

        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SelfpassError::Transport(format!(
                "{} returned {}: {}",
                url, status, text
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
