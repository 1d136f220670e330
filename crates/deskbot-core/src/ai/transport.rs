//! HTTP transport seam
//!
//! The orchestrator talks to the provider through [`Transport`] so tests can
//! substitute a scripted implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::constants::ai::API_KEY_HEADER;
use crate::vault::ApiKey;

/// One POST to the provider
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub url: String,
    pub api_key: ApiKey,
    pub body: Value,
}

/// Raw provider answer; the status is not interpreted here
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: String,
}

impl ProviderResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure before any HTTP status was received
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, request: ProviderRequest) -> Result<ProviderResponse, TransportError>;
}

/// `reqwest`-backed transport
///
/// Deadlines are enforced by the caller; the client-level timeout is only a
/// backstop for connections that never complete.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, backstop: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(backstop)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(&self, request: ProviderRequest) -> Result<ProviderResponse, TransportError> {
        let response = self
            .client
            .post(&request.url)
            .header(API_KEY_HEADER, request.api_key.expose())
            .json(&request.body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::debug!(status, bytes = body.len(), "Provider responded");
        Ok(ProviderResponse { status, body })
    }
}
