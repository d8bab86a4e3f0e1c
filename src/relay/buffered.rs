//! Buffered relay for the single-shot completion provider.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::header;
use bytes::Bytes;
use reqwest::Client;

use super::normalize::{extract_answer, normalize_body, snippet};
use super::{Relay, RelayStream};
use crate::adapter::{CompletionRequest, OutboundRequest};
use crate::config::{ApiKey, CompletionConfig, ConfigError, OPENROUTER_KEY_VAR};
use crate::error::{Error, Result};

/// Posts one completion request and relays the answer as a single chunk.
pub struct CompletionRelay {
    client: Client,
    url: String,
    api_key: ApiKey,
    timeout: Duration,
}

impl CompletionRelay {
    pub fn from_config(
        settings: &CompletionConfig,
        client: Client,
        timeout: Duration,
    ) -> std::result::Result<Self, ConfigError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingCredential {
                provider: "completion".to_string(),
                var: OPENROUTER_KEY_VAR.to_string(),
            })?;

        Ok(Self {
            client,
            url: settings.url.clone(),
            api_key,
            timeout,
        })
    }

    /// Send the request and turn the payload into the answer text.
    async fn fetch_answer(&self, request: &CompletionRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url = %self.url, "Failed to reach completion provider");
                Error::Upstream(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            // Read for the log only; an error body is never parsed.
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                body = %snippet(&body),
                "Completion provider returned error"
            );
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                body: snippet(&body).to_string(),
            });
        }

        let raw = response.text().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to read completion provider body");
            Error::Upstream(e)
        })?;
        tracing::debug!(bytes = raw.len(), body = %snippet(&raw), "Completion provider responded");

        let normalized = normalize_body(&raw);
        let payload: serde_json::Value = serde_json::from_str(&normalized).map_err(|e| {
            tracing::error!(error = %e, raw = %snippet(&normalized), "Failed to parse provider response");
            Error::UpstreamFormat {
                raw: snippet(&normalized).to_string(),
            }
        })?;

        Ok(extract_answer(&payload))
    }
}

#[async_trait]
impl Relay for CompletionRelay {
    fn name(&self) -> &'static str {
        "completion"
    }

    async fn relay(&self, request: OutboundRequest) -> Result<RelayStream> {
        let OutboundRequest::Completion(request) = request else {
            return Err(Error::Internal(
                "completion relay received a chat request".to_string(),
            ));
        };

        tracing::info!(
            model = %request.model,
            prompt_chars = request.prompt.len(),
            "Sending completion request"
        );

        let answer = tokio::time::timeout(self.timeout, self.fetch_answer(&request))
            .await
            .map_err(|_| {
                tracing::error!(timeout = ?self.timeout, "Completion provider did not answer in time");
                Error::Timeout
            })??;

        Ok(Box::pin(futures::stream::once(async move {
            Ok(Bytes::from(answer))
        })))
    }
}
