//! Incremental relay for the chat-style streaming provider.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tokio::time::Instant;

use super::fragments::{forward_fragments, Fragment, FragmentSource};
use super::normalize::snippet;
use super::{Relay, RelayStream};
use crate::adapter::{ChatRequest, Content, OutboundRequest};
use crate::config::{ApiKey, ChatConfig, ConfigError, GOOGLE_KEY_VAR};
use crate::error::{Error, Result};

/// Header carrying the chat provider key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Streams replies from `{base_url}/models/{model}:streamGenerateContent`.
pub struct ChatRelay {
    client: Client,
    base_url: String,
    api_key: ApiKey,
    timeout: Duration,
}

impl ChatRelay {
    pub fn from_config(
        settings: &ChatConfig,
        client: Client,
        timeout: Duration,
    ) -> std::result::Result<Self, ConfigError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingCredential {
                provider: "chat".to_string(),
                var: GOOGLE_KEY_VAR.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }

    async fn open(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.stream_url(&request.model))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach chat provider");
                Error::Upstream(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                body = %snippet(&body),
                "Chat provider returned error"
            );
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                body: snippet(&body).to_string(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Relay for ChatRelay {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn relay(&self, request: OutboundRequest) -> Result<RelayStream> {
        let OutboundRequest::Chat(request) = request else {
            return Err(Error::Internal(
                "chat relay received a completion request".to_string(),
            ));
        };

        let deadline = Instant::now() + self.timeout;
        tracing::info!(
            model = %request.model,
            turns = request.contents.len(),
            "Opening chat provider stream"
        );

        let response = tokio::time::timeout_at(deadline, self.open(&request))
            .await
            .map_err(|_| {
                tracing::error!("Chat provider did not answer before the relay deadline");
                Error::Timeout
            })??;

        Ok(forward_fragments(GeminiFragments::new(response), deadline))
    }
}

type SseEvents =
    Pin<Box<dyn Stream<Item = std::result::Result<Event, EventStreamError<reqwest::Error>>> + Send>>;

/// Fragments read off a `streamGenerateContent?alt=sse` response body.
pub struct GeminiFragments {
    events: SseEvents,
}

impl GeminiFragments {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            events: Box::pin(response.bytes_stream().eventsource()),
        }
    }
}

#[async_trait]
impl FragmentSource for GeminiFragments {
    async fn next_fragment(&mut self) -> Option<Result<Fragment>> {
        loop {
            let event = match self.events.next().await? {
                Ok(event) => event,
                Err(e) => return Some(Err(Error::StreamAborted(e.to_string()))),
            };
            if event.data.trim().is_empty() {
                continue;
            }
            return Some(parse_chunk(&event.data).map(Fragment::new));
        }
    }
}

/// One `GenerateContentResponse` chunk.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    message: String,
}

/// Extract the text of one SSE `data:` payload.
///
/// The text is the concatenation of the first candidate's parts; a chunk
/// without text (e.g. a final chunk carrying only `finishReason`) yields an
/// empty string. Unparseable chunks, in-stream errors, and blocked prompts
/// abort the stream.
pub fn parse_chunk(data: &str) -> Result<String> {
    let chunk: GenerateContentChunk = serde_json::from_str(data).map_err(|e| {
        tracing::error!(error = %e, raw = %snippet(data), "Unparseable chunk from chat provider");
        Error::StreamAborted(format!("unparseable chunk: {}", e))
    })?;

    if let Some(error) = chunk.error {
        return Err(Error::StreamAborted(format!(
            "provider error: {}",
            error.message
        )));
    }

    if chunk.candidates.is_empty() {
        if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(Error::StreamAborted(format!("prompt blocked: {}", reason)));
        }
    }

    let text = chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(text)
}
