//! Stream relay.
//!
//! One [`Relay`] trait, two strategies: [`CompletionRelay`] buffers a
//! single JSON completion into one chunk, [`ChatRelay`] forwards a
//! provider's incremental generation fragment by fragment. The active
//! strategy is chosen by `relay.mode`.

mod buffered;
pub mod fragments;
mod incremental;
pub mod normalize;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::Client;

pub use buffered::CompletionRelay;
pub use fragments::{forward_fragments, Fragment, FragmentSource};
pub use incremental::{parse_chunk, ChatRelay, GeminiFragments};
pub use normalize::{extract_answer, normalize_body, truncate_at_blank_line, FALLBACK_ANSWER};

use crate::adapter::OutboundRequest;
use crate::config::{Config, ConfigError, RelayMode};
use crate::error::Result;

/// Output byte stream handed to the HTTP caller.
pub type RelayStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Issues one outbound request and republishes the reply as a byte stream.
///
/// Errors returned from `relay` happen before any byte was produced; errors
/// inside the stream happen after output has started.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Strategy name, for logs and `/health`.
    fn name(&self) -> &'static str;

    async fn relay(&self, request: OutboundRequest) -> Result<RelayStream>;
}

/// Build the strategy selected by configuration.
pub fn build_relay(config: &Config, client: Client) -> std::result::Result<Arc<dyn Relay>, ConfigError> {
    let timeout = config.server.relay_timeout();
    let relay: Arc<dyn Relay> = match config.relay.mode {
        RelayMode::Completion => Arc::new(CompletionRelay::from_config(
            &config.completion,
            client,
            timeout,
        )?),
        RelayMode::Chat => Arc::new(ChatRelay::from_config(&config.chat, client, timeout)?),
    };
    Ok(relay)
}
