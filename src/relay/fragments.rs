//! Pull-based fragment sequences and the forwarding loop.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use super::RelayStream;
use crate::error::{Error, Result};

/// One incremental piece of generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
}

impl Fragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A finite, single-use sequence of fragments produced on demand.
///
/// Each call suspends until the provider delivers the next fragment.
/// `None` means the provider signalled end-of-stream; after an `Err` the
/// source must not be polled again. Dropping the source releases the
/// underlying connection.
#[async_trait]
pub trait FragmentSource: Send {
    async fn next_fragment(&mut self) -> Option<Result<Fragment>>;
}

/// Forward fragments to the caller as they arrive.
///
/// Non-empty fragments become one chunk each, in arrival order. Empty ones
/// are skipped. A source failure is forwarded as a single error item and
/// ends the stream; so does reaching `deadline`. If the caller drops the
/// returned stream, the source is dropped with it.
pub fn forward_fragments<S>(mut source: S, deadline: Instant) -> RelayStream
where
    S: FragmentSource + 'static,
{
    let stream = async_stream::stream! {
        let mut forwarded: usize = 0;
        loop {
            let next = match tokio::time::timeout_at(deadline, source.next_fragment()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::error!(forwarded, "Relay deadline reached while waiting for provider");
                    yield Err(Error::Timeout);
                    break;
                }
            };

            match next {
                Some(Ok(fragment)) => {
                    if fragment.text.is_empty() {
                        continue;
                    }
                    forwarded += 1;
                    yield Ok(Bytes::from(fragment.text));
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, forwarded, "Provider stream failed mid-flight");
                    let aborted = match e {
                        Error::StreamAborted(_) => e,
                        other => Error::StreamAborted(other.to_string()),
                    };
                    yield Err(aborted);
                    break;
                }
                None => {
                    tracing::debug!(forwarded, "Provider stream finished");
                    break;
                }
            }
        }
    };

    Box::pin(stream)
}
