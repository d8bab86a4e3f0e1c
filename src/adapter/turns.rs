//! Inbound chat history as submitted by the browser.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "model")]
    Assistant,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Wire shape of a turn. `content` stays optional so a missing or null
/// field is reported with its position instead of a serde message.
#[derive(Deserialize)]
struct WireTurn {
    role: Role,
    content: Option<String>,
}

/// Parse the request body: a non-empty JSON array of `{role, content}`.
pub fn parse_turns(body: &[u8]) -> Result<Vec<ChatTurn>> {
    let wire: Vec<WireTurn> = serde_json::from_slice(body)
        .map_err(|e| Error::MalformedInput(format!("expected an array of turns: {}", e)))?;

    if wire.is_empty() {
        return Err(Error::MalformedInput("conversation is empty".to_string()));
    }

    wire.into_iter()
        .enumerate()
        .map(|(index, turn)| match turn.content {
            Some(content) => Ok(ChatTurn {
                role: turn.role,
                content,
            }),
            None => Err(Error::MalformedInput(format!(
                "turn {} has no content",
                index
            ))),
        })
        .collect()
}
