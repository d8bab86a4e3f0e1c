//! Request adapter.
//!
//! Turns the browser's conversation history into exactly one provider
//! request. No network I/O happens here.

mod request;
mod turns;

pub use request::{
    build_prompt, chat_contents, ChatRequest, CompletionRequest, Content, GenerationConfig, OutboundRequest, Part,
};
pub use turns::{parse_turns, ChatTurn, Role};
