//! HTTP front of the relay.
//!
//! Accepts the browser's conversation history on `/api/chat`, hands it to
//! the request adapter and the configured relay, and streams the reply
//! back. Session management endpoints live here as well.

mod handlers;
mod server;

pub use handlers::{REQUEST_ID_HEADER, SESSION_HEADER};
pub use server::{create_router, run_server, AppState};
