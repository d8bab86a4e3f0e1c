//! HTTP request handlers.

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use super::server::AppState;
use crate::adapter::{parse_turns, ChatTurn, CompletionRequest, OutboundRequest};
use crate::config::RelayMode;
use crate::error::{Error, Result};
use crate::session::ChatSession;

/// Response header: correlation ID (UUID v4), present on every chat response.
pub const REQUEST_ID_HEADER: &str = "x-chatrelay-request-id";
/// Request and response header: chat session the turn belongs to.
pub const SESSION_HEADER: &str = "x-chatrelay-session";

/// Attach correlation and session headers to a response.
fn attach_relay_headers(response: &mut Response, request_id: &str, session_id: Option<&str>) {
    let headers = response.headers_mut();

    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        headers.insert(HeaderName::from_static(SESSION_HEADER), value);
    }
}

/// Successful relay: the streaming response plus the session that served it.
struct RelayOutcome {
    response: Response,
    session_id: Option<String>,
}

/// Handle POST /api/chat
///
/// The body is the full conversation history. Replies are streamed as
/// plain text; failures become a fixed 500 text (or a JSON error for
/// session problems), never the provider's own error body.
pub async fn chat(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let requested_session = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let span = tracing::info_span!(
        "chat",
        request_id = %request_id,
        relay = state.relay.name(),
    );

    let result = execute_chat(&state, &body, requested_session.as_deref())
        .instrument(span.clone())
        .await;

    match result {
        Ok(outcome) => {
            let mut response = outcome.response;
            attach_relay_headers(&mut response, &request_id, outcome.session_id.as_deref());
            response
        }
        Err(error) => {
            span.in_scope(|| match &error {
                Error::MalformedInput(_) | Error::SessionNotFound(_) => {
                    tracing::warn!(error = %error, kind = error.kind(), "Rejected chat request")
                }
                _ => tracing::error!(error = %error, kind = error.kind(), "Chat relay failed"),
            });
            let mut response = error.into_response();
            attach_relay_headers(&mut response, &request_id, requested_session.as_deref());
            response
        }
    }
}

/// Adapt the history, run the relay and wrap its output stream.
async fn execute_chat(
    state: &AppState,
    body: &[u8],
    requested_session: Option<&str>,
) -> Result<RelayOutcome> {
    let turns = parse_turns(body)?;
    tracing::info!(turns = turns.len(), "Received chat request");

    let (outbound, pending) = build_outbound(state, &turns, requested_session)?;
    let stream = state.relay.relay(outbound).await?;

    // A session started for this turn becomes visible only once the
    // provider accepted the request; failed turns leave nothing behind.
    let session_id = pending.map(|pending| {
        let id = pending.session.id().to_string();
        if pending.is_new {
            state.sessions.register(pending.session);
        }
        id
    });

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| Error::Internal(format!("failed to build response: {}", e)))?;

    Ok(RelayOutcome {
        response,
        session_id,
    })
}

/// Session serving a chat-mode turn; `is_new` when started by this turn.
struct PendingSession {
    session: Arc<ChatSession>,
    is_new: bool,
}

/// Build exactly one outbound request for the configured relay mode.
fn build_outbound(
    state: &AppState,
    turns: &[ChatTurn],
    requested_session: Option<&str>,
) -> Result<(OutboundRequest, Option<PendingSession>)> {
    match state.config.relay.mode {
        RelayMode::Completion => {
            let request = CompletionRequest::from_turns(
                &state.config.completion,
                &state.config.relay.persona,
                turns,
            );
            Ok((OutboundRequest::Completion(request), None))
        }
        RelayMode::Chat => {
            let (session, is_new) = match requested_session {
                Some(id) => (state.sessions.get(id)?, false),
                None => (state.sessions.start()?, true),
            };
            let request = session.begin_turn(turns);
            Ok((
                OutboundRequest::Chat(request),
                Some(PendingSession { session, is_new }),
            ))
        }
    }
}

/// Handle POST /api/sessions - start a chat session for a new conversation
pub async fn create_session(State(state): State<AppState>) -> Result<Response> {
    let session = state.sessions.create().inspect_err(|e| {
        tracing::error!(error = %e, "Chat session could not be started");
    })?;

    let body = serde_json::json!({
        "id": session.id().to_string(),
        "model": session.model(),
        "created_at": session.created_at().to_rfc3339(),
    });

    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// Handle DELETE /api/sessions/:id - discard a finished conversation
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.sessions.remove(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    state.sessions.prune_expired();
    Json(serde_json::json!({
        "status": "ok",
        "service": "chatrelay",
        "mode": state.relay.name(),
        "sessions": state.sessions.len(),
    }))
}
