//! HTTP server setup and configuration.

use axum::{
    routing::{delete, get, post},
    Router,
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::{Config, ConfigError};
use crate::relay::{build_relay, Relay};
use crate::session::SessionStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<dyn Relay>,
    pub sessions: Arc<SessionStore>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the relay strategy and session store for `config`.
    pub fn new(config: Config, http_client: Client) -> Result<Self, ConfigError> {
        let relay = build_relay(&config, http_client)?;
        let sessions = SessionStore::new(config.relay.mode, &config.chat, &config.relay.persona);

        Ok(Self {
            relay,
            sessions: Arc::new(sessions),
            config: Arc::new(config),
        })
    }
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/api/sessions", post(handlers::create_session))
        .route("/api/sessions/:id", delete(handlers::delete_session))
        .route("/health", get(handlers::health))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();

    if config.relay.persona.trim().is_empty() {
        tracing::warn!("Persona is empty - prompts will carry conversation text only");
    }

    // The relay enforces its own deadline; only connecting is bounded here.
    let http_client = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let state = AppState::new(config, http_client)?;
    let mode = state.config.relay.mode;
    let relay_timeout = state.config.server.relay_timeout();

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(
        address = %listen_addr,
        mode = %mode,
        relay_timeout = ?relay_timeout,
        "Starting chatrelay server"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
