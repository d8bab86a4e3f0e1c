//! Error types for chatrelay.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

/// Result type alias for chatrelay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The only text a browser ever sees when a relay fails.
pub const GENERIC_ERROR_TEXT: &str = "An error occurred while processing your request.";

/// Main error type for chatrelay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Malformed chat history: {0}")]
    MalformedInput(String),

    #[error("Chat session could not be initialized: {0}")]
    SessionInit(String),

    #[error("Unknown chat session '{0}'")]
    SessionNotFound(String),

    #[error("Provider returned status {status}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Provider returned a non-JSON payload")]
    UpstreamFormat { raw: String },

    #[error("Provider stream aborted: {0}")]
    StreamAborted(String),

    #[error("Relay deadline exceeded")]
    Timeout,

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short machine-readable tag, used in logs and JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::MalformedInput(_) => "malformed_input",
            Error::SessionInit(_) => "session_init_error",
            Error::SessionNotFound(_) => "session_not_found",
            Error::UpstreamStatus { .. } => "upstream_status",
            Error::UpstreamFormat { .. } => "upstream_format",
            Error::StreamAborted(_) => "stream_aborted",
            Error::Timeout => "timeout",
            Error::Upstream(_) => "upstream_unreachable",
            Error::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::SessionInit(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
            _ => {
                // Provider bodies and internal detail stay server-side.
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    GENERIC_ERROR_TEXT,
                )
                    .into_response();
            }
        };

        let body = serde_json::json!({
            "error": {
                "message": self.to_string(),
                "type": self.kind(),
                "code": status.as_u16()
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_upstream_errors_render_generic_500() {
        let errors = vec![
            Error::UpstreamStatus {
                status: 503,
                body: "provider overloaded, key sk-123".to_string(),
            },
            Error::UpstreamFormat {
                raw: "<html>oops</html>".to_string(),
            },
            Error::MalformedInput("missing content".to_string()),
            Error::Internal("boom".to_string()),
        ];

        for error in errors {
            let response = error.into_response();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let text = body_text(response).await;
            assert_eq!(text, GENERIC_ERROR_TEXT);
        }
    }

    #[tokio::test]
    async fn test_session_errors_render_json() {
        let response = Error::SessionNotFound("abc".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["error"]["type"], "session_not_found");
        assert_eq!(json["error"]["code"], 404);

        let response = Error::SessionInit("chat provider has no API key".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("no API key"));
    }
}
