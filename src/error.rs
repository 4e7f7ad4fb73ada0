use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// User-facing message for server-side faults. Internal detail stays in the
/// server logs.
pub const GENERIC_SERVER_ERROR: &str = "Something went wrong, please retry";

/// Canonical error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        match self {
            RelayError::InvalidRequest(_) => http::StatusCode::BAD_REQUEST,
            RelayError::Config(_)
            | RelayError::Upstream { .. }
            | RelayError::Transport(_)
            | RelayError::Internal(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message shown to the client. Client-input errors carry their own
    /// text; everything else collapses to a generic message.
    #[must_use]
    pub fn client_message(&self) -> &str {
        match self {
            RelayError::InvalidRequest(message) => message,
            _ => GENERIC_SERVER_ERROR,
        }
    }
}

/// Convert a `RelayError` into the single JSON error shape used by every
/// non-200 response. Server faults are logged here with full detail.
#[must_use]
pub fn error_response(err: &RelayError) -> Response {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(error = %err, "relay request failed");
    }
    (status, Json(json!({ "error": err.client_message() }))).into_response()
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        error_response(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_maps_to_400_with_own_message() {
        let err = RelayError::InvalidRequest("message is required".to_string());
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
        assert_eq!(err.client_message(), "message is required");
    }

    #[test]
    fn server_faults_map_to_500_with_generic_message() {
        let errors = [
            RelayError::Config("missing bot_id".to_string()),
            RelayError::Upstream {
                status: 502,
                message: "bad gateway".to_string(),
            },
            RelayError::Transport("connection refused".to_string()),
            RelayError::Internal("encode failed".to_string()),
        ];
        for err in errors {
            assert_eq!(err.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(err.client_message(), GENERIC_SERVER_ERROR);
        }
    }

    #[test]
    fn upstream_detail_never_reaches_client_message() {
        let err = RelayError::Upstream {
            status: 503,
            message: "secret internal detail".to_string(),
        };
        assert!(!err.client_message().contains("secret"));
        assert!(err.to_string().contains("secret internal detail"));
    }
}
