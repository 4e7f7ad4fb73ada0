pub(crate) mod buffered;
pub(crate) mod health;
pub(crate) mod streaming;

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::RelayError;
use crate::protocol::coze::ChatTurn;
use crate::state::AppState;

const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;
const UPSTREAM_ERROR_DETAIL_MAX_CHARS: usize = 512;

enum RouteMatch {
    Health,
    BufferedChat,
    StreamingChat,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching relay handler.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    base_path: Arc<str>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path(), base_path.as_ref());

    let response = match route {
        RouteMatch::Health => health::handler(&state).into_response(),
        RouteMatch::BufferedChat => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            buffered::handler(&state, &body_bytes).await
        }
        RouteMatch::StreamingChat => streaming::handler(state, parts.uri.query()),
        RouteMatch::MethodNotAllowed => (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(json!({ "error": "Method not allowed" })),
        )
            .into_response(),
        RouteMatch::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Not found" })),
        )
            .into_response(),
    };

    Ok(response)
}

#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

async fn read_request_body(body: Body) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, DEFAULT_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "Request body too large (max 2MiB)" })),
            )
                .into_response()
        })
}

fn match_route(method: &Method, path: &str, base_path: &str) -> RouteMatch {
    let Some(path) = strip_base_path(path, base_path) else {
        return RouteMatch::NotFound;
    };

    match path {
        "/" => {
            if method == Method::GET {
                RouteMatch::Health
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/chat" => {
            if method == Method::POST {
                RouteMatch::BufferedChat
            } else if method == Method::GET {
                RouteMatch::StreamingChat
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        _ => RouteMatch::NotFound,
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let remainder = path.strip_prefix(base_path)?;
    if remainder.is_empty() {
        Some("/")
    } else if remainder.starts_with('/') {
        Some(remainder)
    } else {
        None
    }
}

/// Open the streamed upstream request for one conversation turn.
///
/// A non-success status is already a relay-level failure here; the error
/// body is captured (truncated) for the server log.
///
/// # Errors
///
/// Returns [`RelayError::Transport`] when the request cannot be sent and
/// [`RelayError::Upstream`] on a non-success status.
pub(crate) async fn open_upstream_stream(
    state: &AppState,
    message: &str,
    conversation_id: Option<&str>,
) -> Result<reqwest::Response, RelayError> {
    let upstream = &state.config.upstream;
    let turn = ChatTurn::user_message(upstream, message, conversation_id);
    let body = turn.to_body()?;

    let response = state
        .transport
        .send_stream(&state.upstream_url, &upstream.api_token, body)
        .await?;

    let status = response.status();
    if !status.is_success() {
        let detail = upstream_error_detail(response.bytes().await.ok());
        return Err(RelayError::Upstream {
            status: status.as_u16(),
            message: detail,
        });
    }
    Ok(response)
}

fn upstream_error_detail(body: Option<bytes::Bytes>) -> String {
    let Some(body) = body else {
        return "<unreadable error body>".to_string();
    };
    String::from_utf8_lossy(&body)
        .chars()
        .take(UPSTREAM_ERROR_DETAIL_MAX_CHARS)
        .collect()
}
