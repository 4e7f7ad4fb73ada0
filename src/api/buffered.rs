//! Buffered relay: one message in, the whole upstream stream drained and
//! reduced, one JSON answer out.

use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde_json::{json, Value};

use super::open_upstream_stream;
use crate::error::{error_response, RelayError};
use crate::state::AppState;
use crate::stream::{consume_items, AnswerAccumulator, EventScanner};

pub(crate) async fn handler(state: &AppState, body: &[u8]) -> Response {
    match relay_chat(state, body).await {
        Ok(answer) => Json(json!({ "response": answer })).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn relay_chat(state: &AppState, body: &[u8]) -> Result<String, RelayError> {
    let message = parse_message(body)?;
    let response = open_upstream_stream(state, &message, None).await?;
    drain_answer(response).await
}

fn parse_message(body: &[u8]) -> Result<String, RelayError> {
    let invalid = || RelayError::InvalidRequest("message is required".to_string());
    let value: Value = serde_json::from_slice(body).map_err(|_| invalid())?;
    match value.get("message").and_then(Value::as_str) {
        Some(message) if !message.is_empty() => Ok(message.to_owned()),
        _ => Err(invalid()),
    }
}

/// Read the streamed body to completion through the scanner, accumulating
/// deltas and the final answer. Stops early once the terminal token is
/// seen; dropping the rest of the body closes the upstream connection.
async fn drain_answer(response: reqwest::Response) -> Result<String, RelayError> {
    let mut scanner = EventScanner::new();
    let mut accumulator = AnswerAccumulator::new();
    let mut items = Vec::with_capacity(8);

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk
            .map_err(|err| RelayError::Transport(format!("failed to read upstream body: {err}")))?;
        scanner.feed_into(&chunk, &mut items);
        if consume_items(&mut accumulator, &mut items) {
            break;
        }
    }

    let answer = accumulator.finish();
    if answer.is_empty() {
        tracing::warn!("upstream stream produced no usable answer content");
    }
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_message_accepts_plain_string() {
        let message = parse_message(br#"{"message":"hello"}"#).expect("valid");
        assert_eq!(message, "hello");
    }

    #[test]
    fn parse_message_rejects_missing_field() {
        assert!(parse_message(br#"{}"#).is_err());
    }

    #[test]
    fn parse_message_rejects_empty_string() {
        assert!(parse_message(br#"{"message":""}"#).is_err());
    }

    #[test]
    fn parse_message_rejects_non_string() {
        assert!(parse_message(br#"{"message":42}"#).is_err());
        assert!(parse_message(br#"{"message":null}"#).is_err());
    }

    #[test]
    fn parse_message_rejects_invalid_json() {
        assert!(parse_message(b"not json").is_err());
    }
}
