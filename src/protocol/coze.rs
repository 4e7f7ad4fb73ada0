//! Wire types and payload helpers for the Coze chat API.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::config::UpstreamConfig;
use crate::error::RelayError;

/// Event name for an incremental answer fragment.
pub const EVENT_MESSAGE_DELTA: &str = "conversation.message.delta";
/// Event name for a finished message carrying its full content.
pub const EVENT_MESSAGE_COMPLETED: &str = "conversation.message.completed";
/// Sentinel `data:` payload marking the end of the upstream stream.
pub const DONE_TOKEN: &str = "[DONE]";

const ANSWER_MESSAGE_TYPE: &str = "answer";

/// One conversation turn sent to the upstream chat endpoint.
#[derive(Debug, Serialize)]
pub struct ChatTurn<'a> {
    pub bot_id: &'a str,
    pub user_id: &'a str,
    pub stream: bool,
    pub auto_save_history: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<&'a str>,
    pub additional_messages: Vec<TurnMessage<'a>>,
}

#[derive(Debug, Serialize)]
pub struct TurnMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
    pub content_type: &'a str,
}

impl<'a> ChatTurn<'a> {
    /// Build the envelope for a single user message, optionally continuing
    /// an existing conversation.
    #[must_use]
    pub fn user_message(
        upstream: &'a UpstreamConfig,
        message: &'a str,
        conversation_id: Option<&'a str>,
    ) -> Self {
        Self {
            bot_id: &upstream.bot_id,
            user_id: &upstream.user_id,
            stream: true,
            auto_save_history: true,
            conversation_id,
            additional_messages: vec![TurnMessage {
                role: "user",
                content: message,
                content_type: "text",
            }],
        }
    }

    /// Serialize the turn into a request body.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] when JSON encoding fails.
    pub fn to_body(&self) -> Result<Bytes, RelayError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|err| RelayError::Internal(format!("failed to encode upstream request: {err}")))
    }
}

/// Extract the textual content of a message payload.
///
/// The upstream emits `content` at the top level; some configurations nest
/// it under `data.content`. `content` is authoritative, the nested shape is
/// accepted as a fallback.
#[must_use]
pub fn message_content(payload: &Value) -> Option<&str> {
    payload
        .get("content")
        .and_then(Value::as_str)
        .or_else(|| {
            payload
                .get("data")
                .and_then(|data| data.get("content"))
                .and_then(Value::as_str)
        })
}

/// Whether a completed-message payload carries the final answer (as opposed
/// to follow-up suggestions or verbose traces).
#[must_use]
pub fn is_answer_payload(payload: &Value) -> bool {
    message_type(payload) == Some(ANSWER_MESSAGE_TYPE)
}

fn message_type(payload: &Value) -> Option<&str> {
    payload.get("type").and_then(Value::as_str).or_else(|| {
        payload
            .get("data")
            .and_then(|data| data.get("type"))
            .and_then(Value::as_str)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upstream() -> UpstreamConfig {
        UpstreamConfig {
            api_url: "https://api.coze.com/v3/chat".to_string(),
            api_token: "pat-test".to_string(),
            bot_id: "bot-7".to_string(),
            ..UpstreamConfig::default()
        }
    }

    #[test]
    fn user_message_envelope_shape() {
        let upstream = upstream();
        let turn = ChatTurn::user_message(&upstream, "hello", None);
        let body = turn.to_body().expect("encode");
        let value: Value = serde_json::from_slice(&body).expect("decode");
        assert_eq!(value["bot_id"], "bot-7");
        assert_eq!(value["user_id"], "123456789");
        assert_eq!(value["stream"], true);
        assert_eq!(value["auto_save_history"], true);
        assert!(value.get("conversation_id").is_none());
        assert_eq!(value["additional_messages"][0]["role"], "user");
        assert_eq!(value["additional_messages"][0]["content"], "hello");
        assert_eq!(value["additional_messages"][0]["content_type"], "text");
    }

    #[test]
    fn conversation_id_passes_through() {
        let upstream = upstream();
        let turn = ChatTurn::user_message(&upstream, "again", Some("conv-123"));
        let body = turn.to_body().expect("encode");
        let value: Value = serde_json::from_slice(&body).expect("decode");
        assert_eq!(value["conversation_id"], "conv-123");
    }

    #[test]
    fn message_content_prefers_top_level() {
        let payload = json!({ "content": "top", "data": { "content": "nested" } });
        assert_eq!(message_content(&payload), Some("top"));
    }

    #[test]
    fn message_content_falls_back_to_nested() {
        let payload = json!({ "data": { "content": "nested" } });
        assert_eq!(message_content(&payload), Some("nested"));
    }

    #[test]
    fn message_content_ignores_non_string() {
        let payload = json!({ "content": 42 });
        assert_eq!(message_content(&payload), None);
    }

    #[test]
    fn answer_payload_detection() {
        assert!(is_answer_payload(&json!({ "type": "answer" })));
        assert!(is_answer_payload(&json!({ "data": { "type": "answer" } })));
        assert!(!is_answer_payload(&json!({ "type": "follow_up" })));
        assert!(!is_answer_payload(&json!({})));
    }
}
