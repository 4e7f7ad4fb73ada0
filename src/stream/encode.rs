//! SSE wire encoding for client-bound frames.

use bytes::Bytes;
use serde_json::Value;

/// Relay-originated diagnostic event.
pub const DEBUG_EVENT: &str = "debug";
/// Relay-originated terminal event.
pub const DONE_EVENT: &str = "done";
/// Relay-originated failure event; terminal for the client.
pub const ERROR_EVENT: &str = "error";

/// Encode a named SSE frame: `event: {event}\ndata: {json}\n\n`.
#[must_use]
pub fn event_frame(event: &str, json: &str) -> Bytes {
    let mut out = String::with_capacity(16 + event.len() + json.len());
    out.push_str("event: ");
    out.push_str(event);
    out.push('\n');
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    Bytes::from(out)
}

/// Encode an unnamed SSE frame: `data: {json}\n\n`.
#[must_use]
pub fn data_frame(json: &str) -> Bytes {
    let mut out = String::with_capacity(10 + json.len());
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    Bytes::from(out)
}

/// Encode an upstream frame for the client, passing the event name through
/// verbatim. Frames decoded before any `event:` line was seen carry no name
/// and become data-only frames.
#[must_use]
pub fn relay_frame(event: &str, payload: &Value) -> Bytes {
    let json = payload.to_string();
    if event.is_empty() {
        data_frame(&json)
    } else {
        event_frame(event, &json)
    }
}

/// Diagnostic event for client-side tracing.
#[must_use]
pub fn debug_frame(message: &str) -> Bytes {
    event_frame(DEBUG_EVENT, &relay_payload(message, None))
}

/// Terminal event mirroring the upstream sentinel.
#[must_use]
pub fn done_frame() -> Bytes {
    event_frame(DONE_EVENT, crate::protocol::coze::DONE_TOKEN)
}

/// Failure event carrying a user-facing message plus the underlying error
/// text; the stream closes right after it.
#[must_use]
pub fn error_frame(message: &str, detail: &str) -> Bytes {
    event_frame(ERROR_EVENT, &relay_payload(message, Some(detail)))
}

fn relay_payload(message: &str, detail: Option<&str>) -> String {
    let mut payload = serde_json::Map::new();
    payload.insert("message".to_string(), Value::String(message.to_string()));
    if let Some(detail) = detail {
        payload.insert("error".to_string(), Value::String(detail.to_string()));
    }
    Value::Object(payload).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_frame_wire_shape() {
        let frame = event_frame("conversation.chat.created", "{\"id\":\"c1\"}");
        assert_eq!(
            &frame[..],
            b"event: conversation.chat.created\ndata: {\"id\":\"c1\"}\n\n"
        );
    }

    #[test]
    fn data_frame_wire_shape() {
        assert_eq!(&data_frame("{\"x\":1}")[..], b"data: {\"x\":1}\n\n");
    }

    #[test]
    fn relay_frame_switches_on_event_name() {
        let payload = json!({ "content": "hi" });
        let named = relay_frame("conversation.message.delta", &payload);
        assert!(named.starts_with(b"event: conversation.message.delta\n"));
        let unnamed = relay_frame("", &payload);
        assert!(unnamed.starts_with(b"data: "));
    }

    #[test]
    fn debug_frame_is_valid_json_sse() {
        let frame = debug_frame("upstream connection established");
        let text = std::str::from_utf8(&frame).expect("utf8");
        let payload = text
            .strip_prefix("event: debug\ndata: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .expect("frame shape");
        let value: Value = serde_json::from_str(payload).expect("json");
        assert_eq!(value["message"], "upstream connection established");
    }

    #[test]
    fn error_frame_carries_message_and_detail() {
        let frame = error_frame("Something went wrong, please retry", "status=502");
        let text = std::str::from_utf8(&frame).expect("utf8");
        let payload = text
            .strip_prefix("event: error\ndata: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .expect("frame shape");
        let value: Value = serde_json::from_str(payload).expect("json");
        assert_eq!(value["message"], "Something went wrong, please retry");
        assert_eq!(value["error"], "status=502");
    }

    #[test]
    fn error_frame_escapes_detail() {
        let frame = error_frame("msg", "line\nbreak \"quoted\"");
        let text = std::str::from_utf8(&frame).expect("utf8");
        // The detail must not introduce raw newlines into the SSE framing.
        assert_eq!(text.matches('\n').count(), 3);
    }

    #[test]
    fn done_frame_wire_shape() {
        assert_eq!(&done_frame()[..], b"event: done\ndata: [DONE]\n\n");
    }
}
