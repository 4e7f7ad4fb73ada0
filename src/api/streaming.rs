//! Incremental relay: a long-lived `text/event-stream` response that
//! forwards each decoded upstream frame to the client as it arrives.
//!
//! Once the response headers are committed, every failure is reported as a
//! single in-band `error` event followed by stream closure. Dropping the
//! body stream (client disconnect included) drops the upstream response,
//! tearing the upstream connection down on every exit path.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use smallvec::SmallVec;

use super::open_upstream_stream;
use crate::error::{error_response, RelayError, GENERIC_SERVER_ERROR};
use crate::state::AppState;
use crate::stream::{consume_items, encode, EventForwarder, EventScanner, StreamItem};

pub(crate) fn handler(state: Arc<AppState>, query: Option<&str>) -> Response {
    let request = match parse_query(query) {
        Ok(request) => request,
        Err(err) => return error_response(&err),
    };

    let events = live_event_stream(state, request);
    let body = Body::from_stream(events.map(Ok::<Bytes, Infallible>));
    sse_response(body)
}

struct LiveRequest {
    message: String,
    conversation_id: Option<String>,
}

fn parse_query(query: Option<&str>) -> Result<LiveRequest, RelayError> {
    let mut message = None;
    let mut conversation_id = None;
    for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
        match key.as_ref() {
            "message" => message = Some(value.into_owned()),
            "conversation_id" => conversation_id = Some(value.into_owned()),
            _ => {}
        }
    }

    match message {
        Some(message) if !message.is_empty() => Ok(LiveRequest {
            message,
            conversation_id: conversation_id.filter(|id| !id.is_empty()),
        }),
        _ => Err(RelayError::InvalidRequest("message is required".to_string())),
    }
}

fn sse_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

type UpstreamByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

enum LiveState {
    Connect {
        state: Arc<AppState>,
        request: LiveRequest,
    },
    Streaming(Box<StreamingState>),
    Finished,
}

struct StreamingState {
    upstream: UpstreamByteStream,
    scanner: EventScanner,
    forwarder: EventForwarder,
    items: Vec<StreamItem>,
    pending: PendingBytes,
    saw_first_chunk: bool,
    finished: bool,
}

/// The relayed event sequence: a `debug` event once the upstream connection
/// is open, another when the first upstream bytes arrive, every decoded
/// frame forwarded verbatim, then at most one `done` or `error` event.
fn live_event_stream(
    state: Arc<AppState>,
    request: LiveRequest,
) -> impl Stream<Item = Bytes> + Send {
    futures_util::stream::unfold(LiveState::Connect { state, request }, |live| async move {
        match live {
            LiveState::Connect { state, request } => {
                match open_upstream_stream(&state, &request.message, request.conversation_id.as_deref())
                    .await
                {
                    Ok(response) => {
                        let streaming = Box::new(StreamingState {
                            upstream: Box::pin(response.bytes_stream()),
                            scanner: EventScanner::new(),
                            forwarder: EventForwarder::new(),
                            items: Vec::with_capacity(8),
                            pending: PendingBytes::with_capacity(8),
                            saw_first_chunk: false,
                            finished: false,
                        });
                        Some((
                            encode::debug_frame("upstream connection established"),
                            LiveState::Streaming(streaming),
                        ))
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "failed to open upstream chat stream");
                        Some((
                            encode::error_frame(err.client_message(), &err.to_string()),
                            LiveState::Finished,
                        ))
                    }
                }
            }
            LiveState::Streaming(mut st) => loop {
                if let Some(chunk) = st.pending.pop_front() {
                    return Some((chunk, LiveState::Streaming(st)));
                }
                if st.finished {
                    return None;
                }
                match st.upstream.as_mut().next().await {
                    Some(Ok(bytes)) => {
                        if !st.saw_first_chunk {
                            st.saw_first_chunk = true;
                            st.pending
                                .push_back(encode::debug_frame("upstream stream started"));
                        }
                        st.scanner.feed_into(&bytes, &mut st.items);
                        let done = consume_items(&mut st.forwarder, &mut st.items);
                        for frame in st.forwarder.drain() {
                            st.pending.push_back(frame);
                        }
                        if done {
                            st.pending.push_back(encode::done_frame());
                            st.finished = true;
                        }
                    }
                    Some(Err(err)) => {
                        tracing::error!(error = %err, "upstream stream read failed");
                        st.pending
                            .push_back(encode::error_frame(GENERIC_SERVER_ERROR, &err.to_string()));
                        st.finished = true;
                    }
                    None => {
                        // Upstream EOF without a terminal marker: close
                        // without a terminal event.
                        st.finished = true;
                    }
                }
            },
            LiveState::Finished => None,
        }
    })
}

struct PendingBytes {
    chunks: SmallVec<[Bytes; 8]>,
    head: usize,
}

impl PendingBytes {
    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        let mut chunks = SmallVec::new();
        chunks.reserve(capacity);
        Self { chunks, head: 0 }
    }

    #[inline]
    fn push_back(&mut self, chunk: Bytes) {
        self.chunks.push(chunk);
    }

    #[inline]
    fn pop_front(&mut self) -> Option<Bytes> {
        if self.head >= self.chunks.len() {
            return None;
        }
        let chunk = std::mem::take(&mut self.chunks[self.head]);
        self.head += 1;
        if self.head == self.chunks.len() {
            self.chunks.clear();
            self.head = 0;
        }
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_requires_message() {
        assert!(parse_query(None).is_err());
        assert!(parse_query(Some("")).is_err());
        assert!(parse_query(Some("message=")).is_err());
        assert!(parse_query(Some("conversation_id=c1")).is_err());
    }

    #[test]
    fn parse_query_extracts_fields() {
        let request = parse_query(Some("message=hello%20there&conversation_id=c1")).expect("valid");
        assert_eq!(request.message, "hello there");
        assert_eq!(request.conversation_id.as_deref(), Some("c1"));
    }

    #[test]
    fn parse_query_drops_empty_conversation_id() {
        let request = parse_query(Some("message=hi&conversation_id=")).expect("valid");
        assert!(request.conversation_id.is_none());
    }

    #[test]
    fn parse_query_ignores_unknown_keys() {
        let request = parse_query(Some("message=hi&extra=1")).expect("valid");
        assert_eq!(request.message, "hi");
    }

    #[test]
    fn pending_bytes_is_fifo() {
        let mut pending = PendingBytes::with_capacity(2);
        pending.push_back(Bytes::from_static(b"a"));
        pending.push_back(Bytes::from_static(b"b"));
        assert_eq!(pending.pop_front().as_deref(), Some(b"a".as_ref()));
        pending.push_back(Bytes::from_static(b"c"));
        assert_eq!(pending.pop_front().as_deref(), Some(b"b".as_ref()));
        assert_eq!(pending.pop_front().as_deref(), Some(b"c".as_ref()));
        assert!(pending.pop_front().is_none());
    }
}
