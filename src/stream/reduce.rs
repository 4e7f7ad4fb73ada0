//! Frame consumers: what each relay mode does with a decoded frame.
//!
//! The buffered relay accumulates content and returns one finalized answer;
//! the incremental relay encodes every frame immediately for the client.

use bytes::Bytes;

use super::{encode, StreamItem, UpstreamFrame};
use crate::protocol::coze;

/// One decoded frame sink. The scanner does not care what happens to a
/// frame; the two relay modes plug in here.
pub trait FrameConsumer {
    fn on_frame(&mut self, frame: &UpstreamFrame);
}

/// Drain scanned items into a consumer. Returns `true` once the terminal
/// signal is seen.
pub fn consume_items<C: FrameConsumer + ?Sized>(
    consumer: &mut C,
    items: &mut Vec<StreamItem>,
) -> bool {
    let mut done = false;
    for item in items.drain(..) {
        match item {
            StreamItem::Frame(frame) => consumer.on_frame(&frame),
            StreamItem::Done => done = true,
        }
    }
    done
}

/// Buffered reduction: collect delta fragments and a possible final answer.
///
/// Delta frames append their content; a completed frame typed as the answer
/// overwrites the final text. Some upstream configurations only ever emit
/// deltas, so `finish` falls back to the accumulated fragments when no
/// usable completion arrived.
#[derive(Debug, Default)]
pub struct AnswerAccumulator {
    delta: String,
    final_answer: Option<String>,
}

impl AnswerAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The finalized answer: the completed text when present and non-empty,
    /// else the accumulated deltas, else the empty string.
    #[must_use]
    pub fn finish(self) -> String {
        match self.final_answer {
            Some(answer) if !answer.is_empty() => answer,
            _ => self.delta,
        }
    }
}

impl FrameConsumer for AnswerAccumulator {
    fn on_frame(&mut self, frame: &UpstreamFrame) {
        match frame.event.as_str() {
            coze::EVENT_MESSAGE_DELTA => {
                if let Some(content) = coze::message_content(&frame.payload) {
                    self.delta.push_str(content);
                }
            }
            coze::EVENT_MESSAGE_COMPLETED => {
                if coze::is_answer_payload(&frame.payload) {
                    if let Some(content) = coze::message_content(&frame.payload) {
                        self.final_answer = Some(content.to_owned());
                    }
                }
            }
            _ => {}
        }
    }
}

/// Incremental reduction: encode each frame as an SSE frame for the client,
/// event name passed through verbatim. The client reassembles deltas
/// itself, so nothing is buffered beyond the encode queue.
#[derive(Debug, Default)]
pub struct EventForwarder {
    encoded: Vec<Bytes>,
}

impl EventForwarder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the encoded frames queued since the last call.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Bytes> {
        self.encoded.drain(..)
    }
}

impl FrameConsumer for EventForwarder {
    fn on_frame(&mut self, frame: &UpstreamFrame) {
        self.encoded
            .push(encode::relay_frame(&frame.event, &frame.payload));
    }
}
