//! The stream parser: an incremental scanner over the upstream event stream
//! plus the two frame consumers (accumulate-then-return for the buffered
//! relay, forward-immediately for the incremental relay).

pub mod encode;
pub mod reduce;
pub mod scanner;

pub use reduce::{consume_items, AnswerAccumulator, EventForwarder, FrameConsumer};
pub use scanner::EventScanner;

/// One decoded unit of the upstream event stream: the most recent event
/// name (empty when none was seen yet) paired with a parsed JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamFrame {
    pub event: String,
    pub payload: serde_json::Value,
}

/// What the scanner yields. After `Done` the scanner ignores all further
/// input.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Frame(UpstreamFrame),
    Done,
}
