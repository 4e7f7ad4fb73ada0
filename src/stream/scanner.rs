//! Incremental line scanner over the upstream event-stream encoding.
//!
//! Feed it raw byte chunks (arriving at arbitrary boundaries, including
//! splits inside a line or inside a UTF-8 sequence) and it yields decoded
//! [`StreamItem`]s. Chunk boundaries carry no semantic meaning: any split
//! of the same byte stream produces the same items.

use memchr::memchr_iter;
use serde_json::Value;

use super::{StreamItem, UpstreamFrame};
use crate::protocol::coze::DONE_TOKEN;

/// Restartable scanner state for one in-flight parse.
///
/// Owns a carry-over text buffer for partial lines, a byte buffer for
/// incomplete UTF-8 sequences at chunk edges, and the current event name,
/// which persists across `data:` lines until overwritten. Once the terminal
/// token is seen, all further input is ignored.
pub struct EventScanner {
    buffer: String,
    read_offset: usize,
    utf8_remainder: Vec<u8>,
    event_name: String,
    terminated: bool,
}

impl EventScanner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
            utf8_remainder: Vec::new(),
            event_name: String::new(),
            terminated: false,
        }
    }

    /// Whether the terminal token has been observed.
    #[must_use]
    pub fn terminated(&self) -> bool {
        self.terminated
    }

    /// Feed a raw byte chunk and append any complete items to `out`.
    ///
    /// Bytes that do not yet form a complete UTF-8 sequence are buffered and
    /// retried with the next chunk.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<StreamItem>) {
        if self.terminated {
            return;
        }

        if self.utf8_remainder.is_empty() {
            match std::str::from_utf8(chunk) {
                Ok(text) => self.feed_text(text, out),
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
                    let text = unsafe { std::str::from_utf8_unchecked(&chunk[..valid_up_to]) };
                    self.feed_text(text, out);
                    if !self.terminated {
                        self.utf8_remainder.extend_from_slice(&chunk[valid_up_to..]);
                    }
                }
            }
            return;
        }

        let mut pending = std::mem::take(&mut self.utf8_remainder);
        pending.extend_from_slice(chunk);
        match std::str::from_utf8(&pending) {
            Ok(text) => self.feed_text(text, out),
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
                let text = unsafe { std::str::from_utf8_unchecked(&pending[..valid_up_to]) };
                self.feed_text(text, out);
                if !self.terminated {
                    pending.copy_within(valid_up_to.., 0);
                    pending.truncate(pending.len() - valid_up_to);
                    self.utf8_remainder = pending;
                }
            }
        }
    }

    fn feed_text(&mut self, chunk: &str, out: &mut Vec<StreamItem>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let scan_start = processed_up_to;
        let bytes = self.buffer.as_bytes();
        let mut terminated_now = false;
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let line = &self.buffer[processed_up_to..line_end];
            let done = Self::process_line(line, &mut self.event_name, out);
            processed_up_to = line_end + 1;
            if done {
                terminated_now = true;
                break;
            }
        }

        if terminated_now {
            self.terminated = true;
            self.buffer.clear();
            self.read_offset = 0;
            self.utf8_remainder.clear();
            return;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Classify one complete line. Returns `true` when the terminal token
    /// was seen.
    ///
    /// - `event:` sets the current event name
    /// - `data:` yields a frame when its payload parses as JSON; an
    ///   undecodable payload is logged and skipped, never fatal
    /// - anything else is ignored
    fn process_line(line: &str, event_name: &mut String, out: &mut Vec<StreamItem>) -> bool {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(rest) = line.strip_prefix("event:") {
            *event_name = rest.trim().to_string();
            return false;
        }
        let Some(rest) = line.strip_prefix("data:") else {
            return false;
        };
        let payload = rest.trim();
        if payload == DONE_TOKEN {
            out.push(StreamItem::Done);
            return true;
        }
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => out.push(StreamItem::Frame(UpstreamFrame {
                event: event_name.clone(),
                payload: value,
            })),
            Err(err) => tracing::debug!(error = %err, "skipping undecodable data line"),
        }
        false
    }
}

impl Default for EventScanner {
    fn default() -> Self {
        Self::new()
    }
}
