use tracing::warn;

use crate::events::{ChatCompletionChunk, EventFrame};
use crate::frame::FrameDecoder;

/// Payload of the frame that terminates a completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data:";
const LOG_PAYLOAD_CHARS: usize = 120;

/// Incremental parser from event-stream body bytes to text deltas.
///
/// Once the termination sentinel is seen the parser is latched: the rest of
/// the current chunk and every later chunk are ignored.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    decoder: FrameDecoder,
    done: bool,
}

impl EventStreamParser {
    /// Feed arbitrary bytes into the parser and drain completed deltas in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }

        let mut deltas = Vec::new();
        for line in self.decoder.feed(bytes) {
            match parse_line(&line) {
                Some(EventFrame::Done) => {
                    self.done = true;
                    self.decoder.finish();
                    break;
                }
                Some(EventFrame::Data(chunk)) => {
                    if let Some(text) = chunk.first_delta_text() {
                        deltas.push(text.to_owned());
                    }
                }
                None => {}
            }
        }

        deltas
    }

    /// True once the termination sentinel has been parsed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Ends the body, returning the number of unterminated bytes dropped.
    pub fn finish(&mut self) -> usize {
        self.decoder.finish()
    }

    /// Parse a complete event-stream payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<String> {
        let mut parser = Self::default();
        let deltas = parser.feed(input.as_bytes());
        parser.finish();
        deltas
    }
}

/// Classifies one line of an event stream.
///
/// Blank lines, non-`data:` lines and empty `data:` payloads yield `None`.
/// A payload that fails to parse as a completion chunk is logged and also
/// yields `None`, so a single corrupt frame never ends the stream.
pub fn parse_line(line: &str) -> Option<EventFrame> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let payload = trimmed.strip_prefix(DATA_PREFIX)?.trim_start();
    if payload == DONE_SENTINEL {
        return Some(EventFrame::Done);
    }
    if payload.is_empty() {
        return None;
    }

    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => Some(EventFrame::Data(chunk)),
        Err(error) => {
            warn!(
                %error,
                payload = %truncate_for_log(payload),
                "discarding malformed event-stream frame"
            );
            None
        }
    }
}

fn truncate_for_log(payload: &str) -> String {
    let mut chars = payload.chars();
    let head: String = chars.by_ref().take(LOG_PAYLOAD_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
