//! Text event stream framing.
//!
//! Two frame kinds go over the wire:
//!
//! ```text
//! : <text>\n\n          comment, ignored by conforming clients
//! data: <json>\n\n      one activity, serialized on a single line
//! ```

use crate::error::{FeedError, Result};
use crate::types::Activity;
use bytes::Bytes;

/// Comment sent once when a listener connects, before any replay.
pub const CONNECTED: &str = "connected";

/// Comment sent on every heartbeat tick.
pub const HEARTBEAT: &str = "heartbeat";

/// Encode a comment frame.
pub fn comment(text: &str) -> Bytes {
    Bytes::from(format!(": {}\n\n", text))
}

/// Encode an activity as a data frame.
///
/// Compact JSON never contains a raw newline, so one `data:` line suffices.
pub fn data(activity: &Activity) -> Result<Bytes> {
    let json = serde_json::to_string(activity)?;

    let mut frame = String::with_capacity(json.len() + 8);
    frame.push_str("data: ");
    frame.push_str(&json);
    frame.push_str("\n\n");

    Ok(Bytes::from(frame))
}

/// Incremental client-side decoder.
///
/// Fed arbitrary chunks of a stream, it yields the payload of every complete
/// data event. Comment lines and unknown fields are dropped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// `data:` lines of the event being assembled.
    pending: Vec<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning the payloads of the events it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line: &str = text.strip_suffix('\r').unwrap_or(text.as_ref());

            if line.is_empty() {
                if !self.pending.is_empty() {
                    events.push(self.pending.join("\n"));
                    self.pending.clear();
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            if let Some(value) = line.strip_prefix("data:") {
                let value = value.strip_prefix(' ').unwrap_or(value);
                self.pending.push(value.to_string());
            }
        }

        events
    }

    /// Decode every data event in `chunk` as an activity.
    pub fn push_activities(&mut self, chunk: &[u8]) -> Result<Vec<Activity>> {
        self.push(chunk)
            .iter()
            .map(|payload| serde_json::from_str::<Activity>(payload).map_err(FeedError::from))
            .collect()
    }
}
