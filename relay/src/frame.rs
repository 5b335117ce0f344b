//! Event-stream framing.
//!
//! Frames are separated by a blank line. Each frame carries its payload on
//! one or more `data:` lines; comment lines (`: keep-alive`), other fields and
//! the literal `[DONE]` marker carry nothing and are dropped here.

/// End-of-stream sentinel some relays send as a final data line.
const DONE_MARKER: &str = "[DONE]";

/// Accumulates decoded text and yields the payloads of complete frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: String,
}

impl FrameBuffer {
    /// Create an empty frame buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append decoded text and return the payload of every frame it completes.
    ///
    /// The trailing, possibly incomplete segment stays buffered for the next call.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.extend(text.chars().filter(|&c| c != '\r'));

        let mut payloads = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..end + 2).collect();
            if let Some(payload) = extract_payload(&frame) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// End of stream: return the payload of a final frame that was never
    /// terminated by a blank line, if there is one.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        extract_payload(&rest)
    }

    /// Bytes of text waiting for a delimiter.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Pull the data payload out of one frame.
fn extract_payload(frame: &str) -> Option<String> {
    let data: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();

    if data.is_empty() {
        return None;
    }

    let payload = data.join("\n");
    let payload = payload.trim();
    if payload.is_empty() || payload == DONE_MARKER {
        return None;
    }
    Some(payload.to_string())
}
