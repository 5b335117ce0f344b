//! Incremental UTF-8 decoding for chunked response bodies.
//!
//! The relay writes UTF-8 text, but the transport is free to cut the body at
//! any byte, including the middle of a multi-byte sequence. [`Utf8Decoder`]
//! holds back the unfinished tail of one chunk and completes it with the
//! head of the next, so the rest of the pipeline only ever sees text.

use tracing::debug;

/// Longest possible unfinished UTF-8 prefix (a 4-byte sequence missing its last byte).
const MAX_CARRY: usize = 3;

/// Stateful UTF-8 decoder for one byte stream.
///
/// Never share a decoder between streams: the carry-over buffer belongs to
/// the stream that produced it.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a decoder with an empty carry-over buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning all text that is complete so far.
    ///
    /// A byte that cannot start or continue a valid sequence is skipped on
    /// its own; the bytes after it are decoded normally.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);

        let mut text = String::with_capacity(bytes.len());
        let mut pos = 0;

        while pos < bytes.len() {
            match std::str::from_utf8(&bytes[pos..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let valid_end = pos + e.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&bytes[pos..valid_end]) {
                        text.push_str(valid);
                    }
                    pos = valid_end;

                    match e.error_len() {
                        Some(_) => {
                            debug!(byte = bytes[pos], offset = pos, "skipping malformed byte");
                            pos += 1;
                        }
                        None => {
                            // Unfinished sequence at the end of the chunk.
                            self.carry.extend_from_slice(&bytes[pos..]);
                            debug_assert!(self.carry.len() <= MAX_CARRY);
                            break;
                        }
                    }
                }
            }
        }

        text
    }

    /// Number of bytes currently held back waiting for the next chunk.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// End of stream: discard any unfinished sequence.
    pub fn finish(&mut self) {
        if !self.carry.is_empty() {
            debug!(
                bytes = self.carry.len(),
                "dropping truncated sequence at end of stream"
            );
            self.carry.clear();
        }
    }
}
