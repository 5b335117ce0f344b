//! Stream events and the byte-stream-to-event pipeline.

use crate::decoder::Utf8Decoder;
use crate::frame::FrameBuffer;
use crate::Error;
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::warn;

/// A boxed stream of parsed relay events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>>;

/// One `{type, value}` event decoded from a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Replaces the working chapter title.
    Title(String),
    /// A fragment of chapter body text.
    Content(String),
    /// Branch options; normally an array of strings, but kept raw so the
    /// consumer can decide how lenient to be.
    Branches(serde_json::Value),
    /// One-line plot anchor produced by the relay.
    NodeUpdate(String),
    /// Provider-side failure. Ends the generation.
    Error(String),
    /// Any other event type, passed through untouched.
    Other {
        kind: String,
        value: serde_json::Value,
    },
}

impl StreamEvent {
    /// Parse a frame payload.
    pub fn parse(payload: &str) -> Result<Self, Error> {
        let raw: RawEvent =
            serde_json::from_str(payload).map_err(|e| Error::Parse(e.to_string()))?;

        Ok(match raw.kind.as_str() {
            "title" => StreamEvent::Title(text_value(raw.value)),
            "content" => StreamEvent::Content(text_value(raw.value)),
            "branches" => StreamEvent::Branches(raw.value),
            "node_update" => StreamEvent::NodeUpdate(text_value(raw.value)),
            "error" => StreamEvent::Error(text_value(raw.value)),
            _ => StreamEvent::Other {
                kind: raw.kind,
                value: raw.value,
            },
        })
    }

    /// The wire tag of this event.
    pub fn kind(&self) -> &str {
        match self {
            StreamEvent::Title(_) => "title",
            StreamEvent::Content(_) => "content",
            StreamEvent::Branches(_) => "branches",
            StreamEvent::NodeUpdate(_) => "node_update",
            StreamEvent::Error(_) => "error",
            StreamEvent::Other { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: serde_json::Value,
}

fn text_value(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Turn a raw body stream into parsed events.
///
/// Bytes are decoded exactly once, here. Frames that fail to parse are
/// logged and skipped; a transport error is yielded once and ends the stream.
pub fn decode_events<S>(body: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, Error>> + Send + 'static,
{
    let state = PipelineState {
        body: Box::pin(body),
        decoder: Utf8Decoder::new(),
        frames: FrameBuffer::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    let events = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let text = state.decoder.decode(&chunk);
                    let payloads = state.frames.push(&text);
                    state.enqueue(payloads);
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(e));
                    state.finished = true;
                }
                None => {
                    state.decoder.finish();
                    let tail = state.frames.flush();
                    state.enqueue(tail);
                    state.finished = true;
                }
            }
        }
    });

    Box::pin(events)
}

struct PipelineState {
    body: Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>,
    decoder: Utf8Decoder,
    frames: FrameBuffer,
    pending: VecDeque<Result<StreamEvent, Error>>,
    finished: bool,
}

impl PipelineState {
    fn enqueue(&mut self, payloads: impl IntoIterator<Item = String>) {
        for payload in payloads {
            match StreamEvent::parse(&payload) {
                Ok(event) => self.pending.push_back(Ok(event)),
                Err(e) => warn!(error = %e, payload = %preview(&payload), "skipping unparseable frame"),
            }
        }
    }
}

fn preview(payload: &str) -> String {
    payload.chars().take(80).collect()
}
