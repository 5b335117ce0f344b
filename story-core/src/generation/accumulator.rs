//! Per-generation accumulation state and event dispatch.

use super::annotations::strip_annotations;
use super::detector::SentinelDetector;
use super::GenerationError;
use relay::StreamEvent;
use serde_json::Value;
use tracing::{debug, warn};

/// What the observer is told while a chapter streams in.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationUpdate {
    /// The working title changed.
    Title(String),
    /// The text to display now: frozen prefix, annotations stripped.
    Display(String),
    /// A branches payload was accepted.
    Branches(Vec<String>),
    /// One-line plot anchor from the relay. Not accumulated.
    NodeUpdate(String),
    /// An event type this client doesn't interpret.
    Other { kind: String, value: Value },
}

/// Receives updates during a generation.
pub trait GenerationObserver {
    fn on_update(&mut self, update: GenerationUpdate);
}

impl<F> GenerationObserver for F
where
    F: FnMut(GenerationUpdate),
{
    fn on_update(&mut self, update: GenerationUpdate) {
        self(update)
    }
}

/// Working state of one in-flight generation.
///
/// Content only grows. Once `frozen_at` is set it is never moved, so
/// everything the reader has been shown stays a prefix of what is stored.
#[derive(Debug, Clone, Default)]
pub struct AccumulatedGeneration {
    title: Option<String>,
    content: String,
    frozen_at: Option<usize>,
    branches: Option<Vec<String>>,
    detector: SentinelDetector,
}

impl AccumulatedGeneration {
    pub fn new(detector: SentinelDetector) -> Self {
        Self {
            detector,
            ..Self::default()
        }
    }

    /// Route one event into the state and on to the observer.
    ///
    /// Only an `error` event fails; everything else is absorbed.
    pub fn dispatch<O>(&mut self, event: StreamEvent, observer: &mut O) -> Result<(), GenerationError>
    where
        O: GenerationObserver + ?Sized,
    {
        match event {
            StreamEvent::Title(title) => {
                self.title = Some(title.clone());
                observer.on_update(GenerationUpdate::Title(title));
            }
            StreamEvent::Content(fragment) => {
                self.content.push_str(&fragment);
                if self.frozen_at.is_none() {
                    if let Some(at) = self.detector.scan(&self.content) {
                        self.freeze(at);
                    }
                }
                observer.on_update(GenerationUpdate::Display(self.visible()));
            }
            StreamEvent::Branches(value) => match parse_branches(&value) {
                Some(branches) => {
                    self.freeze(self.content.len());
                    self.branches = Some(branches.clone());
                    observer.on_update(GenerationUpdate::Branches(branches));
                }
                None => warn!(payload = %value, "ignoring unreadable branches payload"),
            },
            StreamEvent::NodeUpdate(anchor) => {
                observer.on_update(GenerationUpdate::NodeUpdate(anchor));
            }
            StreamEvent::Error(message) => {
                return Err(GenerationError::Stream(message));
            }
            StreamEvent::Other { kind, value } => {
                debug!(%kind, "forwarding unrecognized event");
                observer.on_update(GenerationUpdate::Other { kind, value });
            }
        }
        Ok(())
    }

    fn freeze(&mut self, at: usize) {
        if self.frozen_at.is_none() {
            debug!(frozen_at = at, "branch menu located, freezing content");
            self.frozen_at = Some(at);
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// The raw accumulated buffer, control text included.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn frozen_at(&self) -> Option<usize> {
        self.frozen_at
    }

    pub fn branches(&self) -> Option<&[String]> {
        self.branches.as_deref()
    }

    /// Displayable text: the frozen prefix (or everything), annotations removed.
    pub fn visible(&self) -> String {
        let end = self.frozen_at.unwrap_or(self.content.len());
        strip_annotations(&self.content[..end])
    }
}

/// Accept an array of strings, or a string holding one.
///
/// An empty list is treated as unreadable so the caller's defaults survive.
fn parse_branches(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => {
            let branches: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Object(map) => map
                        .get("text")
                        .and_then(Value::as_str)
                        .map(|s| s.trim().to_string()),
                    _ => None,
                })
                .collect();
            (!branches.is_empty()).then_some(branches)
        }
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .filter(Value::is_array)
            .and_then(|inner| parse_branches(&inner)),
        _ => None,
    }
}
