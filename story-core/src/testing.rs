//! Testing utilities for story sessions.
//!
//! This module provides tools for integration testing:
//! - `MockBackend` for deterministic streams without a relay
//! - `StubSummarizer` for scripted, recorded summarization calls
//! - `StoryHarness` for scripted reading sessions
//! - Assertion helpers for verifying session state

use crate::backend::{StoryBackend, Summarizer};
use crate::chapter::Chapter;
use crate::generation::GenerationUpdate;
use crate::memory::LedgerEntry;
use crate::session::{SessionConfig, SessionError, StorySession};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use relay::{
    decode_events, EventStream, GenerateRequest, StorySettings, SummaryRequest, UserPreferences,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Encode one `{type, value}` event as a wire frame.
pub fn sse_frame(kind: &str, value: Value) -> String {
    format!("data: {}\n\n", json!({ "type": kind, "value": value }))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a scripted stream fails.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// The request times out before any byte arrives.
    Timeout,
    /// The relay can't be reached.
    ConnectionRefused,
    /// The connection drops after the scripted chunks.
    Dropped,
    /// The connection stays open after the scripted chunks and never ends.
    Stalled,
}

/// A scripted relay response.
#[derive(Debug, Clone, Default)]
pub struct MockStream {
    wire: String,
    chunk_size: Option<usize>,
    failure: Option<MockFailure>,
}

impl MockStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stream that fails before opening.
    pub fn failing(failure: MockFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    pub fn event(mut self, kind: &str, value: Value) -> Self {
        self.wire.push_str(&sse_frame(kind, value));
        self
    }

    pub fn title(self, title: &str) -> Self {
        self.event("title", json!(title))
    }

    pub fn content(self, text: &str) -> Self {
        self.event("content", json!(text))
    }

    pub fn branches(self, branches: &[&str]) -> Self {
        self.event("branches", json!(branches))
    }

    pub fn node_update(self, anchor: &str) -> Self {
        self.event("node_update", json!(anchor))
    }

    pub fn error(self, message: &str) -> Self {
        self.event("error", json!(message))
    }

    /// Append raw wire text as-is (comments, `[DONE]`, garbage).
    pub fn raw(mut self, text: &str) -> Self {
        self.wire.push_str(text);
        self
    }

    /// Deliver the body in chunks of `size` bytes, splitting characters.
    pub fn chunked(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    /// Drop the connection after the scripted body.
    pub fn then_drop(mut self) -> Self {
        self.failure = Some(MockFailure::Dropped);
        self
    }

    /// Keep the connection open after the scripted body without sending more.
    pub fn then_stall(mut self) -> Self {
        self.failure = Some(MockFailure::Stalled);
        self
    }

    fn chunks(&self) -> Vec<Bytes> {
        let bytes = self.wire.as_bytes();
        match self.chunk_size {
            Some(size) => bytes.chunks(size).map(Bytes::copy_from_slice).collect(),
            None => vec![Bytes::copy_from_slice(bytes)],
        }
    }

    fn open(self) -> Result<EventStream, relay::Error> {
        let tail = match self.failure {
            Some(MockFailure::Timeout) => return Err(relay::Error::Timeout),
            Some(MockFailure::ConnectionRefused) => {
                return Err(relay::Error::Connect("connection refused".to_string()))
            }
            Some(MockFailure::Dropped) => Some(Err(relay::Error::Network(
                "connection reset".to_string(),
            ))),
            Some(MockFailure::Stalled) | None => None,
        };
        let body = self
            .chunks()
            .into_iter()
            .map(Ok)
            .chain(tail)
            .collect::<Vec<_>>();
        let body = futures::stream::iter(body);
        if matches!(self.failure, Some(MockFailure::Stalled)) {
            Ok(decode_events(body.chain(futures::stream::pending())))
        } else {
            Ok(decode_events(body))
        }
    }
}

/// A summarizer that replays scripted replies and records every request.
///
/// With no scripted reply left it answers deterministically from the
/// request, so long runs don't need a reply per call.
#[derive(Debug, Default)]
pub struct StubSummarizer {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<SummaryRequest>>,
    fail: bool,
}

impl StubSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply.
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        lock(&self.replies).push_back(reply.into());
        self
    }

    /// Fail every call.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Requests received so far.
    pub fn calls(&self) -> Vec<SummaryRequest> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize(&self, request: SummaryRequest) -> Result<String, relay::Error> {
        lock(&self.calls).push(request.clone());

        if self.fail {
            return Err(relay::Error::Status {
                status: 503,
                message: "summarizer unavailable".to_string(),
            });
        }
        if let Some(reply) = lock(&self.replies).pop_front() {
            return Ok(reply);
        }
        Ok(match request {
            SummaryRequest::ExtractAnchor { title, .. } => format!("{title}结束"),
            SummaryRequest::Compact { ledger, mode } => {
                format!("{mode:?}总结{}条", ledger.lines().count())
            }
        })
    }
}

/// A backend that serves scripted streams in order.
#[derive(Debug, Default)]
pub struct MockBackend {
    streams: Mutex<VecDeque<MockStream>>,
    requests: Mutex<Vec<GenerateRequest>>,
    summarizer: StubSummarizer,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a stream.
    pub fn with_stream(self, stream: MockStream) -> Self {
        self.queue_stream(stream);
        self
    }

    pub fn with_summarizer(mut self, summarizer: StubSummarizer) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn queue_stream(&self, stream: MockStream) {
        lock(&self.streams).push_back(stream);
    }

    /// Generation requests received so far.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        lock(&self.requests).clone()
    }

    pub fn summarizer(&self) -> &StubSummarizer {
        &self.summarizer
    }
}

#[async_trait]
impl Summarizer for MockBackend {
    async fn summarize(&self, request: SummaryRequest) -> Result<String, relay::Error> {
        self.summarizer.summarize(request).await
    }
}

#[async_trait]
impl StoryBackend for MockBackend {
    async fn open_stream(&self, request: &GenerateRequest) -> Result<EventStream, relay::Error> {
        lock(&self.requests).push(request.clone());
        let stream = lock(&self.streams).pop_front();
        match stream {
            Some(stream) => stream.open(),
            None => Err(relay::Error::Config(
                "no more scripted streams".to_string(),
            )),
        }
    }
}

/// A backend that streams a built-in opening chapter, for running without
/// a relay.
pub fn demo_backend() -> MockBackend {
    MockBackend::new().with_stream(demo_stream())
}

fn demo_stream() -> MockStream {
    MockStream::new()
        .title("第一章 神秘的邀请函")
        .content("夜色如墨，雨丝斜织。林默站在老旧公寓的窗前，手中握着一封泛黄的信封。")
        .content("信封上没有寄件人姓名，只有一行娟秀的小字：\u{201c}致命运的编织者\u{201d}。\n\n")
        .content("他轻轻拆开信封，一张羊皮纸滑落而出。纸张边缘已经磨损，上面用暗红色墨水写着一段话：\n\n")
        .content("\u{201c}当月光与影子重叠之时，古老的图书馆将向你敞开大门。那里藏着改变一切的秘密，但记住，选择即代价。\u{201d}\n\n")
        .content("林默的心跳突然加快。这封信，和三年前父亲失踪前留下的最后一句话一模一样。\n\n")
        .content("窗外，一道闪电划破夜空，照亮了对面大楼玻璃幕墙上的倒影。那里，似乎有一个模糊的人影正注视着他。")
        .event(
            "branches",
            json!(json!([
                "跟随神秘人影的指引，前往对面大楼",
                "仔细研究信件，寻找隐藏的线索",
                "联系老朋友，询问关于父亲失踪的往事"
            ])
            .to_string()),
        )
        .node_update("林默收到与父亲失踪有关的神秘信件")
        .event("complete", Value::Null)
        .chunked(7)
}

/// Test harness for running reading scenarios.
pub struct StoryHarness {
    /// The mock backend.
    pub backend: MockBackend,
    /// The story session.
    pub session: StorySession,
    /// Every update observed so far.
    pub updates: Vec<GenerationUpdate>,
}

impl StoryHarness {
    /// Create a harness with the default session config.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            backend: MockBackend::new(),
            session: StorySession::new("Test Story", config),
            updates: Vec::new(),
        }
    }

    /// Queue a stream for the next generation.
    pub fn expect_stream(&mut self, stream: MockStream) -> &mut Self {
        self.backend.queue_stream(stream);
        self
    }

    /// Queue a well-formed chapter.
    pub fn expect_chapter(&mut self, title: &str, content: &str, branches: &[&str]) -> &mut Self {
        self.expect_stream(
            MockStream::new()
                .title(title)
                .content(content)
                .branches(branches),
        )
    }

    /// Generate the next chapter, taking `choice` from the previous one.
    pub async fn next(&mut self, choice: Option<&str>) -> Result<&Chapter, SessionError> {
        let updates = &mut self.updates;
        let mut observer = |update: GenerationUpdate| updates.push(update);
        self.session
            .generate_next(
                &self.backend,
                StorySettings::default(),
                UserPreferences::default(),
                choice,
                &mut observer,
            )
            .await
    }

    /// Apply the pending ledger update.
    pub async fn settle(&mut self) -> Result<bool, SessionError> {
        self.session.settle_ledger(&self.backend).await
    }

    /// Texts shown to the reader, in order.
    pub fn displayed(&self) -> Vec<&str> {
        self.updates
            .iter()
            .filter_map(|u| match u {
                GenerationUpdate::Display(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn chapter_count(&self) -> usize {
        self.session.chapters().len()
    }
}

impl Default for StoryHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the session holds exactly `count` chapters.
#[track_caller]
pub fn assert_chapter_count(harness: &StoryHarness, count: usize) {
    let actual = harness.chapter_count();
    assert_eq!(actual, count, "Expected {count} chapters, got {actual}");
}

/// Assert the ledger consists of exactly these entries.
#[track_caller]
pub fn assert_ledger(harness: &StoryHarness, expected: &[LedgerEntry]) {
    assert_eq!(
        harness.session.ledger().entries(),
        expected,
        "Unexpected ledger:\n{}",
        harness.session.ledger()
    );
}

/// Assert no displayed text ever contained `needle`.
#[track_caller]
pub fn assert_never_displayed(harness: &StoryHarness, needle: &str) {
    if let Some(text) = harness.displayed().into_iter().find(|t| t.contains(needle)) {
        panic!("Expected '{needle}' to never be displayed, but it was shown in:\n{text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay::StreamEvent;

    #[tokio::test]
    async fn test_mock_stream_survives_tiny_chunks() {
        let stream = MockStream::new()
            .title("雨夜")
            .content("夜色如墨")
            .chunked(1)
            .open()
            .unwrap();
        let events: Vec<_> = stream.collect().await;
        let events: Vec<StreamEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::Title("雨夜".into()),
                StreamEvent::Content("夜色如墨".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stub_summarizer_replies_then_falls_back() {
        let stub = StubSummarizer::new().with_reply("第一条");
        let request = SummaryRequest::ExtractAnchor {
            title: "雨夜".into(),
            content: "正文".into(),
        };
        assert_eq!(stub.summarize(request.clone()).await.unwrap(), "第一条");
        assert_eq!(stub.summarize(request).await.unwrap(), "雨夜结束");
        assert_eq!(stub.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_backend_runs_out() {
        let backend = MockBackend::new();
        let err = backend.open_stream(&GenerateRequest::new(1)).await.err().unwrap();
        assert!(matches!(err, relay::Error::Stream(_)));
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_demo_backend_chapter() {
        let mut harness = StoryHarness::new();
        harness.backend = demo_backend();

        let chapter = harness.next(None).await.unwrap();
        assert_eq!(chapter.title(), "第一章 神秘的邀请函");
        assert!(chapter.content().starts_with("夜色如墨"));
        assert!(chapter.content().ends_with("正注视着他。"));
        assert_eq!(chapter.branches()[1].text, "仔细研究信件，寻找隐藏的线索");

        assert!(harness.settle().await.unwrap());
        assert_ledger(
            &harness,
            &[LedgerEntry::Anchor("林默收到与父亲失踪有关的神秘信件".into())],
        );
    }

    #[tokio::test]
    async fn test_harness_multiple_chapters() {
        let mut harness = StoryHarness::new();
        harness
            .expect_chapter("一", "甲", &["a", "b", "c"])
            .expect_chapter("二", "乙", &["d", "e", "f"]);

        harness.next(None).await.unwrap();
        harness.next(Some("b")).await.unwrap();

        assert_chapter_count(&harness, 2);
        assert_eq!(harness.session.chapters()[0].selected_branch(), Some("b"));
        assert_eq!(harness.backend.requests()[1].chosen_branch.as_deref(), Some("b"));
        assert!(harness.next(None).await.is_err());
        assert_chapter_count(&harness, 2);
    }

    #[tokio::test]
    async fn test_exhausted_backend_reports_config_error() {
        let backend = MockBackend::new();
        match backend.open_stream(&GenerateRequest::new(1)).await {
            Err(relay::Error::Config(message)) => assert!(message.contains("scripted")),
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("expected an exhausted backend"),
        }
    }
}
