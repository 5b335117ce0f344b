//! Seams to the story relay.
//!
//! The session only needs two things from the outside world: a stream of
//! events for a chapter, and one-line summaries. Both are traits so tests
//! and the demo mode can stand in for the HTTP client.

use async_trait::async_trait;
use relay::{EventStream, GenerateRequest, Relay, SummaryRequest};

/// Produces one-line summaries for anchors and ledger compaction.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: SummaryRequest) -> Result<String, relay::Error>;
}

/// Streams chapters. Every backend can also summarize.
#[async_trait]
pub trait StoryBackend: Summarizer {
    async fn open_stream(&self, request: &GenerateRequest) -> Result<EventStream, relay::Error>;
}

#[async_trait]
impl Summarizer for Relay {
    async fn summarize(&self, request: SummaryRequest) -> Result<String, relay::Error> {
        Relay::summarize(self, &request).await
    }
}

#[async_trait]
impl StoryBackend for Relay {
    async fn open_stream(&self, request: &GenerateRequest) -> Result<EventStream, relay::Error> {
        self.stream(request).await
    }
}
