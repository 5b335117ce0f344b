//! Streaming one chapter from the relay.
//!
//! Events flow from the backend into an [`AccumulatedGeneration`], which
//! keeps the working title and text, locates the trailing branch menu, and
//! reports progress to a [`GenerationObserver`]. When the stream ends the
//! state is finalized by [`assemble`].

mod accumulator;
mod annotations;
mod assembler;
mod detector;

pub use accumulator::{AccumulatedGeneration, GenerationObserver, GenerationUpdate};
pub use annotations::strip_annotations;
pub use assembler::{assemble, fallback_title};
pub use detector::{SentinelDetector, MIN_DETECT_CHARS};

use crate::backend::StoryBackend;
use crate::chapter::{GenerateResult, BRANCH_COUNT};
use futures::StreamExt;
use relay::GenerateRequest;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that end a generation. Partial text is never returned with one.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The relay reported a failure mid-stream.
    #[error("{0}")]
    Stream(String),

    #[error("Generation timed out")]
    Timeout,

    #[error("Could not reach the story relay: {0}")]
    Connection(String),

    #[error("Relay error: {0}")]
    Relay(relay::Error),

    /// Nothing displayable was left once the stream ended, even if a title arrived.
    #[error("Stream ended without any chapter text")]
    StreamEnded,
}

impl GenerationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GenerationError::Timeout)
    }
}

impl From<relay::Error> for GenerationError {
    fn from(e: relay::Error) -> Self {
        match e {
            relay::Error::Timeout => GenerationError::Timeout,
            relay::Error::Connect(message) => GenerationError::Connection(message),
            relay::Error::Stream(message) => GenerationError::Stream(message),
            other => GenerationError::Relay(other),
        }
    }
}

/// Stream one chapter and finalize it.
///
/// Dropping the returned future cancels the request and discards whatever
/// had accumulated.
pub async fn generate_chapter<B, O>(
    backend: &B,
    request: &GenerateRequest,
    default_branches: &[String; BRANCH_COUNT],
    observer: &mut O,
) -> Result<GenerateResult, GenerationError>
where
    B: StoryBackend + ?Sized,
    O: GenerationObserver + ?Sized,
{
    let chapter = request.next_chapter_index;
    let mut events = backend.open_stream(request).await?;
    let mut acc = AccumulatedGeneration::default();

    while let Some(event) = events.next().await {
        if let Err(e) = acc.dispatch(event?, &mut *observer) {
            warn!(chapter, error = %e, "generation failed mid-stream");
            return Err(e);
        }
    }

    let result = assemble(&acc, &fallback_title(chapter), default_branches)?;
    info!(
        chapter,
        chars = result.content.chars().count(),
        frozen = acc.frozen_at().is_some(),
        "chapter complete"
    );
    Ok(result)
}
