//! Branching story engine on top of the story relay.
//!
//! This crate provides:
//! - Chapter generation from the relay's event stream, with the trailing
//!   branch menu located and cut from the prose as it streams
//! - A bounded plot anchor ledger with two-tier compaction
//! - Story sessions with one-at-a-time generation
//! - Story persistence and plain-text export
//!
//! # Quick Start
//!
//! ```ignore
//! use relay::{Relay, StorySettings, UserPreferences};
//! use story_core::{SessionConfig, StorySession, GenerationUpdate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let relay = Relay::from_env()?;
//!     let mut session = StorySession::new("雨夜来信", SessionConfig::default());
//!
//!     let chapter = session
//!         .generate_next(
//!             &relay,
//!             StorySettings::default().with_worldview("雾都"),
//!             UserPreferences::default(),
//!             None,
//!             &mut |update: GenerationUpdate| println!("{update:?}"),
//!         )
//!         .await?;
//!     println!("{}", chapter.content());
//!
//!     session.save("story.json").await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod chapter;
pub mod export;
pub mod generation;
pub mod memory;
pub mod persist;
pub mod session;
pub mod testing;

// Primary public API
pub use backend::{StoryBackend, Summarizer};
pub use chapter::{BranchOption, Chapter, GenerateResult, BRANCH_COUNT, DEFAULT_BRANCHES};
pub use export::export_text;
pub use generation::{
    generate_chapter, AccumulatedGeneration, GenerationError, GenerationObserver,
    GenerationUpdate, SentinelDetector,
};
pub use memory::{append_anchor, AnchorLedger, CompactionError, CompactionPolicy, LedgerEntry};
pub use persist::{PersistError, SavedStory};
pub use session::{GenerationTicket, SessionConfig, SessionError, StorySession};
pub use testing::{MockBackend, MockStream, StoryHarness, StubSummarizer};
