//! StorySession - the primary public API for reading a branching story.
//!
//! Wraps the chapter list, the reader's branch path, and the anchor ledger,
//! and enforces that only one chapter is generated at a time.

use crate::backend::{StoryBackend, Summarizer};
use crate::chapter::{Chapter, GenerateResult, BRANCH_COUNT, DEFAULT_BRANCHES};
use crate::generation::{generate_chapter, GenerationError, GenerationObserver, GenerationUpdate};
use crate::memory::{append_anchor, AnchorLedger, CompactionError, CompactionPolicy};
use crate::persist::{PersistError, SavedStory};
use relay::{GenerateRequest, StorySettings, SummaryRequest, UserPreferences};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors from StorySession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("A chapter is already being generated")]
    AlreadyGenerating,

    #[error("Generation ticket does not belong to the current generation")]
    StaleTicket,

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Ledger update failed: {0}")]
    Compaction(#[from] CompactionError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

/// Configuration for a story session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Branches offered when the relay sends none.
    pub default_branches: [String; BRANCH_COUNT],

    /// Ledger compaction thresholds.
    pub compaction: CompactionPolicy,

    /// How many recent chapters go into the context digest.
    pub context_chapters: usize,

    /// Characters of each chapter quoted in the digest.
    pub context_excerpt_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_branches: DEFAULT_BRANCHES.map(String::from),
            compaction: CompactionPolicy::default(),
            context_chapters: 3,
            context_excerpt_chars: 200,
        }
    }
}

impl SessionConfig {
    pub fn with_default_branches(mut self, branches: [String; BRANCH_COUNT]) -> Self {
        self.default_branches = branches;
        self
    }

    pub fn with_compaction(mut self, policy: CompactionPolicy) -> Self {
        self.compaction = policy;
        self
    }

    pub fn with_context_chapters(mut self, chapters: usize) -> Self {
        self.context_chapters = chapters;
        self
    }

    pub fn with_context_excerpt_chars(mut self, chars: usize) -> Self {
        self.context_excerpt_chars = chars;
        self
    }
}

/// Proof that the holder started the in-flight generation.
///
/// Not `Clone`: a ticket is spent by finishing or aborting.
#[derive(Debug)]
#[must_use = "a generation ticket must be finished or aborted"]
pub struct GenerationTicket {
    session: Uuid,
    serial: u64,
    chapter_index: u32,
}

impl GenerationTicket {
    /// Index of the chapter being generated.
    pub fn chapter_index(&self) -> u32 {
        self.chapter_index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationState {
    Idle,
    Generating(u64),
}

/// A ledger update owed for a finished chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAnchor {
    pub chapter_id: Uuid,
    /// Anchor sent by the relay during generation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// A branching story in progress.
pub struct StorySession {
    id: Uuid,
    title: String,
    chapters: Vec<Chapter>,
    branch_path: Vec<Uuid>,
    ledger: AnchorLedger,
    pending_anchor: Option<PendingAnchor>,
    state: GenerationState,
    next_serial: u64,
    config: SessionConfig,
}

impl StorySession {
    /// Start an empty story.
    pub fn new(title: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            chapters: Vec::new(),
            branch_path: Vec::new(),
            ledger: AnchorLedger::new(),
            pending_anchor: None,
            state: GenerationState::Idle,
            next_serial: 0,
            config,
        }
    }

    /// Seed the ledger with hand-written plot nodes.
    pub fn with_story_nodes(mut self, text: &str) -> Self {
        self.ledger = AnchorLedger::parse(text);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn latest_chapter(&self) -> Option<&Chapter> {
        self.chapters.last()
    }

    /// Ids of the chapters in reading order.
    pub fn branch_path(&self) -> &[Uuid] {
        &self.branch_path
    }

    pub fn ledger(&self) -> &AnchorLedger {
        &self.ledger
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_generating(&self) -> bool {
        matches!(self.state, GenerationState::Generating(_))
    }

    /// Whether a finished chapter still owes its ledger update.
    pub fn has_pending_anchor(&self) -> bool {
        self.pending_anchor.is_some()
    }

    /// Claim the generation slot for the next chapter.
    pub fn begin_generation(&mut self) -> Result<GenerationTicket, SessionError> {
        if self.is_generating() {
            return Err(SessionError::AlreadyGenerating);
        }
        self.next_serial += 1;
        self.state = GenerationState::Generating(self.next_serial);
        Ok(GenerationTicket {
            session: self.id,
            serial: self.next_serial,
            chapter_index: self.next_chapter_index(),
        })
    }

    /// Append the finished chapter and release the slot.
    pub fn finish_generation(
        &mut self,
        ticket: GenerationTicket,
        result: GenerateResult,
    ) -> Result<&Chapter, SessionError> {
        self.commit(ticket, result, None)
    }

    /// Release the slot without appending anything.
    pub fn abort_generation(&mut self, ticket: GenerationTicket) -> Result<(), SessionError> {
        self.check_ticket(&ticket)?;
        self.state = GenerationState::Idle;
        debug!(chapter = ticket.chapter_index, "generation aborted");
        Ok(())
    }

    /// Record the branch the reader took from the latest chapter.
    ///
    /// Returns false if there is no chapter or a choice was already made.
    pub fn record_choice(&mut self, choice: &str) -> bool {
        match self.chapters.last_mut() {
            Some(chapter) => chapter.select_branch(choice),
            None => false,
        }
    }

    /// Short digest of the most recent chapters for the next prompt.
    pub fn context_digest(&self) -> Option<String> {
        let start = self.chapters.len().saturating_sub(self.config.context_chapters);
        let lines: Vec<String> = self.chapters[start..]
            .iter()
            .map(|chapter| {
                let excerpt: String = chapter
                    .content()
                    .chars()
                    .take(self.config.context_excerpt_chars)
                    .collect();
                let ellipsis = if excerpt.len() < chapter.content().len() {
                    "…"
                } else {
                    ""
                };
                format!("【{}】{excerpt}{ellipsis}", chapter.title())
            })
            .collect();

        (!lines.is_empty()).then(|| lines.join("\n"))
    }

    /// Generate, finalize, and append the next chapter.
    ///
    /// A ledger update still owed by the previous chapter is settled first;
    /// if it fails, that update is dropped and generation goes ahead. The
    /// chosen branch is recorded on the previous chapter only once the new
    /// chapter is appended. Dropping the returned future cancels the
    /// generation and frees the session for the next attempt.
    pub async fn generate_next<B, O>(
        &mut self,
        backend: &B,
        settings: StorySettings,
        preferences: UserPreferences,
        chosen_branch: Option<&str>,
        observer: &mut O,
    ) -> Result<&Chapter, SessionError>
    where
        B: StoryBackend + ?Sized,
        O: GenerationObserver + ?Sized,
    {
        if self.is_generating() {
            return Err(SessionError::AlreadyGenerating);
        }
        if let Err(e) = self.settle_ledger(backend).await {
            warn!(error = %e, "skipping ledger update for previous chapter");
        }

        let ticket = self.begin_generation()?;
        let request = self.build_request(&ticket, settings, preferences, chosen_branch);

        // Dropping this future mid-stream releases the slot through the guard.
        let slot = GenerationSlot {
            state: &mut self.state,
            serial: ticket.serial,
            armed: true,
        };
        let mut tap = AnchorTap {
            inner: observer,
            anchor: None,
        };
        let generated = generate_chapter(
            backend,
            &request,
            &self.config.default_branches,
            &mut tap,
        )
        .await;
        let hint = tap.anchor;
        slot.release();

        match generated {
            Ok(result) => {
                if let Some(choice) = chosen_branch {
                    self.record_choice(choice);
                }
                self.commit(ticket, result, hint)
            }
            Err(e) => {
                self.abort_generation(ticket)?;
                Err(e.into())
            }
        }
    }

    /// Fold the latest chapter's anchor into the ledger.
    ///
    /// On failure the ledger keeps its previous contents and the update is
    /// dropped. Returns whether an anchor was committed.
    pub async fn settle_ledger<S>(&mut self, summarizer: &S) -> Result<bool, SessionError>
    where
        S: Summarizer + ?Sized,
    {
        let Some(pending) = self.pending_anchor.take() else {
            return Ok(false);
        };
        let Some(chapter) = self.chapters.iter().find(|c| c.id() == pending.chapter_id) else {
            warn!(chapter_id = %pending.chapter_id, "pending anchor refers to an unknown chapter");
            return Ok(false);
        };

        let line = match pending.hint.filter(|h| !h.trim().is_empty()) {
            Some(hint) => hint,
            None => summarizer
                .summarize(SummaryRequest::ExtractAnchor {
                    title: chapter.title().to_string(),
                    content: chapter.content().to_string(),
                })
                .await
                .map_err(CompactionError::from)?,
        };

        let outcome = append_anchor(&self.ledger, &line, &self.config.compaction, summarizer).await?;
        info!(
            chapter = chapter.index(),
            entries = outcome.ledger.len(),
            chars = outcome.ledger.char_len(),
            phase = outcome.phase_compacted,
            global = outcome.global_compacted,
            "ledger updated"
        );
        self.ledger = outcome.ledger;
        Ok(true)
    }

    /// Save the story to a JSON file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let saved = SavedStory::new(
            self.id,
            self.title.clone(),
            self.chapters.clone(),
            self.branch_path.clone(),
            self.ledger.clone(),
            self.pending_anchor.clone(),
        );
        saved.save_json(path).await?;
        Ok(())
    }

    /// Load a saved story.
    pub async fn load(path: impl AsRef<Path>, config: SessionConfig) -> Result<Self, SessionError> {
        let saved = SavedStory::load_json(path).await?;
        Ok(Self {
            id: saved.id,
            title: saved.title,
            chapters: saved.chapters,
            branch_path: saved.branch_path,
            ledger: saved.ledger,
            pending_anchor: saved.pending_anchor,
            state: GenerationState::Idle,
            next_serial: 0,
            config,
        })
    }

    fn next_chapter_index(&self) -> u32 {
        self.chapters.len() as u32 + 1
    }

    fn check_ticket(&self, ticket: &GenerationTicket) -> Result<(), SessionError> {
        match self.state {
            GenerationState::Generating(serial)
                if serial == ticket.serial && ticket.session == self.id =>
            {
                Ok(())
            }
            _ => Err(SessionError::StaleTicket),
        }
    }

    fn build_request(
        &self,
        ticket: &GenerationTicket,
        settings: StorySettings,
        preferences: UserPreferences,
        chosen_branch: Option<&str>,
    ) -> GenerateRequest {
        let settings = StorySettings {
            story_nodes: self.ledger.as_prompt_text(),
            ..settings
        };
        let mut request = GenerateRequest::new(ticket.chapter_index)
            .with_settings(settings)
            .with_preferences(preferences);
        request.context_summary = self.context_digest();
        request.chosen_branch = chosen_branch.map(str::to_string);
        request
    }

    fn commit(
        &mut self,
        ticket: GenerationTicket,
        result: GenerateResult,
        hint: Option<String>,
    ) -> Result<&Chapter, SessionError> {
        self.check_ticket(&ticket)?;
        self.state = GenerationState::Idle;

        let chapter = Chapter::from_result(ticket.chapter_index, result);
        if let Some(previous) = self.pending_anchor.take() {
            warn!(chapter_id = %previous.chapter_id, "dropping unsettled ledger update");
        }
        self.pending_anchor = Some(PendingAnchor {
            chapter_id: chapter.id(),
            hint,
        });
        self.branch_path.push(chapter.id());
        self.chapters.push(chapter);

        let chapter = &self.chapters[self.chapters.len() - 1];
        info!(chapter = chapter.index(), title = chapter.title(), "chapter appended");
        Ok(chapter)
    }
}

/// Holds the generation slot while a chapter streams in.
///
/// Resets the session to idle when dropped without `release`.
struct GenerationSlot<'a> {
    state: &'a mut GenerationState,
    serial: u64,
    armed: bool,
}

impl GenerationSlot<'_> {
    fn release(mut self) {
        self.armed = false;
    }
}

impl Drop for GenerationSlot<'_> {
    fn drop(&mut self) {
        if self.armed && *self.state == GenerationState::Generating(self.serial) {
            *self.state = GenerationState::Idle;
            debug!(serial = self.serial, "generation cancelled");
        }
    }
}

/// Passes updates through while keeping the relay's anchor line.
struct AnchorTap<'a, O: ?Sized> {
    inner: &'a mut O,
    anchor: Option<String>,
}

impl<O> GenerationObserver for AnchorTap<'_, O>
where
    O: GenerationObserver + ?Sized,
{
    fn on_update(&mut self, update: GenerationUpdate) {
        if let GenerationUpdate::NodeUpdate(ref anchor) = update {
            self.anchor = Some(anchor.clone());
        }
        self.inner.on_update(update);
    }
}
