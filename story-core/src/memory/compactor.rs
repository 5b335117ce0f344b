//! Two-tier ledger compaction.
//!
//! Anchors accumulate one per chapter. When too many plain anchors pile up
//! they are folded into a phase summary; when the whole ledger approaches
//! its size limit it is folded into a single global summary. Both folds are
//! summarization calls, never truncation.

use super::ledger::{AnchorLedger, LedgerEntry, GLOBAL_TAG, PHASE_TAG};
use crate::backend::Summarizer;
use relay::{CompactionMode, SummaryRequest};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_MAX_CHARS: usize = 1000;
pub const DEFAULT_PHASE_LINE_THRESHOLD: usize = 100;
pub const DEFAULT_GLOBAL_RATIO: f64 = 0.9;

/// Errors from a ledger update. The ledger is left untouched on any of them.
#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("Summarization failed: {0}")]
    Summarization(#[from] relay::Error),

    #[error("Summarizer returned an empty {0:?} summary")]
    EmptySummary(CompactionMode),
}

/// Thresholds that trigger compaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompactionPolicy {
    /// Size limit of the ledger text, in characters.
    pub max_chars: usize,
    /// Plain anchor count at which a phase summary is made.
    pub phase_line_threshold: usize,
    /// Fraction of `max_chars` at which a global summary is made.
    pub global_ratio: f64,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            phase_line_threshold: DEFAULT_PHASE_LINE_THRESHOLD,
            global_ratio: DEFAULT_GLOBAL_RATIO,
        }
    }
}

impl CompactionPolicy {
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn with_phase_line_threshold(mut self, lines: usize) -> Self {
        self.phase_line_threshold = lines;
        self
    }

    pub fn with_global_ratio(mut self, ratio: f64) -> Self {
        self.global_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Ledger length, in characters, at which global compaction runs.
    pub fn global_threshold(&self) -> usize {
        (self.max_chars as f64 * self.global_ratio).ceil() as usize
    }
}

/// Result of appending one anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendOutcome {
    pub ledger: AnchorLedger,
    pub phase_compacted: bool,
    pub global_compacted: bool,
}

/// Append `line` to `ledger`, compacting as the policy requires.
///
/// The input ledger is never modified; on error the caller keeps it as it
/// was. A blank line leaves the ledger unchanged.
pub async fn append_anchor<S>(
    ledger: &AnchorLedger,
    line: &str,
    policy: &CompactionPolicy,
    summarizer: &S,
) -> Result<AppendOutcome, CompactionError>
where
    S: Summarizer + ?Sized,
{
    let anchor = sanitize_anchor(line);
    if anchor.is_empty() {
        return Ok(AppendOutcome {
            ledger: ledger.clone(),
            phase_compacted: false,
            global_compacted: false,
        });
    }

    let mut entries = ledger.entries().to_vec();
    let mut phase_compacted = false;

    if ledger.normal_count() >= policy.phase_line_threshold {
        let (summaries, normals): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(LedgerEntry::is_summary);
        let text = join_lines(&normals);
        let summary = summarize(summarizer, text, CompactionMode::Phase).await?;
        info!(folded = normals.len(), "phase compaction");

        entries = summaries;
        entries.push(LedgerEntry::Phase(summary));
        phase_compacted = true;
    }

    entries.push(LedgerEntry::Anchor(anchor));
    let mut next = AnchorLedger::from_entries(entries);

    let mut global_compacted = false;
    if next.char_len() >= policy.global_threshold() {
        let before = next.char_len();
        let summary = summarize(summarizer, next.to_string(), CompactionMode::Global).await?;
        next = AnchorLedger::from_entries(vec![LedgerEntry::Global(summary)]);
        global_compacted = true;

        let after = next.char_len();
        info!(before, after, "global compaction");
        if after >= policy.max_chars {
            warn!(after, max = policy.max_chars, "global summary is still over the ledger limit");
        }
    }

    Ok(AppendOutcome {
        ledger: next,
        phase_compacted,
        global_compacted,
    })
}

async fn summarize<S>(
    summarizer: &S,
    ledger: String,
    mode: CompactionMode,
) -> Result<String, CompactionError>
where
    S: Summarizer + ?Sized,
{
    let summary = summarizer
        .summarize(SummaryRequest::Compact { ledger, mode })
        .await?;
    let summary = flatten(&summary);
    if summary.is_empty() {
        return Err(CompactionError::EmptySummary(mode));
    }
    Ok(summary)
}

fn join_lines(entries: &[LedgerEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse a multi-line reply onto one line.
fn flatten(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A plain anchor is one line and never carries a summary tag.
fn sanitize_anchor(line: &str) -> String {
    let mut anchor = flatten(line);
    loop {
        let stripped = anchor
            .strip_prefix(PHASE_TAG)
            .or_else(|| anchor.strip_prefix(GLOBAL_TAG))
            .map(|rest| rest.trim_start().to_string());
        match stripped {
            Some(rest) => anchor = rest,
            None => return anchor,
        }
    }
}
