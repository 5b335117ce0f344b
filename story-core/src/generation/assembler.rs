//! Turning the accumulated state into a finished chapter.

use super::accumulator::AccumulatedGeneration;
use super::GenerationError;
use crate::chapter::{GenerateResult, BRANCH_COUNT};

/// Title used when the stream never sent one.
pub fn fallback_title(chapter_index: u32) -> String {
    format!("第 {chapter_index} 章")
}

/// Finalize a completed stream.
///
/// Fails with `StreamEnded` when no displayable content is left. Missing
/// branch slots become empty strings; a wholly absent payload is replaced by
/// `default_branches`.
pub fn assemble(
    acc: &AccumulatedGeneration,
    fallback_title: &str,
    default_branches: &[String; BRANCH_COUNT],
) -> Result<GenerateResult, GenerationError> {
    let content = acc.visible().trim().to_string();
    if content.is_empty() {
        return Err(GenerationError::StreamEnded);
    }

    let title = acc
        .title()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(fallback_title)
        .to_string();

    let branches = match acc.branches() {
        Some(observed) => {
            std::array::from_fn(|i| observed.get(i).cloned().unwrap_or_default())
        }
        None => default_branches.clone(),
    };

    Ok(GenerateResult {
        title,
        content,
        branches,
    })
}
