//! Story persistence for save/load.

use crate::chapter::Chapter;
use crate::memory::AnchorLedger;
use crate::session::PendingAnchor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current save file version.
pub const SAVE_VERSION: u32 = 1;

/// A saved story with everything needed to keep reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedStory {
    /// Save format version for compatibility checking.
    pub version: u32,

    pub saved_at: DateTime<Utc>,

    pub id: Uuid,

    pub title: String,

    pub chapters: Vec<Chapter>,

    /// Chapter ids in reading order.
    pub branch_path: Vec<Uuid>,

    pub ledger: AnchorLedger,

    /// Ledger update not yet applied when the story was saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_anchor: Option<PendingAnchor>,
}

impl SavedStory {
    pub fn new(
        id: Uuid,
        title: String,
        chapters: Vec<Chapter>,
        branch_path: Vec<Uuid>,
        ledger: AnchorLedger,
        pending_anchor: Option<PendingAnchor>,
    ) -> Self {
        Self {
            version: SAVE_VERSION,
            saved_at: Utc::now(),
            id,
            title,
            chapters,
            branch_path,
            ledger,
            pending_anchor,
        }
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;

        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }

        Ok(saved)
    }
}

/// File name for a story's save, derived from its title.
pub fn save_path(base_dir: impl AsRef<Path>, title: &str) -> std::path::PathBuf {
    let sanitized = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>();
    base_dir.as_ref().join(format!("{sanitized}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapter::GenerateResult;

    fn story() -> SavedStory {
        let chapter = Chapter::from_result(
            1,
            GenerateResult {
                title: "第一章".into(),
                content: "夜色如墨。".into(),
                branches: ["甲".into(), "乙".into(), "".into()],
            },
        );
        let id = chapter.id();
        SavedStory::new(
            Uuid::new_v4(),
            "雨夜".into(),
            vec![chapter],
            vec![id],
            AnchorLedger::parse("【阶段总结】序幕\n父亲失踪"),
            Some(PendingAnchor {
                chapter_id: id,
                hint: None,
            }),
        )
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("story.json");
        let saved = story();

        saved.save_json(&path).await.unwrap();
        let loaded = SavedStory::load_json(&path).await.unwrap();

        assert_eq!(loaded.id, saved.id);
        assert_eq!(loaded.chapters, saved.chapters);
        assert_eq!(loaded.branch_path, saved.branch_path);
        assert_eq!(loaded.ledger, saved.ledger);
        assert_eq!(loaded.pending_anchor, saved.pending_anchor);
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        let mut saved = story();
        saved.version = 99;
        saved.save_json(&path).await.unwrap();

        let err = SavedStory::load_json(&path).await.unwrap_err();
        assert!(matches!(
            err,
            PersistError::VersionMismatch {
                expected: 1,
                found: 99
            }
        ));
    }

    #[test]
    fn test_ledger_is_stored_as_text() {
        let value = serde_json::to_value(story()).unwrap();
        assert_eq!(value["ledger"], "【阶段总结】序幕\n父亲失踪");
        assert!(value.get("savedAt").is_some());
    }

    #[test]
    fn test_save_path() {
        let path = save_path("/tmp", "雨夜: 来信");
        assert_eq!(path, std::path::Path::new("/tmp/雨夜__来信.json"));
    }
}
