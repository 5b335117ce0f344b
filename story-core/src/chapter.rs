//! Chapters and their branch options.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every chapter ends with exactly this many branch options.
pub const BRANCH_COUNT: usize = 3;

/// Branches used when the relay never sent any.
pub const DEFAULT_BRANCHES: [&str; BRANCH_COUNT] = ["继续探索", "停下休息", "仔细观察四周"];

/// The finished output of one generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResult {
    pub title: String,
    pub content: String,
    pub branches: [String; BRANCH_COUNT],
}

/// One of the options offered at the end of a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub is_custom: bool,
}

/// A chapter of the story.
///
/// Content is fixed at creation. The only later change is recording which
/// branch the reader took, and that happens at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    id: Uuid,
    index: u32,
    title: String,
    content: String,
    branches: [BranchOption; BRANCH_COUNT],
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selected_branch: Option<String>,
}

impl Chapter {
    /// Build chapter `index` (1-based) from a generation result.
    pub fn from_result(index: u32, result: GenerateResult) -> Self {
        let branches = std::array::from_fn(|i| BranchOption {
            id: format!("b_{i}"),
            text: result.branches[i].clone(),
            is_custom: false,
        });

        Self {
            id: Uuid::new_v4(),
            index,
            title: result.title,
            content: result.content,
            branches,
            created_at: Utc::now(),
            selected_branch: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn branches(&self) -> &[BranchOption; BRANCH_COUNT] {
        &self.branches
    }

    /// Texts of the non-empty branch options.
    pub fn branch_texts(&self) -> impl Iterator<Item = &str> {
        self.branches
            .iter()
            .map(|b| b.text.as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn selected_branch(&self) -> Option<&str> {
        self.selected_branch.as_deref()
    }

    /// Record the reader's choice. Returns false if one was already recorded.
    pub fn select_branch(&mut self, choice: impl Into<String>) -> bool {
        if self.selected_branch.is_some() {
            return false;
        }
        self.selected_branch = Some(choice.into());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> GenerateResult {
        GenerateResult {
            title: "第 1 章".to_string(),
            content: "夜色如墨。".to_string(),
            branches: ["跟随人影".to_string(), "研究信件".to_string(), String::new()],
        }
    }

    #[test]
    fn test_from_result_keeps_three_slots() {
        let chapter = Chapter::from_result(1, result());
        assert_eq!(chapter.index(), 1);
        assert_eq!(chapter.branches().len(), BRANCH_COUNT);
        assert_eq!(chapter.branches()[0].id, "b_0");
        assert_eq!(chapter.branches()[2].id, "b_2");
        assert_eq!(chapter.branches()[2].text, "");
        assert_eq!(chapter.branch_texts().count(), 2);
    }

    #[test]
    fn test_select_branch_once() {
        let mut chapter = Chapter::from_result(1, result());
        assert!(chapter.select_branch("研究信件"));
        assert!(!chapter.select_branch("跟随人影"));
        assert_eq!(chapter.selected_branch(), Some("研究信件"));
    }

    #[test]
    fn test_serde_shape() {
        let chapter = Chapter::from_result(2, result());
        let value = serde_json::to_value(&chapter).unwrap();
        assert_eq!(value["index"], 2);
        assert!(value.get("createdAt").is_some());
        assert!(value.get("selectedBranch").is_none());
        assert_eq!(value["branches"][1]["isCustom"], false);

        let back: Chapter = serde_json::from_value(value).unwrap();
        assert_eq!(back, chapter);
    }
}
