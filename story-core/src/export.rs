//! Plain-text export of a story.

use crate::chapter::Chapter;
use chrono::{DateTime, Utc};

const HEAVY_RULE: usize = 50;
const LIGHT_RULE: usize = 30;

/// Render chapters as a shareable text document.
pub fn export_text(chapters: &[Chapter], exported_at: DateTime<Utc>) -> String {
    let mut out = format!(
        "📖 AI互动小说导出\n\n导出时间: {}\n总章节数: {}章\n\n{}\n\n",
        exported_at.format("%Y-%m-%d %H:%M:%S"),
        chapters.len(),
        "=".repeat(HEAVY_RULE)
    );

    for (i, chapter) in chapters.iter().enumerate() {
        if i > 0 {
            out.push_str(&format!("\n\n{}\n\n", "─".repeat(LIGHT_RULE)));
        }
        out.push_str(&format!(
            "第 {} 章 {}\n\n{}",
            chapter.index(),
            chapter.title(),
            chapter.content()
        ));
    }

    out.push_str(&format!(
        "\n\n{}\n\n📝 本故事由AIBook智能创作助手生成",
        "=".repeat(HEAVY_RULE)
    ));
    out
}
