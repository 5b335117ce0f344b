//! The plot anchor ledger.
//!
//! Stored and sent to the relay as plain text, one entry per line. Summary
//! lines carry a bracketed tag so they can be told apart after a round trip.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Prefix of a line produced by phase compaction.
pub const PHASE_TAG: &str = "【阶段总结】";

/// Prefix of a line produced by global compaction.
pub const GLOBAL_TAG: &str = "【全局总结】";

/// One line of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
    /// A single irreversible fact about one chapter.
    Anchor(String),
    /// Summary of a run of anchors.
    Phase(String),
    /// Summary of the whole ledger.
    Global(String),
}

impl LedgerEntry {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(PHASE_TAG) {
            LedgerEntry::Phase(rest.trim().to_string())
        } else if let Some(rest) = line.strip_prefix(GLOBAL_TAG) {
            LedgerEntry::Global(rest.trim().to_string())
        } else {
            LedgerEntry::Anchor(line.to_string())
        }
    }

    pub fn is_summary(&self) -> bool {
        !matches!(self, LedgerEntry::Anchor(_))
    }

    /// The entry's text without its tag.
    pub fn text(&self) -> &str {
        match self {
            LedgerEntry::Anchor(text) | LedgerEntry::Phase(text) | LedgerEntry::Global(text) => {
                text
            }
        }
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerEntry::Anchor(text) => f.write_str(text),
            LedgerEntry::Phase(text) => write!(f, "{PHASE_TAG}{text}"),
            LedgerEntry::Global(text) => write!(f, "{GLOBAL_TAG}{text}"),
        }
    }
}

/// Ordered ledger of anchors and summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorLedger {
    entries: Vec<LedgerEntry>,
}

impl AnchorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse newline-delimited ledger text. Blank lines are dropped.
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(LedgerEntry::parse)
            .collect();
        Self { entries }
    }

    pub(crate) fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of plain anchor lines.
    pub fn normal_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_summary()).count()
    }

    /// Length of the ledger text in characters, separators included.
    pub fn char_len(&self) -> usize {
        self.to_string().chars().count()
    }

    /// The ledger text, or `None` when empty.
    pub fn as_prompt_text(&self) -> Option<String> {
        (!self.is_empty()).then(|| self.to_string())
    }
}

impl fmt::Display for AnchorLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

impl Serialize for AnchorLedger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AnchorLedger {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::parse(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        let ledger = AnchorLedger::parse("【全局总结】林默离开雾都\n\n【阶段总结】找到信\n父亲失踪\n");
        assert_eq!(
            ledger.entries(),
            &[
                LedgerEntry::Global("林默离开雾都".into()),
                LedgerEntry::Phase("找到信".into()),
                LedgerEntry::Anchor("父亲失踪".into()),
            ]
        );
        assert_eq!(ledger.normal_count(), 1);
        assert_eq!(ledger.entries()[1].text(), "找到信");
    }

    #[test]
    fn test_display_round_trip() {
        let text = "【阶段总结】找到信\n父亲失踪\n林默出发";
        let ledger = AnchorLedger::parse(text);
        assert_eq!(ledger.to_string(), text);
        assert_eq!(AnchorLedger::parse(&ledger.to_string()), ledger);
    }

    #[test]
    fn test_char_len_counts_characters() {
        let ledger = AnchorLedger::parse("甲乙\n丙");
        assert_eq!(ledger.char_len(), 4);
        assert_eq!(AnchorLedger::new().char_len(), 0);
    }

    #[test]
    fn test_serializes_as_text() {
        let ledger = AnchorLedger::parse("a\nb");
        assert_eq!(serde_json::to_string(&ledger).unwrap(), "\"a\\nb\"");
        let back: AnchorLedger = serde_json::from_str("\"a\\nb\"").unwrap();
        assert_eq!(back, ledger);
    }

    #[test]
    fn test_prompt_text() {
        assert_eq!(AnchorLedger::new().as_prompt_text(), None);
        assert_eq!(AnchorLedger::parse("a").as_prompt_text().as_deref(), Some("a"));
    }
}
