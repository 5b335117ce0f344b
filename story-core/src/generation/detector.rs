//! Locating the branch menu at the end of a streamed chapter.
//!
//! The model is asked to finish each chapter with three options and a
//! one-line summary, but that control text arrives in the same free-text
//! stream as the prose. The detector looks for the two shapes this text
//! usually takes: a guidance phrase ("请选择：", "What will you do next:")
//! and an enumerated list ("选项A：", "1.", "①、"). Whichever starts first
//! marks where the prose ends.
//!
//! This is pattern matching over unstructured text and can miss; the
//! `branches` event is the backstop (see `AccumulatedGeneration`).

use once_cell::sync::Lazy;
use regex::Regex;

/// Below this many characters the buffer is not scanned at all.
pub const MIN_DETECT_CHARS: usize = 200;

static GUIDANCE_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:请选择|请做出(?:你的)?选择|选择(?:你的)?下一步|下一步(?:行动|选择)|接下来(?:你|主角)?(?:会|要)?(?:怎么做|如何选择)|你的选择|可选(?:行动|分支)|choose\s+(?:your\s+)?next|what\s+will\s+you\s+do|your\s+(?:choices|options)|SUMMARY)[^\n:：]{0,10}[:：]",
    )
    .expect("invalid guidance regex")
});

static ENUMERATED_OPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)(?:^[ \t]*|[|｜][ \t]*)(?:选项|Option[ \t]*)?(?:[A-Ca-c]|[1-3]|[①②③])[ \t]*[.．、:：)）]|(?:选项|Option[ \t]*)(?:[A-Ca-c]|[1-3]|[①②③])[ \t]*[.．、:：)）]",
    )
    .expect("invalid option regex")
});

/// Heuristic scanner for the start of the branch menu.
#[derive(Debug, Clone, Copy)]
pub struct SentinelDetector {
    min_chars: usize,
}

impl Default for SentinelDetector {
    fn default() -> Self {
        Self {
            min_chars: MIN_DETECT_CHARS,
        }
    }
}

impl SentinelDetector {
    /// Create a detector that skips buffers shorter than `min_chars` characters.
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    /// Byte offset where the branch menu starts, if one is recognizable.
    ///
    /// Matches in the first third of the buffer are ignored so that lists or
    /// questions inside the story's own dialogue don't end the chapter early.
    pub fn scan(&self, content: &str) -> Option<usize> {
        if content.chars().count() < self.min_chars {
            return None;
        }

        let floor = content.len() / 3;
        let guidance = first_match_from(&GUIDANCE_PHRASE, content, floor);
        let enumerated = first_match_from(&ENUMERATED_OPTION, content, floor);

        match (guidance, enumerated) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

fn first_match_from(pattern: &Regex, content: &str, floor: usize) -> Option<usize> {
    pattern
        .find_iter(content)
        .map(|m| m.start())
        .find(|&start| start >= floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prose(chars: usize) -> String {
        "雨".repeat(chars)
    }

    #[test]
    fn test_short_buffer_is_not_scanned() {
        let content = format!("{}\n选项A：离开", prose(10));
        assert_eq!(SentinelDetector::default().scan(&content), None);
    }

    #[test]
    fn test_enumerated_marker_inline() {
        let body = prose(300);
        let content = format!("{body}选项A：跟随人影|选项B：研究信件|选项C：联系朋友");
        assert_eq!(SentinelDetector::default().scan(&content), Some(body.len()));
    }

    #[test]
    fn test_enumerated_marker_on_new_line() {
        let body = format!("{}\n", prose(300));
        let content = format!("{body}1. 跟随人影\n2. 研究信件\n3. 联系朋友");
        assert_eq!(SentinelDetector::default().scan(&content), Some(body.len()));
    }

    #[test]
    fn test_circled_numbers() {
        let body = format!("{}\n", prose(300));
        let content = format!("{body}①、跟随人影\n②、研究信件");
        assert_eq!(SentinelDetector::default().scan(&content), Some(body.len()));
    }

    #[test]
    fn test_guidance_phrase_wins_when_earlier() {
        let body = prose(300);
        let content = format!("{body}\n请选择你的下一步行动：\nA. 跟随人影\nB. 研究信件");
        assert_eq!(SentinelDetector::default().scan(&content), Some(body.len() + 1));
    }

    #[test]
    fn test_english_guidance_phrase() {
        let body = "The rain would not stop. ".repeat(12);
        let content = format!("{body}What will you do next: follow the figure, or stay?");
        assert_eq!(SentinelDetector::default().scan(&content), Some(body.len()));
    }

    #[test]
    fn test_summary_line_is_a_guidance_marker() {
        let body = prose(300);
        let content = format!("{body}\nSUMMARY：林默收到了父亲的信");
        assert_eq!(SentinelDetector::default().scan(&content), Some(body.len() + 1));
    }

    #[test]
    fn test_matches_in_first_third_are_ignored() {
        let content = format!("“选项A：留下，”她说。{}", prose(400));
        assert_eq!(SentinelDetector::default().scan(&content), None);
    }

    #[test]
    fn test_plain_prose_has_no_marker() {
        let content = format!("{}。他推开门，走进了雨里。", prose(400));
        assert_eq!(SentinelDetector::default().scan(&content), None);
    }

    #[test]
    fn test_custom_threshold() {
        let content = "故事。\n1. 离开";
        assert_eq!(SentinelDetector::new(0).scan(content), Some("故事。\n".len()));
    }
}
