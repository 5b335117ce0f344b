//! Removal of bracketed editorial asides ("（注：…）", "[Author's note: …]").
//!
//! Applied to displayed and stored text only. The raw buffer the detector
//! scans is never filtered.

use once_cell::sync::Lazy;
use regex::Regex;

static ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)[\[【（(][ \t]*(?:作者注|作者的话|编者注|旁白注|注|备注|说明|提示|字数|author'?s?[ \t]+note|editor'?s?[ \t]+note|note|ooc|meta)[ \t]*[:：][^\[\]【】（）()\n]*[\]】）)]",
    )
    .expect("invalid annotation regex")
});

/// Strip inline editorial annotations.
///
/// Nested annotations are removed from the inside out, so the result is a
/// fixed point: filtering it again changes nothing.
pub fn strip_annotations(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = ANNOTATION.replace_all(&current, "");
        if next == current {
            return current;
        }
        current = next.into_owned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_chinese_note() {
        assert_eq!(
            strip_annotations("他推开门（注：此处呼应第一章）走了进去。"),
            "他推开门走了进去。"
        );
    }

    #[test]
    fn test_strips_square_bracket_note() {
        assert_eq!(
            strip_annotations("The door opened. [Author's note: foreshadowing] He stepped in."),
            "The door opened.  He stepped in."
        );
        assert_eq!(strip_annotations("雨停了【字数：800】。"), "雨停了。");
    }

    #[test]
    fn test_keeps_ordinary_brackets() {
        let text = "【叮！任务完成】他笑了（很轻）。[1]";
        assert_eq!(strip_annotations(text), text);
    }

    #[test]
    fn test_nested_annotations_reach_fixed_point() {
        let text = "甲（注：外层[注：内层]结束）乙";
        let once = strip_annotations(text);
        assert_eq!(once, "甲乙");
        assert_eq!(strip_annotations(&once), once);
    }

    #[test]
    fn test_idempotent_on_mixed_text() {
        let samples = [
            "雨夜。（备注：节奏放慢）\n林默握紧了信。[note: keep tense]",
            "[OOC: 请继续] 故事继续（注意脚下）。",
            "",
        ];
        for text in samples {
            let once = strip_annotations(text);
            assert_eq!(strip_annotations(&once), once, "input: {text}");
        }
    }
}
