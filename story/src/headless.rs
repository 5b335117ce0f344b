//! Line-oriented reading loop.
//!
//! - `1`, `2`, `3` pick a branch of the latest chapter
//! - Lines starting with `#` are commands (save, load, export, status, quit)
//! - Any other line is sent as the reader's own action

use chrono::Utc;
use relay::{NarrativePov, Relay, StorySettings, UserPreferences};
use story_core::testing::demo_backend;
use story_core::{
    export_text, GenerationUpdate, SessionConfig, SessionError, StoryBackend, StorySession,
};
use std::io::{self, BufRead, Write};
use tracing::info;

/// Options parsed from the command line.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub title: String,
    pub settings: StorySettings,
    pub preferences: UserPreferences,
    pub load_path: Option<String>,
    pub demo: bool,
}

impl ReaderConfig {
    pub fn from_args(args: &[String]) -> Self {
        let value = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };

        let mut settings = StorySettings::default();
        settings.characters = value("--characters");
        settings.worldview = value("--worldview");
        settings.scenes = value("--scenes");
        settings.main_plot = value("--main-plot");
        settings.story_nodes = value("--story-nodes");

        let mut preferences = UserPreferences::default();
        if let Some(pov) = value("--pov").and_then(|p| parse_pov(&p)) {
            preferences = preferences.with_pov(pov);
        }
        if let Some(length) = value("--length").and_then(|l| l.parse().ok()) {
            preferences = preferences.with_output_length(length);
        }

        Self {
            title: value("--title").unwrap_or_else(|| "未命名故事".to_string()),
            settings,
            preferences,
            load_path: value("--load"),
            demo: args.iter().any(|a| a == "--demo"),
        }
    }
}

fn parse_pov(text: &str) -> Option<NarrativePov> {
    match text {
        "first" => Some(NarrativePov::First),
        "second" => Some(NarrativePov::Second),
        "third" => Some(NarrativePov::Third),
        "third_it" => Some(NarrativePov::ThirdIt),
        _ => None,
    }
}

fn open_backend(demo: bool) -> Result<Box<dyn StoryBackend>, relay::Error> {
    let relay = Relay::from_env()?;
    if demo || !relay.config().is_configured() {
        println!("[DEMO] No relay configured; using the built-in demo chapter.");
        return Ok(Box::new(demo_backend()));
    }
    info!(base = %relay.config().base_url, "using story relay");
    Ok(Box::new(relay))
}

/// Run the reading loop until `#quit` or end of input.
pub async fn run(config: ReaderConfig) -> Result<(), Box<dyn std::error::Error>> {
    let backend = open_backend(config.demo)?;

    let mut session = match config.load_path {
        Some(ref path) => StorySession::load(path, SessionConfig::default()).await?,
        None => {
            let session = StorySession::new(config.title.clone(), SessionConfig::default());
            match config.settings.story_nodes {
                Some(ref nodes) => session.with_story_nodes(nodes),
                None => session,
            }
        }
    };

    println!("=== {} ===", session.title());
    print_commands();

    if session.chapters().is_empty() {
        generate(&mut session, &*backend, &config, None).await;
    } else if let Some(chapter) = session.latest_chapter() {
        println!("[RESUMED] {} chapters", session.chapters().len());
        print_branches(chapter);
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            let parts: Vec<&str> = command.split_whitespace().collect();
            match parts.first().copied() {
                Some("quit") | Some("exit") => {
                    println!("Goodbye!");
                    break;
                }
                Some("save") => match parts.get(1) {
                    Some(path) => match session.save(path).await {
                        Ok(()) => println!("[SAVED] Story saved to {path}"),
                        Err(e) => println!("[ERROR] Save failed: {e}"),
                    },
                    None => println!("[ERROR] Usage: #save <path>"),
                },
                Some("load") => match parts.get(1) {
                    Some(path) => match StorySession::load(path, SessionConfig::default()).await {
                        Ok(loaded) => {
                            settle_before_leaving(&mut session, &*backend).await;
                            session = loaded;
                            println!("[LOADED] {} ({} chapters)", session.title(), session.chapters().len());
                        }
                        Err(e) => println!("[ERROR] Load failed: {e}"),
                    },
                    None => println!("[ERROR] Usage: #load <path>"),
                },
                Some("export") => {
                    let text = export_text(session.chapters(), Utc::now());
                    match parts.get(1) {
                        Some(path) => match tokio::fs::write(path, text).await {
                            Ok(()) => println!("[EXPORTED] {} chapters to {path}", session.chapters().len()),
                            Err(e) => println!("[ERROR] Export failed: {e}"),
                        },
                        None => println!("{text}"),
                    }
                }
                Some("status") => {
                    println!("[STATUS]");
                    println!("  Title: {}", session.title());
                    println!("  Chapters: {}", session.chapters().len());
                    println!(
                        "  Ledger: {} entries, {} chars",
                        session.ledger().len(),
                        session.ledger().char_len()
                    );
                    if !session.ledger().is_empty() {
                        println!("{}", session.ledger());
                    }
                }
                Some("help") => print_commands(),
                _ => println!("[ERROR] Unknown command. Type #help for help."),
            }
            continue;
        }

        let choice = match (line.parse::<usize>(), session.latest_chapter()) {
            (Ok(n), Some(chapter)) if (1..=chapter.branches().len()).contains(&n) => {
                chapter.branches()[n - 1].text.clone()
            }
            _ => line.to_string(),
        };
        if choice.is_empty() {
            println!("[ERROR] That branch is empty; pick another or type an action.");
            continue;
        }
        generate(&mut session, &*backend, &config, Some(&choice)).await;
    }

    settle_before_leaving(&mut session, &*backend).await;
    Ok(())
}

/// Commit the last chapter's anchor before the session is dropped.
async fn settle_before_leaving(session: &mut StorySession, backend: &dyn StoryBackend) {
    if let Err(e) = session.settle_ledger(backend).await {
        eprintln!("[WARN] Ledger update skipped: {e}");
    }
}

/// Text to print so the terminal catches up with `text`, given what was
/// already printed. Filtering can rewrite printed text; then the whole
/// passage is reprinted on a fresh line.
fn display_delta(shown: &str, text: &str) -> String {
    match text.strip_prefix(shown) {
        Some(delta) => delta.to_string(),
        None => format!("\n{text}"),
    }
}

async fn generate(
    session: &mut StorySession,
    backend: &dyn StoryBackend,
    config: &ReaderConfig,
    choice: Option<&str>,
) {
    let mut shown = String::new();
    let mut stdout = io::stdout();
    let mut observer = |update: GenerationUpdate| match update {
        GenerationUpdate::Title(title) => println!("\n## {title}\n"),
        GenerationUpdate::Display(text) => {
            print!("{}", display_delta(&shown, &text));
            stdout.flush().ok();
            shown = text;
        }
        _ => {}
    };

    let result = session
        .generate_next(
            backend,
            config.settings.clone(),
            config.preferences.clone(),
            choice,
            &mut observer,
        )
        .await;

    match result {
        Ok(chapter) => {
            println!();
            print_branches(chapter);
        }
        Err(SessionError::Generation(e)) if e.is_timeout() => {
            println!("\n[ERROR] The relay took too long to answer. Try again.");
        }
        Err(e) => println!("\n[ERROR] {e}"),
    }
}

fn print_branches(chapter: &story_core::Chapter) {
    println!();
    for (i, branch) in chapter.branches().iter().enumerate() {
        if !branch.text.is_empty() {
            println!("  {}. {}", i + 1, branch.text);
        }
    }
    println!("Pick 1-3 or type your own action:");
}

fn print_commands() {
    println!("Commands:");
    println!("  #quit           - Exit");
    println!("  #save <path>    - Save the story");
    println!("  #load <path>    - Load a saved story");
    println!("  #export [path]  - Export as plain text");
    println!("  #status         - Show story status and anchor ledger");
    println!("  #help           - Show this help");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let config = ReaderConfig::from_args(&args(&[
            "story",
            "--title",
            "雨夜来信",
            "--worldview",
            "雾都",
            "--pov",
            "first",
            "--length",
            "1200",
            "--demo",
        ]));

        assert_eq!(config.title, "雨夜来信");
        assert_eq!(config.settings.worldview.as_deref(), Some("雾都"));
        assert_eq!(config.preferences.pov, NarrativePov::First);
        assert_eq!(config.preferences.single_output_length, 1200);
        assert!(config.demo);
        assert!(config.load_path.is_none());
    }

    #[test]
    fn test_defaults() {
        let config = ReaderConfig::from_args(&args(&["story", "--pov", "sideways"]));
        assert_eq!(config.title, "未命名故事");
        assert_eq!(config.preferences.pov, NarrativePov::Third);
    }

    #[test]
    fn test_display_delta() {
        assert_eq!(display_delta("", "夜色"), "夜色");
        assert_eq!(display_delta("夜色", "夜色如墨。"), "如墨。");
        assert_eq!(display_delta("夜色如墨。", "夜色如墨。"), "");
    }

    #[test]
    fn test_display_delta_reprints_rewritten_text() {
        // "（注：" was shown before its closing bracket arrived and got filtered.
        let shown = "他推开门（注：呼应";
        let text = "他推开门走了进去。";
        assert_eq!(display_delta(shown, text), "\n他推开门走了进去。");
    }

    #[tokio::test]
    async fn test_settle_before_leaving_commits_pending_anchor() {
        let backend = demo_backend();
        let mut session = StorySession::new("雨夜", SessionConfig::default());
        session
            .generate_next(
                &backend,
                StorySettings::default(),
                UserPreferences::default(),
                None,
                &mut |_: GenerationUpdate| {},
            )
            .await
            .unwrap();
        assert!(session.has_pending_anchor());

        settle_before_leaving(&mut session, &backend).await;
        assert!(!session.has_pending_anchor());
        assert_eq!(session.ledger().len(), 1);
    }
}
