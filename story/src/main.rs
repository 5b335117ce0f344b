//! Interactive story reader for the terminal.
//!
//! Streams chapters from the story relay and lets the reader pick a branch
//! (or type their own action) after each one. Without a configured relay it
//! runs the built-in demo chapter.
//!
//! ```bash
//! AIBOOK_API_BASE=http://localhost:3000 cargo run -p story -- --title "雨夜来信" --worldview "雾都"
//! ```

mod headless;

use headless::ReaderConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = ReaderConfig::from_args(&args);
    headless::run(config).await?;
    Ok(())
}

fn print_help() {
    println!("story - interactive branching fiction");
    println!();
    println!("USAGE:");
    println!("  story [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help              Show this help message");
    println!("  --title <TITLE>         Story title (default: 未命名故事)");
    println!("  --characters <TEXT>     Character sheet");
    println!("  --worldview <TEXT>      World setting");
    println!("  --scenes <TEXT>         Key scenes");
    println!("  --main-plot <TEXT>      Main plot outline");
    println!("  --story-nodes <TEXT>    Initial plot anchors, one per line");
    println!("  --pov <POV>             first, second, third, third_it (default: third)");
    println!("  --length <CHARS>        Target chapter length (default: 800)");
    println!("  --load <PATH>           Resume a saved story");
    println!("  --demo                  Use the built-in demo chapter");
    println!();
    println!("ENVIRONMENT:");
    println!("  AIBOOK_API_BASE         Relay base URL");
    println!("  AIBOOK_API_KEY          Relay API key (sent as a bearer token)");
    println!("  RUST_LOG                Log filter, e.g. story_core=debug");
}
