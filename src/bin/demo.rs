//! Interactive demo for the linkboard sync engine.
//!
//! Runs entirely against the in-memory backend, either as a scripted
//! walkthrough of the engine's behavior or as an interactive session.
//!
//! # Usage
//!
//! ```bash
//! # Scripted tour: optimistic mutations, reorder, cap, rollback, resync
//! cargo run --bin linkboard-demo -- walkthrough
//!
//! # Same, with slower simulated network
//! cargo run --bin linkboard-demo -- walkthrough --latency-ms 400
//!
//! # Drive a board by hand
//! cargo run --bin linkboard-demo -- interactive
//! ```
//!
//! # Environment Variables
//!
//! - `MAX_PUBLIC_LINKS`, `EVENT_BUFFER_LIMIT`,
//!   `RECONNECT_BASE_DELAY_MS`, `RECONNECT_MAX_DELAY_MS` (optional):
//!   engine limits, see [`linkboard::config`]
//! - `RUST_LOG` (optional): raise to `info` or `debug` to watch the
//!   engine's own logging alongside the demo output

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::{Confirm, Input, Select};
use tracing_subscriber::EnvFilter;

use linkboard::config::{self, SyncConfig};
use linkboard::domain::entities::{Link, LinkDraft, LinkPatch};
use linkboard::infrastructure::{InMemoryBackend, InMemoryGateway};
use linkboard::LinkBoard;

const OWNER: &str = "demo-user";

/// Demo for the linkboard sync engine.
#[derive(Parser)]
#[command(name = "linkboard-demo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scripted walkthrough of the sync engine
    Walkthrough {
        /// Simulated backend latency in milliseconds
        #[arg(short, long, default_value_t = 120)]
        latency_ms: u64,
    },

    /// Manage a board interactively
    Interactive,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    let config = config::load_from_env()?;
    config.print_summary();

    match cli.command {
        Commands::Walkthrough { latency_ms } => walkthrough(config, latency_ms).await?,
        Commands::Interactive => interactive(config).await?,
    }

    Ok(())
}

/// Scripted tour: two boards on one account, exercising optimistic
/// mutations, the drag session, the public cap, rollback, realtime
/// clicks, and channel-loss recovery.
async fn walkthrough(config: SyncConfig, latency_ms: u64) -> Result<()> {
    let backend = InMemoryBackend::new();
    backend.set_latency(Duration::from_millis(latency_ms));
    // Let everything in flight settle before looking at state
    let settle = Duration::from_millis(latency_ms * 2 + 100);

    println!("{}", "🔗 Linkboard Walkthrough".bright_blue().bold());
    println!();

    step(1, "Connect two devices to the same account");
    let phone = connect(&backend, config.clone()).await?;
    let laptop = connect(&backend, config.clone()).await?;
    println!("  Both boards are live: {:?}", phone.channel_status());
    println!();

    step(2, "Add links on the phone; the laptop follows in realtime");
    let seeds = [
        ("My Blog", "https://example.com/blog", true),
        ("GitHub", "https://github.com/demo-user", true),
        ("Newsletter", "https://example.com/newsletter", true),
        ("Podcast", "https://example.com/podcast", true),
        ("Shop", "https://example.com/shop", true),
        ("Secret Notes", "https://example.com/notes", false),
    ];
    for (title, url, is_public) in seeds {
        phone
            .add_link(LinkDraft {
                title: title.to_string(),
                url: url.to_string(),
                is_public,
            })
            .await?;
    }
    tokio::time::sleep(settle).await;
    print_board("phone", &phone.snapshot());
    print_board("laptop", &laptop.snapshot());
    println!();

    step(3, "Drag 'Shop' to the top, preview, then commit one batch");
    let shop_id = find_id(&phone.snapshot(), "Shop");
    phone.begin_drag(&shop_id)?;
    phone.drag_over(0)?;
    print_board("phone (preview, nothing sent yet)", &phone.snapshot());
    phone.commit_drag().await?;
    tokio::time::sleep(settle).await;
    print_board("laptop (after commit)", &laptop.snapshot());
    println!();

    step(4, "The public cap holds");
    let notes_id = find_id(&phone.snapshot(), "Secret Notes");
    match phone.toggle_visibility(&notes_id, true).await {
        Ok(_) => println!("  {}", "unexpectedly went public".red()),
        Err(e) => println!("  {} {}", "✋ rejected locally:".yellow(), e),
    }
    println!("  Hide 'Podcast' first, then retry");
    let podcast_id = find_id(&phone.snapshot(), "Podcast");
    phone.toggle_visibility(&podcast_id, false).await?;
    phone.toggle_visibility(&notes_id, true).await?;
    tokio::time::sleep(settle).await;
    print_board("phone", &phone.snapshot());
    println!();

    step(5, "Visitors click; both devices see counts tick");
    let blog_id = find_id(&phone.snapshot(), "My Blog");
    for _ in 0..3 {
        backend.record_click(&blog_id)?;
    }
    tokio::time::sleep(settle).await;
    print_board("laptop", &laptop.snapshot());
    println!();

    step(6, "A failing edit rolls back cleanly");
    backend.fail_next(linkboard::SyncError::network(
        "connection reset by peer",
        serde_json::json!({}),
    ));
    match phone
        .edit_link(
            &blog_id,
            LinkPatch {
                title: Some("Broken Edit".to_string()),
                url: None,
            },
        )
        .await
    {
        Ok(_) => println!("  {}", "unexpectedly succeeded".red()),
        Err(e) => println!("  {} {}", "✋ backend rejected:".yellow(), e),
    }
    print_board("phone (title unchanged)", &phone.snapshot());
    println!();

    step(7, "Losing the event channel triggers a resync");
    backend.drop_channel(OWNER);
    // This click lands while nobody is listening
    backend.record_click(&blog_id)?;
    tokio::time::sleep(settle).await;
    println!("  Channel status: {:?}", phone.channel_status());
    print_board("phone (click recovered by resync)", &phone.snapshot());
    println!();

    println!("{}", "✅ Walkthrough complete".green().bold());
    Ok(())
}

/// Drives a single board from dialoguer prompts.
async fn interactive(config: SyncConfig) -> Result<()> {
    let backend = InMemoryBackend::new();
    let board = connect(&backend, config).await?;

    println!("{}", "🔗 Linkboard Interactive".bright_blue().bold());
    println!();

    loop {
        print_board("board", &board.snapshot());
        println!();

        let actions = [
            "Add link",
            "Edit link",
            "Delete link",
            "Move link",
            "Toggle visibility",
            "Simulate click",
            "Refresh from backend",
            "Quit",
        ];
        let choice = Select::new()
            .with_prompt("Action")
            .items(&actions)
            .default(0)
            .interact()?;

        let outcome = match actions[choice] {
            "Add link" => add_interactive(&board).await,
            "Edit link" => edit_interactive(&board).await,
            "Delete link" => delete_interactive(&board).await,
            "Move link" => move_interactive(&board).await,
            "Toggle visibility" => toggle_interactive(&board).await,
            "Simulate click" => click_interactive(&backend, &board),
            "Refresh from backend" => board.refresh().await.map_err(Into::into),
            _ => break,
        };
        if let Err(e) = outcome {
            println!("{} {}", "✋".yellow(), e.to_string().red());
        }
        println!();
    }

    println!("{}", "👋 Bye".bright_black());
    Ok(())
}

async fn add_interactive(board: &LinkBoard<InMemoryGateway>) -> Result<()> {
    let title: String = Input::new().with_prompt("Title").interact_text()?;
    let url: String = Input::new()
        .with_prompt("URL")
        .with_initial_text("https://")
        .interact_text()?;
    let is_public = Confirm::new()
        .with_prompt("Public?")
        .default(true)
        .interact()?;

    let link = board
        .add_link(LinkDraft {
            title,
            url,
            is_public,
        })
        .await?;
    println!("{} {}", "✅ created".green(), link.id.bright_black());
    Ok(())
}

async fn edit_interactive(board: &LinkBoard<InMemoryGateway>) -> Result<()> {
    let Some(link) = pick_link(&board.snapshot(), "Edit which link?")? else {
        return Ok(());
    };
    let title: String = Input::new()
        .with_prompt("New title")
        .with_initial_text(&link.title)
        .interact_text()?;

    board
        .edit_link(
            &link.id,
            LinkPatch {
                title: Some(title),
                url: None,
            },
        )
        .await?;
    println!("{}", "✅ updated".green());
    Ok(())
}

async fn delete_interactive(board: &LinkBoard<InMemoryGateway>) -> Result<()> {
    let Some(link) = pick_link(&board.snapshot(), "Delete which link?")? else {
        return Ok(());
    };
    let confirmed = Confirm::new()
        .with_prompt(format!("Delete '{}'?", link.title))
        .default(false)
        .interact()?;
    if !confirmed {
        println!("{}", "❌ Cancelled".red());
        return Ok(());
    }

    board.delete_link(&link.id).await?;
    println!("{}", "✅ deleted".green());
    Ok(())
}

async fn move_interactive(board: &LinkBoard<InMemoryGateway>) -> Result<()> {
    let snapshot = board.snapshot();
    let Some(link) = pick_link(&snapshot, "Move which link?")? else {
        return Ok(());
    };
    let target: usize = Input::new()
        .with_prompt(format!("Target slot (0..{})", snapshot.len() - 1))
        .interact_text()?;

    board.begin_drag(&link.id)?;
    board.drag_over(target)?;
    print_board("preview", &board.snapshot());

    let confirmed = Confirm::new()
        .with_prompt("Commit this order?")
        .default(true)
        .interact()?;
    if confirmed {
        board.commit_drag().await?;
        println!("{}", "✅ reordered".green());
    } else {
        board.cancel_drag()?;
        println!("{}", "❌ Cancelled".red());
    }
    Ok(())
}

async fn toggle_interactive(board: &LinkBoard<InMemoryGateway>) -> Result<()> {
    let Some(link) = pick_link(&board.snapshot(), "Toggle which link?")? else {
        return Ok(());
    };
    board.toggle_visibility(&link.id, !link.is_public).await?;
    println!("{}", "✅ toggled".green());
    Ok(())
}

fn click_interactive(backend: &InMemoryBackend, board: &LinkBoard<InMemoryGateway>) -> Result<()> {
    let Some(link) = pick_link(&board.snapshot(), "Click which link?")? else {
        return Ok(());
    };
    let count = backend.record_click(&link.id)?;
    println!("{} total clicks: {}", "✅".green(), count);
    Ok(())
}

async fn connect(
    backend: &InMemoryBackend,
    config: SyncConfig,
) -> Result<LinkBoard<InMemoryGateway>> {
    let gateway = Arc::new(backend.gateway_for(OWNER));
    Ok(LinkBoard::connect(gateway, OWNER, config).await?)
}

fn step(n: usize, title: &str) {
    println!(
        "{} {}",
        format!("[{n}]").bright_black(),
        title.bright_white().bold()
    );
}

fn print_board(label: &str, links: &[Link]) {
    println!("  {}", format!("── {label} ──").bright_black());
    if links.is_empty() {
        println!("    {}", "(empty)".bright_black());
        return;
    }
    for link in links {
        let badge = if link.is_public {
            "public ".green()
        } else {
            "private".bright_black()
        };
        println!(
            "    {} {} {:<16} {:<36} {}",
            link.position.to_string().bright_black(),
            badge,
            link.title.cyan(),
            link.url.bright_black(),
            format!("{} clicks", link.click_count).bright_black()
        );
    }
}

fn find_id(links: &[Link], title: &str) -> String {
    links
        .iter()
        .find(|l| l.title == title)
        .map(|l| l.id.clone())
        .unwrap_or_default()
}

fn pick_link(links: &[Link], prompt: &str) -> Result<Option<Link>> {
    if links.is_empty() {
        println!("{}", "  Nothing here yet".yellow());
        return Ok(None);
    }
    let labels: Vec<String> = links
        .iter()
        .map(|l| format!("{} ({})", l.title, l.url))
        .collect();
    let index = Select::new()
        .with_prompt(prompt)
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(links.get(index).cloned())
}
