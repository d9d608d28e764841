//! Promo Task Bot - Main Entry Point
//!
//! Runs the task flow against a JSON record file and reads events from
//! stdin, one `<user_id> <message>` per line.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use promo_task_bot::commands::CommandHandler;
use promo_task_bot::config::{BotSettings, RewardTable};
use promo_task_bot::flow::{ChannelRoster, TaskFlow};
use promo_task_bot::ledger::{CooldownSweeper, SweeperMessage};
use promo_task_bot::store::{JsonFileStore, UserStore};

/// Promotional task bot driven from the console.
#[derive(Parser, Debug)]
#[command(name = "promo_bot")]
#[command(about = "Run the promo task flow against a local record file")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Record file path, overriding `STORE_PATH`.
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Generate an example reward table file and exit.
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    // Handle example config generation
    if args.generate_config {
        return generate_example_config();
    }

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    // Load configurations
    let mut settings = BotSettings::from_env().context("Failed to load bot settings from environment")?;
    if let Some(store) = args.store {
        settings.store_path = store;
    }

    let rewards = RewardTable::load_or_default(&settings.rewards_path)
        .context("Failed to load reward table")?;
    rewards.validate().context("Reward table validation failed")?;

    let store = JsonFileStore::open(&settings.store_path)
        .await
        .context("Failed to open record store")?;
    info!(
        "Loaded {} users from {}",
        store.count().await.context("Failed to count users")?,
        store.path().display()
    );

    let roster = if settings.required_channels.is_empty() {
        None
    } else {
        info!("Membership gate on: {}", settings.required_channels.join(", "));
        Some(Arc::new(ChannelRoster::new(settings.required_channels.clone())))
    };

    let sweep_every = Duration::from_secs(settings.cooldown_sweep_secs);
    let mut flow = TaskFlow::new(Arc::new(store), settings, rewards);
    if let Some(roster) = &roster {
        flow = flow.with_gate(roster.clone());
    }
    let flow = Arc::new(flow);

    // Create sweeper channel
    let (sweeper_tx, sweeper_rx) = mpsc::channel::<SweeperMessage>(8);
    let sweeper = CooldownSweeper::new(Arc::clone(flow.ledger().cooldowns()), sweep_every);
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(sweeper_rx).await;
    });

    let handler = CommandHandler::new(Arc::clone(&flow), roster);

    info!("Bot is running. Type `<user_id> /help` for commands, Ctrl+C to stop.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if let Some(result) = handler.try_handle(&line).await {
                            println!("{}", result.message);
                        }
                    }
                    Ok(None) => {
                        info!("Input closed");
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read input: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    // Cleanup
    info!("Shutting down...");
    let _ = sweeper_tx.send(SweeperMessage::Shutdown).await;
    let _ = sweeper_handle.await;

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Generates an example reward table file.
fn generate_example_config() -> Result<()> {
    let example = RewardTable::example();
    example.save_to_file("rewards.example.json")?;

    println!("✓ Example reward table written to: rewards.example.json");
    println!("\nTo use this bot:");
    println!("1. Copy rewards.example.json to rewards.json and adjust amounts");
    println!("2. Optionally create a .env file with BOT_USERNAME and REQUIRED_CHANNELS");
    println!("3. Run: promo_bot");
    println!("4. Type lines like: 42 /start");

    Ok(())
}
