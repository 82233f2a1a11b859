//! Momentum Day-Trade Bot
//!
//! Watches Alpaca minute bars for a symbol chosen over Discord chat and
//! paper-trades a momentum strategy, posting entries and exits to the channel.

mod api;
mod bot;
mod chat;
mod commands;
mod config;
mod db;
mod models;
mod trading;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::discord::{DiscordRest, Gateway};
use crate::api::{AlpacaCredentials, AlpacaStream, BarProvider, ReplayFeed};
use crate::bot::Controller;
use crate::chat::{ChatSink, ConsoleSink};
use crate::config::{AppConfig, Provider};
use crate::db::Journal;
use crate::models::{trading_day, ChannelId};

/// Discord-driven momentum paper-trading bot.
#[derive(Parser)]
#[command(name = "daytradebot")]
#[command(about = "Paper-trade intraday momentum on Alpaca bars, driven from Discord", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Discord bot token
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    discord_token: Option<String>,

    /// Alpaca API key id
    #[arg(long, env = "ALPACA_API_KEY_ID", hide_env_values = true)]
    alpaca_key_id: Option<String>,

    /// Alpaca API secret key
    #[arg(long, env = "ALPACA_API_SECRET_KEY", hide_env_values = true)]
    alpaca_secret_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and serve chat commands
    Run,

    /// Type commands on stdin instead of Discord
    Console {
        /// Replay bars from a JSON-lines file instead of the live stream
        #[arg(short, long)]
        replay: Option<PathBuf>,

        /// Delay between replayed bars in milliseconds
        #[arg(long)]
        pace_ms: Option<u64>,
    },

    /// Show the effective configuration
    Config,

    /// List journaled paper trades for a day
    Journal {
        /// Trading day (YYYY-MM-DD), defaults to today in New York
        #[arg(short, long)]
        day: Option<NaiveDate>,

        /// Only this channel
        #[arg(long)]
        channel: Option<ChannelId>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = AppConfig::load(&cli.config).await?;

    match &cli.command {
        Commands::Run => {
            let token = cli
                .discord_token
                .clone()
                .context("DISCORD_TOKEN is not set")?;

            let provider = build_provider(&config, &cli)?;
            let journal = open_journal(&config).await?;
            let sink: Arc<dyn ChatSink> = Arc::new(DiscordRest::new(&token)?);

            info!(
                timeframe = %config.timeframe,
                provider = ?config.provider,
                alert_channel = %config.discord_channel_id,
                "Starting Discord bot"
            );

            let controller = Arc::new(Controller::new(config, provider, sink, journal));
            controller.run_discord(Gateway::new(&token)).await?;
        }

        Commands::Console { replay, pace_ms } => {
            apply_console_overrides(&mut config, replay.as_deref(), *pace_ms)?;

            let provider = build_provider(&config, &cli)?;
            let journal = open_journal(&config).await?;

            println!("\n=== Momentum Day-Trade Bot (console) ===");
            println!("Timeframe: {}", config.timeframe);
            println!("Provider:  {:?}", config.provider);
            println!("Type !help for commands. Ctrl+D ends input, Ctrl+C quits.\n");

            let controller = Arc::new(Controller::new(config, provider, Arc::new(ConsoleSink::new()), journal));
            controller.run_console().await?;
        }

        Commands::Config => {
            println!("\n=== Effective Configuration ({}) ===\n", cli.config.display());
            print!("{}", serde_yaml::to_string(&config)?);

            println!("\n=== Credentials ===\n");
            println!("  DISCORD_TOKEN:         {}", presence(&cli.discord_token));
            println!("  ALPACA_API_KEY_ID:     {}", presence(&cli.alpaca_key_id));
            println!("  ALPACA_API_SECRET_KEY: {}", presence(&cli.alpaca_secret_key));
        }

        Commands::Journal { day, channel } => {
            let day = day.unwrap_or_else(|| trading_day(Utc::now()));
            let journal = Journal::new(&config.journal.database).await?;
            print_journal(&journal, day, *channel).await?;
        }
    }

    Ok(())
}

/// `--replay` switches the provider to a file; `--pace-ms` sets its pacing.
fn apply_console_overrides(config: &mut AppConfig, replay: Option<&Path>, pace_ms: Option<u64>) -> Result<()> {
    if let Some(path) = replay {
        config.provider = Provider::Replay;
        config.replay.path = Some(path.to_path_buf());
    }
    if let Some(pace) = pace_ms {
        config.replay.pace_ms = pace;
    }
    config.validate()
}

fn build_provider(config: &AppConfig, cli: &Cli) -> Result<Arc<dyn BarProvider>> {
    match config.provider {
        Provider::AlpacaWs => {
            let credentials = AlpacaCredentials {
                key_id: cli.alpaca_key_id.clone().context("ALPACA_API_KEY_ID is not set")?,
                secret_key: cli
                    .alpaca_secret_key
                    .clone()
                    .context("ALPACA_API_SECRET_KEY is not set")?,
            };
            Ok(Arc::new(AlpacaStream::new(config.alpaca.url(), credentials)))
        }
        Provider::Replay => {
            let path = config
                .replay
                .path
                .clone()
                .context("replay.path is required for the replay provider")?;
            Ok(Arc::new(ReplayFeed::new(path, Duration::from_millis(config.replay.pace_ms))))
        }
    }
}

async fn open_journal(config: &AppConfig) -> Result<Option<Journal>> {
    if !config.journal.enabled {
        return Ok(None);
    }
    let journal = Journal::new(&config.journal.database)
        .await
        .with_context(|| format!("Failed to open journal {}", config.journal.database))?;
    Ok(Some(journal))
}

async fn print_journal(journal: &Journal, day: NaiveDate, channel: Option<ChannelId>) -> Result<()> {
    let trades = journal.trades_for_day(day, channel).await?;

    if trades.is_empty() {
        println!("No paper trades on {}.", day);
        return Ok(());
    }

    println!(
        "\n{:<20} {:<8} {:>6} {:>10} {:>10} {:>8} {:>10}  {:<11}",
        "CHANNEL", "SYMBOL", "QTY", "ENTRY", "EXIT", "R", "P&L", "REASON"
    );
    println!("{}", "-".repeat(92));

    let mut total_r = 0.0;
    let mut total_pnl = 0.0;
    for t in &trades {
        total_r += t.r_multiple;
        total_pnl += t.pnl;
        println!(
            "{:<20} {:<8} {:>6} {:>10.2} {:>10.2} {:>+8.2} {:>10.2}  {:<11}",
            t.channel_id, t.symbol, t.qty, t.entry_price, t.exit_price, t.r_multiple, t.pnl, t.exit_reason
        );
    }

    println!("{}", "-".repeat(92));
    println!(
        "{} trades on {}: {:+.2}R, P&L ${:.2}",
        trades.len(),
        day,
        total_r,
        total_pnl
    );
    Ok(())
}

fn presence(value: &Option<String>) -> &'static str {
    if value.as_deref().is_some_and(|v| !v.is_empty()) {
        "set"
    } else {
        "not set"
    }
}
