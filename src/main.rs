// ABOUTME: Main entry point for the Twitch chat bridge
// ABOUTME: Initializes logging and config, starts the Herald facade and runs until Ctrl+C

use anyhow::{Context, Result};
use clap::Parser;
use herald::{config::Config, paths, Herald};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Herald: Twitch chat bridge with token renewal and text-to-speech.
#[derive(Parser)]
#[command(name = "herald", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long)]
    log_json: bool,
}

/// Set up stderr plus daily-rotated file logging. The guard must live until exit.
fn init_logging(json: bool) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = paths::ensure_log_dir()?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "herald.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(stderr_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_json)?;

    tracing::info!("Starting Herald");

    dotenvy::dotenv().ok();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    tracing::info!(
        username = %config.bot.username,
        channels = config.bot.channels.len(),
        token_refresh = config.auth.is_some(),
        tts = config.tts.enabled,
        "Configuration loaded"
    );

    let herald = Herald::from_config(&config);

    herald.on_connected(|address| {
        tracing::info!(address = %address, "Chat connected");
    });
    herald.on_disconnected(|reason| {
        tracing::warn!(reason = %reason, "Chat disconnected");
    });
    herald.on_message(|message| {
        if message.is_self {
            return;
        }
        tracing::info!(
            channel = %message.channel,
            sender = %message.display_name.as_deref().unwrap_or(&message.sender),
            text = %message.text,
            "Chat message"
        );
    });

    herald.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Received Ctrl+C, shutting down");

    herald.shutdown().await;
    Ok(())
}
