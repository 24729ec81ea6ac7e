use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod chat;
mod compression;
mod config;
mod constants;
mod probe;
mod security;
mod services;
#[cfg(test)]
mod test_support;

use chat::{ChatSession, DiscordPlatform};
use compression::Compressor;
use config::AppConfig;
use services::{PublishService, RunOutcome};

/// Publish the newest screen capture to a Discord channel, compressing it
/// first when it is over the upload limit.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file (defaults to the user config directory).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory to scan for videos.
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Discord channel to post to.
    #[arg(long)]
    channel_id: Option<u64>,
    /// Seconds to wait for the Discord session to become ready.
    #[arg(long)]
    ready_timeout: Option<u64>,
    /// Check ffmpeg, ffprobe and the configuration, then exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting {} {}", constants::APP_NAME, constants::APP_VERSION);

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    // A missing .env is fine
    dotenvy::dotenv().ok();

    let mut config = AppConfig::load(args.config.as_deref())?;
    config.apply_env()?;
    if let Some(dir) = args.dir {
        config.video_directory = dir;
    }
    if let Some(channel_id) = args.channel_id {
        config.channel_id = Some(channel_id);
    }
    if let Some(timeout) = args.ready_timeout {
        config.ready_timeout_secs = timeout;
    }
    config.validate().context("invalid configuration")?;
    tracing::debug!("{:?}", config);

    let compressor = Compressor::new(&config.ffmpeg_path, &config.ffprobe_path);
    if args.check {
        compressor.check_available().await?;
        tracing::info!(
            "Configuration OK, watching {}",
            config.video_directory.display()
        );
        return Ok(());
    }
    if let Err(e) = compressor.check_available().await {
        tracing::warn!("{}; oversized videos cannot be compressed", e);
    }

    let publisher = PublishService::from_config(&config).context("channel_id is not set")?;
    let platform = DiscordPlatform::new(config.discord_token.clone().unwrap_or_default())
        .with_api_base(&config.discord_api_base);

    let session = ChatSession::open(platform, config.ready_timeout())
        .await
        .context("could not start the Discord session")?;

    let result = publisher.run_once(&session).await;

    if let Err(e) = session.close().await {
        tracing::warn!("Failed to close the Discord session: {}", e);
    }

    match result? {
        RunOutcome::Published { path } => {
            tracing::info!("Done: published {}", path.display());
        }
        RunOutcome::NothingToPublish => {
            tracing::info!("Done: nothing to publish");
        }
    }
    Ok(())
}
