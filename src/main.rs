//! Resizer CLI
//!
//! Trims a segment out of a video and re-encodes it so the result lands near a
//! target file size.
//!
//! # Usage
//!
//! ```bash
//! resizer probe --input holiday.mp4
//! resizer preview --input holiday.mp4 --output still.png
//! resizer transcode --input holiday.mp4 --size-mb 8 --scale half --start 00:10 --end 00:40
//! resizer play --input holiday.mp4 --from 5 --step-forward 3 --for-ms 2000
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use resizer_cli::cli::{commands, Cli, Commands};
use resizer_cli::config::AppConfig;
use resizer_cli::utils::logging::LoggingSystem;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config)?;

    let logging = LoggingSystem::new(config.logging.clone());
    logging
        .initialize()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    logging.log_system_info();

    resizer_cli::init().context("Failed to initialize FFmpeg")?;

    match cli.command {
        Commands::Probe(args) => commands::probe_command(args)?,
        Commands::Preview(args) => commands::preview_command(args)?,
        Commands::Transcode(args) => commands::transcode_command(args, &config)?,
        Commands::Play(args) => commands::play_command(args, &config)?,
    }

    info!("Done");
    Ok(())
}
