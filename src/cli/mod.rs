//! CLI module for Resizer
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::error::ResizerResult;

pub mod args;
pub mod commands;

/// Resizer CLI
///
/// Trims a segment out of a video and re-encodes it to fit a target file size.
#[derive(Parser, Debug)]
#[command(name = "resizer")]
#[command(about = "Resizer - Trim a video and re-encode it to a target size")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (default: ./resizer.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Logging format (pretty, compact, json)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show duration, dimensions and frame rate of a video
    Probe(args::ProbeArgs),
    /// Save the mid-clip still frame as a PNG
    Preview(args::PreviewArgs),
    /// Re-encode a segment to a target file size
    Transcode(args::TranscodeArgs),
    /// Drive the background player without a display
    Play(args::PlayArgs),
}

impl Cli {
    /// Apply the global flags on top of a loaded configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) -> ResizerResult<()> {
        if let Some(level) = &self.log_level {
            config.logging.level = level.parse()?;
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.parse()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::logging::{LogFormat, LogLevel};

    #[test]
    fn test_parse_transcode() {
        let cli = Cli::try_parse_from([
            "resizer",
            "--log-level",
            "debug",
            "transcode",
            "--input",
            "in.mp4",
            "--size-mb",
            "8",
            "--scale",
            "half",
            "--start",
            "00:01.5",
            "--software",
        ])
        .unwrap();

        let Commands::Transcode(args) = &cli.command else {
            panic!("expected transcode");
        };
        assert_eq!(args.size_mb, 8.0);
        assert_eq!(args.scale, "half");
        assert_eq!(args.start.as_deref(), Some("00:01.5"));
        assert!(args.software);

        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_bad_log_format_rejected() {
        let cli = Cli::try_parse_from(["resizer", "--log-format", "xml", "probe", "--input", "a.mp4"]).unwrap();
        assert!(cli.apply_overrides(&mut AppConfig::default()).is_err());
    }

    #[test]
    fn test_size_required() {
        assert!(Cli::try_parse_from(["resizer", "transcode", "--input", "a.mp4"]).is_err());
    }
}
