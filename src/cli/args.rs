//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the preview command
#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// PNG file to write
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Arguments for the transcode command
#[derive(Args, Debug)]
pub struct TranscodeArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Target output size in megabytes (1 MB = 1024 * 1024 bytes)
    #[arg(long)]
    pub size_mb: f64,

    /// Resolution divisor: 1, 2, 4, full, half or quarter
    #[arg(long, default_value = "1")]
    pub scale: String,

    /// Segment start (HH:MM:SS.ms, MM:SS.ms, or seconds; default: 0)
    #[arg(short, long)]
    pub start: Option<String>,

    /// Segment end (HH:MM:SS.ms, MM:SS.ms, or seconds; default: end of clip)
    #[arg(short, long)]
    pub end: Option<String>,

    /// Suffix for the derived output name
    #[arg(long)]
    pub suffix: Option<String>,

    /// Output file path (default: derived from input and suffix)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip the hardware encoder
    #[arg(long)]
    pub software: bool,
}

/// Arguments for the play command
#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Seek here before anything else
    #[arg(long)]
    pub from: Option<String>,

    /// Play continuously for this many milliseconds
    #[arg(long, default_value = "0")]
    pub for_ms: u64,

    /// Frame slot polling period in milliseconds
    #[arg(long, default_value = "40")]
    pub tick_ms: u64,

    /// Single-step forward this many frames
    #[arg(long, default_value = "0")]
    pub step_forward: u32,

    /// Single-step backward this many frames (after forward steps)
    #[arg(long, default_value = "0")]
    pub step_backward: u32,
}
