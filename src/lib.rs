//! Resizer library
//!
//! Probes a video, extracts a preview frame, drives a background player with
//! frame-accurate stepping, and re-encodes a time window to a target file size.

pub mod cli;
pub mod config;
pub mod decode;
pub mod domain;
pub mod engine;
pub mod error;
pub mod output;
pub mod playback;
pub mod probe;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use domain::model::{DecodedFrame, ScaleFactor, SourceInfo, TimeWindow, TranscodeJob};
pub use engine::{TranscodeEngine, TranscodeReport};
pub use error::{ResizerError, ResizerResult};
pub use playback::{PlaybackEngine, PlaybackPhase};
pub use session::{Session, SessionHost};

/// Initialize the FFmpeg libraries. Safe to call more than once.
pub fn init() -> ResizerResult<()> {
    ffmpeg_next::init()?;
    Ok(())
}
