//! Error handling module for Resizer

use thiserror::Error;

/// Main error type for Resizer operations
#[derive(Error, Debug)]
pub enum ResizerError {
    /// Container could not be opened or parsed
    #[error("Cannot read media file {path}: {message}")]
    Unreadable { path: String, message: String },

    /// Source has no video stream
    #[error("No video stream found in {path}")]
    NoVideoStream { path: String },

    /// Source has no audio stream (non-fatal, output is video-only)
    #[error("No usable audio stream: {message}")]
    NoAudioStream { message: String },

    /// No decoder for the source codec, or it failed to open
    #[error("Video decoder unavailable: {message}")]
    DecoderUnavailable { message: String },

    /// Neither the hardware nor the software H.264 encoder could be opened
    #[error("H.264 encoder unavailable: {message}")]
    EncoderUnavailable { message: String },

    /// Time window outside the source duration, or inverted
    #[error("Invalid time window {start:.3}s - {end:.3}s for a {duration:.3}s source")]
    InvalidWindow { start: f64, end: f64, duration: f64 },

    /// Derived bitrate is not positive
    #[error("Invalid target bitrate derived from {target_size_bytes} bytes over {seconds:.3}s")]
    InvalidBitrate { target_size_bytes: u64, seconds: f64 },

    /// Resolution divisor other than 1, 2 or 4
    #[error("Invalid scale factor: {value}. Expected 1, 2, 4, full, half or quarter")]
    InvalidScale { value: String },

    /// Target size is zero, negative or not a number
    #[error("Invalid target size: {value} MB")]
    InvalidTargetSize { value: String },

    /// Decoding produced no usable frame
    #[error("Decode failed: {message}")]
    DecodeFailed { message: String },

    /// Output could not be created or written
    #[error("Output I/O failure on {path}: {message}")]
    IoFailure { path: String, message: String },

    /// Container refused the seek (non-fatal, decoding continues from the current point)
    #[error("Seek to {target_ms}ms not supported: {message}")]
    SeekUnsupported { target_ms: i64, message: String },

    /// Invalid time format
    #[error("Invalid time format: {time}. Expected HH:MM:SS.ms, MM:SS.ms, or seconds")]
    InvalidTimeFormat { time: String },

    /// Configuration file or environment override is malformed
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// A control command arrived before any source was loaded
    #[error("No source loaded")]
    NoSourceLoaded,

    /// Playback worker could not start
    #[error("Playback failed: {message}")]
    PlaybackFailed { message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// FFmpeg error
    #[error("FFmpeg error: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),
}

impl ResizerError {
    /// Whether processing has to stop on this error.
    ///
    /// A missing audio stream degrades to video-only output and a refused seek
    /// falls back to decoding from wherever the demuxer currently is.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ResizerError::NoAudioStream { .. } | ResizerError::SeekUnsupported { .. }
        )
    }
}

/// Result type alias for Resizer operations
pub type ResizerResult<T> = std::result::Result<T, ResizerError>;
