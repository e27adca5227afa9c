//! Target bitrate derivation

use crate::domain::model::TimeWindow;
use crate::error::{ResizerError, ResizerResult};

/// Share of the size budget given to video; the rest covers container and audio
pub const VIDEO_SIZE_SHARE: f64 = 0.95;

/// Video bitrate (bits/s) that makes `window` come out at roughly
/// `target_size_bytes`: `floor(bytes * 8 * 0.95 / seconds)`.
pub fn target_bitrate(target_size_bytes: u64, window: &TimeWindow) -> ResizerResult<u64> {
    target_bitrate_with_share(target_size_bytes, window, VIDEO_SIZE_SHARE)
}

/// [`target_bitrate`] with a configurable video share of the budget
pub fn target_bitrate_with_share(
    target_size_bytes: u64,
    window: &TimeWindow,
    video_share: f64,
) -> ResizerResult<u64> {
    let seconds = window.duration_seconds();
    let invalid = || ResizerError::InvalidBitrate {
        target_size_bytes,
        seconds,
    };

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(invalid());
    }

    let video_bits = target_size_bytes as f64 * 8.0 * video_share;
    let bitrate = (video_bits / seconds).floor();
    if !bitrate.is_finite() || bitrate < 1.0 {
        return Err(invalid());
    }
    Ok(bitrate as u64)
}
