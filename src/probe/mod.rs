//! Media file inspection
//!
//! Reads container and stream metadata only; nothing is decoded here.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::media::Type;
use tracing::{debug, info};

use crate::domain::model::{SourceInfo, DEFAULT_FRAME_RATE};
use crate::error::{ResizerError, ResizerResult};

/// Probe a media file for duration, primary video dimensions and frame rate.
///
/// The first stream of video type is the primary stream. Duration falls back to
/// 0 when the container does not report one.
pub fn probe(path: impl AsRef<Path>) -> ResizerResult<SourceInfo> {
    let path = path.as_ref();
    info!("Probing media file: {}", path.display());

    let ictx = ffmpeg::format::input(&path).map_err(|e| ResizerError::Unreadable {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let stream = ictx
        .streams()
        .find(|s| s.parameters().medium() == Type::Video)
        .ok_or_else(|| ResizerError::NoVideoStream {
            path: path.display().to_string(),
        })?;

    let (width, height) = unsafe {
        let p = stream.parameters().as_ptr();
        ((*p).width.max(0) as u32, (*p).height.max(0) as u32)
    };

    let frame_rate_hz = rational_hz(stream.avg_frame_rate())
        .or_else(|| rational_hz(stream.rate()))
        .unwrap_or(DEFAULT_FRAME_RATE);

    let duration_seconds = container_duration_seconds(ictx.duration());

    let info = SourceInfo {
        path: path.to_path_buf(),
        duration_seconds,
        width,
        height,
        frame_rate_hz,
    };

    debug!(
        "Video stream #{}: {}x{} @ {:.3} fps, duration {:.3}s",
        stream.index(),
        width,
        height,
        frame_rate_hz,
        duration_seconds
    );
    info!("Probe completed: {}", info.summary());
    Ok(info)
}

/// Rate as Hz, `None` when absent or degenerate
pub(crate) fn rational_hz(rate: ffmpeg::Rational) -> Option<f64> {
    if rate.numerator() <= 0 || rate.denominator() <= 0 {
        return None;
    }
    let hz = rate.numerator() as f64 / rate.denominator() as f64;
    (hz.is_finite() && hz > 0.0).then_some(hz)
}

fn container_duration_seconds(duration: i64) -> f64 {
    if duration == ffmpeg::ffi::AV_NOPTS_VALUE || duration <= 0 {
        return 0.0;
    }
    duration as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
}
