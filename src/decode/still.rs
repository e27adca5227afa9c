//! Representative still frame for a freshly dropped file

use std::path::Path;

use tracing::{debug, info, warn};

use super::{FramePipeline, FrameSelect};
use crate::domain::model::DecodedFrame;
use crate::error::{ResizerError, ResizerResult};

/// Decode one frame near the midpoint of the whole source.
///
/// Seeks backward to the keyframe at or before `duration / 2` and returns the
/// first frame the decoder produces from there. A refused seek decodes from the
/// start instead. Independent of any trim window.
pub fn extract_mid_frame(path: impl AsRef<Path>, duration_seconds: f64) -> ResizerResult<DecodedFrame> {
    let path = path.as_ref();
    let mut pipeline = FramePipeline::open(path)?;

    let midpoint_ms = if duration_seconds.is_finite() && duration_seconds > 0.0 {
        (duration_seconds * 1000.0 / 2.0) as i64
    } else {
        0
    };
    debug!("Extracting still frame at {}ms from {}", midpoint_ms, path.display());

    if let Err(e) = pipeline.seek(midpoint_ms) {
        if e.is_fatal() {
            return Err(e);
        }
        warn!("Still frame falls back to the first decodable frame: {}", e);
    }

    let frame = pipeline
        .decode_until(FrameSelect::First, || false)?
        .ok_or_else(|| ResizerError::DecodeFailed {
            message: format!("no frame could be decoded from {}", path.display()),
        })?;

    info!(
        "Still frame {}x{} at {}ms",
        frame.width, frame.height, frame.position_ms
    );
    Ok(frame)
}
