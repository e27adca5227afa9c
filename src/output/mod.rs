//! Output naming and preview export

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::DEFAULT_SUFFIX;
use crate::domain::model::DecodedFrame;
use crate::error::{ResizerError, ResizerResult};

/// Derive `<dir>/<stem>_<SUFFIX><.ext>` next to `input`.
///
/// When that name is taken, `-1`, `-2`, ... is appended to the stem until a
/// free name is found. An empty suffix falls back to `RESIZED`.
pub fn derive_output_path(input: &Path, suffix: &str) -> PathBuf {
    let suffix = match suffix.trim() {
        "" => DEFAULT_SUFFIX,
        s => s,
    };
    let dir = input.parent().unwrap_or_else(|| Path::new(""));
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = input
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let base = format!("{}_{}", stem, suffix);
    let mut candidate = dir.join(format!("{}{}", base, ext));
    let mut counter = 1u32;
    while candidate.exists() {
        candidate = dir.join(format!("{}-{}{}", base, counter, ext));
        counter += 1;
    }

    debug!("Derived output path {}", candidate.display());
    candidate
}

/// Write a decoded RGB24 frame as an 8-bit PNG
pub fn write_png(frame: &DecodedFrame, path: &Path) -> ResizerResult<()> {
    let expected = frame.row_bytes() * frame.height as usize;
    if frame.width == 0 || frame.height == 0 || frame.pixels.len() != expected {
        return Err(ResizerError::DecodeFailed {
            message: format!(
                "frame buffer holds {} bytes, {}x{} RGB24 needs {}",
                frame.pixels.len(),
                frame.width,
                frame.height,
                expected
            ),
        });
    }

    let io_failure = |message: String| ResizerError::IoFailure {
        path: path.display().to_string(),
        message,
    };

    let file = File::create(path).map_err(|e| io_failure(e.to_string()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width, frame.height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);

    let mut writer = encoder.write_header().map_err(|e| io_failure(e.to_string()))?;
    writer
        .write_image_data(&frame.pixels)
        .map_err(|e| io_failure(e.to_string()))?;
    writer.finish().map_err(|e| io_failure(e.to_string()))?;

    info!(
        "Wrote {}x{} preview at {}ms to {}",
        frame.width,
        frame.height,
        frame.position_ms,
        path.display()
    );
    Ok(())
}
