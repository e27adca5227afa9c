// Domain models - Core types and data structures

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ResizerError, ResizerResult};

#[cfg(test)]
mod tests;

/// Bytes in one "MB" as entered by the user (binary megabyte).
pub const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Frame rate assumed when a stream declares neither an average nor a nominal rate
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// What the probe learned about a dropped file. Replaced wholesale on the next drop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub path: PathBuf,
    /// Container duration, 0 when the container does not report one
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate_hz: f64,
}

impl SourceInfo {
    /// Duration of one frame in whole milliseconds, never below 1.
    pub fn frame_interval_ms(&self) -> i64 {
        frame_interval_ms(self.frame_rate_hz)
    }

    /// Whole-clip window `[0, duration]`
    pub fn full_window(&self) -> TimeWindow {
        TimeWindow::new(0.0, self.duration_seconds)
    }

    /// One-line description for status output
    pub fn summary(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        format!(
            "{} ({}x{}, {:.3}s @ {:.3} fps)",
            name, self.width, self.height, self.duration_seconds, self.frame_rate_hz
        )
    }
}

/// Frame interval for a rate, truncated to whole milliseconds.
///
/// Truncation keeps the interval at or below the real frame spacing, so a
/// forward step never jumps over a frame.
pub fn frame_interval_ms(frame_rate_hz: f64) -> i64 {
    if !frame_rate_hz.is_finite() || frame_rate_hz <= 0.0 {
        return (1000.0 / DEFAULT_FRAME_RATE) as i64;
    }
    ((1000.0 / frame_rate_hz) as i64).max(1)
}

/// A `[start, end]` range in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl TimeWindow {
    pub fn new(start_seconds: f64, end_seconds: f64) -> Self {
        Self {
            start_seconds,
            end_seconds,
        }
    }

    /// Length of the window in seconds (may be negative for an inverted window)
    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    /// Check `0 <= start < end <= duration`
    pub fn validate(&self, source_duration: f64) -> ResizerResult<()> {
        let valid = self.start_seconds.is_finite()
            && self.end_seconds.is_finite()
            && self.start_seconds >= 0.0
            && self.end_seconds > self.start_seconds
            && self.end_seconds <= source_duration;

        if valid {
            Ok(())
        } else {
            Err(ResizerError::InvalidWindow {
                start: self.start_seconds,
                end: self.end_seconds,
                duration: source_duration,
            })
        }
    }

    /// Whether `seconds` falls inside the closed window
    pub fn contains(&self, seconds: f64) -> bool {
        seconds >= self.start_seconds && seconds <= self.end_seconds
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s - {:.3}s", self.start_seconds, self.end_seconds)
    }
}

/// Resolution divisor applied to both dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleFactor {
    #[default]
    Full,
    Half,
    Quarter,
}

impl ScaleFactor {
    pub fn divisor(&self) -> u32 {
        match self {
            ScaleFactor::Full => 1,
            ScaleFactor::Half => 2,
            ScaleFactor::Quarter => 4,
        }
    }

    pub fn from_divisor(divisor: u32) -> ResizerResult<Self> {
        match divisor {
            1 => Ok(ScaleFactor::Full),
            2 => Ok(ScaleFactor::Half),
            4 => Ok(ScaleFactor::Quarter),
            other => Err(ResizerError::InvalidScale {
                value: other.to_string(),
            }),
        }
    }

    /// `(width / divisor, height / divisor)`
    pub fn output_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let d = self.divisor();
        (width / d, height / d)
    }
}

impl FromStr for ScaleFactor {
    type Err = ResizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "full" => Ok(ScaleFactor::Full),
            "2" | "half" => Ok(ScaleFactor::Half),
            "4" | "quarter" => Ok(ScaleFactor::Quarter),
            _ => Err(ResizerError::InvalidScale {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScaleFactor::Full => "full",
            ScaleFactor::Half => "half",
            ScaleFactor::Quarter => "quarter",
        };
        write!(f, "{}", name)
    }
}

/// One decoded picture as packed RGB24 rows (no stride padding)
#[derive(Clone, PartialEq)]
pub struct DecodedFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub position_ms: i64,
}

impl DecodedFrame {
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Bytes in one packed row
    pub fn row_bytes(&self) -> usize {
        self.width as usize * Self::BYTES_PER_PIXEL
    }
}

impl fmt::Debug for DecodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("position_ms", &self.position_ms)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Direction of a single-frame step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepDirection {
    #[default]
    None,
    Forward,
    Backward,
}

/// Position request consumed by the playback worker; the latest one wins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekRequest {
    pub target_ms: i64,
    /// Produce exactly one frame and go back to idling
    pub single_frame: bool,
    pub step_direction: StepDirection,
}

/// One-shot transcode request
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub target_size_bytes: u64,
    pub scale: ScaleFactor,
    pub window: TimeWindow,
}

impl TranscodeJob {
    pub fn new(
        input_path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
        target_size_bytes: u64,
        scale: ScaleFactor,
        window: TimeWindow,
    ) -> Self {
        Self {
            input_path: input_path.as_ref().to_path_buf(),
            output_path: output_path.as_ref().to_path_buf(),
            target_size_bytes,
            scale,
            window,
        }
    }

    /// Convert a user-entered size in MB to bytes
    pub fn megabytes_to_bytes(megabytes: f64) -> ResizerResult<u64> {
        if !megabytes.is_finite() || megabytes <= 0.0 {
            return Err(ResizerError::InvalidTargetSize {
                value: megabytes.to_string(),
            });
        }
        Ok((megabytes * BYTES_PER_MEGABYTE) as u64)
    }
}

/// Timebase for timestamp calculations - rational seconds per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timebase {
    pub num: i32,
    pub den: i32,
}

impl Timebase {
    /// Create a new timebase
    pub fn new(num: i32, den: i32) -> ResizerResult<Self> {
        if den == 0 || num == 0 {
            return Err(ResizerError::DecodeFailed {
                message: format!("degenerate timebase {}/{}", num, den),
            });
        }
        Ok(Self { num, den })
    }

    /// Microsecond timebase used by container-level seeks
    pub fn av_time_base() -> Self {
        Self {
            num: 1,
            den: ffmpeg_next::ffi::AV_TIME_BASE as i32,
        }
    }

    pub fn millis() -> Self {
        Self { num: 1, den: 1000 }
    }

    /// Convert to floating point seconds
    pub fn to_seconds(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Convert PTS to seconds
    pub fn pts_to_seconds(&self, pts: i64) -> f64 {
        pts as f64 * self.num as f64 / self.den as f64
    }

    /// Convert PTS to whole milliseconds, rounding toward negative infinity
    pub fn pts_to_millis(&self, pts: i64) -> i64 {
        let num = pts as i128 * self.num as i128 * 1000;
        num.div_euclid(self.den as i128) as i64
    }

    /// Convert seconds to the nearest PTS
    pub fn seconds_to_pts(&self, seconds: f64) -> i64 {
        (seconds * self.den as f64 / self.num as f64).round() as i64
    }

    /// Rescale PTS from this timebase to `target`, rounding to nearest
    pub fn rescale_pts(&self, pts: i64, target: &Timebase) -> i64 {
        if self == target {
            return pts;
        }
        let num = pts as i128 * self.num as i128 * target.den as i128;
        let den = self.den as i128 * target.num as i128;
        let half = den.abs() / 2;
        let rounded = if (num >= 0) == (den > 0) {
            (num.abs() + half) / den.abs()
        } else {
            -((num.abs() + half) / den.abs())
        };
        rounded as i64
    }
}

impl From<ffmpeg_next::Rational> for Timebase {
    fn from(r: ffmpeg_next::Rational) -> Self {
        Self {
            num: r.numerator(),
            den: r.denominator(),
        }
    }
}

impl From<Timebase> for ffmpeg_next::Rational {
    fn from(tb: Timebase) -> Self {
        ffmpeg_next::Rational::new(tb.num, tb.den)
    }
}
