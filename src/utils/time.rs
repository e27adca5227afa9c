//! Time parsing and formatting for user-entered positions

use crate::error::{ResizerError, ResizerResult};

/// Parser for `SS.ms`, `MM:SS.ms` and `HH:MM:SS.ms` positions
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeParser;

impl TimeParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a time string to seconds.
    ///
    /// Fields after the first must be below 60. Negative or non-finite values
    /// are rejected.
    pub fn parse_time(&self, time_str: &str) -> ResizerResult<f64> {
        let time_str = time_str.trim();
        let invalid = || ResizerError::InvalidTimeFormat {
            time: time_str.to_string(),
        };

        let parts: Vec<&str> = time_str.split(':').collect();
        if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid());
        }

        let mut seconds = 0.0;
        for (i, part) in parts.iter().enumerate() {
            let value: f64 = part.trim().parse().map_err(|_| invalid())?;
            if !value.is_finite() || value < 0.0 {
                return Err(invalid());
            }
            // Only the last field may carry a fraction; inner fields wrap at 60
            let is_last = i + 1 == parts.len();
            if i > 0 && value >= 60.0 {
                return Err(invalid());
            }
            if !is_last && value.fract() != 0.0 {
                return Err(invalid());
            }
            seconds = seconds * 60.0 + value;
        }

        Ok(seconds)
    }

    /// Parse a time string to whole milliseconds
    pub fn parse_millis(&self, time_str: &str) -> ResizerResult<i64> {
        self.parse_time(time_str)
            .map(|seconds| (seconds * 1000.0).round() as i64)
    }

    /// Format seconds as `MM:SS.mmm`, or `HH:MM:SS.mmm` from one hour up
    pub fn format_time(&self, seconds: f64) -> String {
        let total_ms = if seconds.is_finite() && seconds > 0.0 {
            (seconds * 1000.0).round() as u64
        } else {
            0
        };
        let hours = total_ms / 3_600_000;
        let minutes = (total_ms / 60_000) % 60;
        let secs = (total_ms / 1000) % 60;
        let millis = total_ms % 1000;

        if hours > 0 {
            format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
        } else {
            format!("{:02}:{:02}.{:03}", minutes, secs, millis)
        }
    }
}
