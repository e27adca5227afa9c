//! Common utilities and helpers

pub mod logging;
pub mod time;

/// Utility functions for display
pub struct Utils;

impl Utils {
    /// Format file size for display
    pub fn format_file_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Format a bitrate in bits per second
    pub fn format_bitrate(bits_per_second: u64) -> String {
        if bits_per_second >= 1_000_000 {
            format!("{:.2} Mb/s", bits_per_second as f64 / 1_000_000.0)
        } else if bits_per_second >= 1_000 {
            format!("{:.1} kb/s", bits_per_second as f64 / 1_000.0)
        } else {
            format!("{} b/s", bits_per_second)
        }
    }
}
