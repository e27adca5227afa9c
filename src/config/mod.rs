//! Layered application configuration
//!
//! Precedence, lowest first: built-in defaults, TOML file, environment,
//! command-line flags (applied by the CLI layer).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ResizerError, ResizerResult};
use crate::utils::logging::LoggingConfig;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "resizer.toml";

/// Suffix appended to the input stem when deriving an output name
pub const DEFAULT_SUFFIX: &str = "RESIZED";

const ENV_LOG_LEVEL: &str = "RESIZER_LOG_LEVEL";
const ENV_SUFFIX: &str = "RESIZER_SUFFIX";
const ENV_HW_ENCODER: &str = "RESIZER_HW_ENCODER";
const ENV_PREFER_HARDWARE: &str = "RESIZER_PREFER_HARDWARE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub output: OutputConfig,
    pub encoder: EncoderConfig,
    pub playback: PlaybackConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Hardware H.264 encoder tried first
    pub hardware_encoder: String,
    pub prefer_hardware: bool,
    /// x264 preset used by the software fallback
    pub software_preset: String,
    /// Share of the size budget given to video
    pub size_headroom: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            hardware_encoder: "h264_nvenc".to_string(),
            prefer_hardware: true,
            software_preset: "medium".to_string(),
            size_headroom: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Upper bound on waiting for the playback worker at shutdown
    pub join_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: 2000,
        }
    }
}

impl AppConfig {
    /// Defaults, then `path` (or `resizer.toml` in the working directory if
    /// present), then the process environment.
    pub fn load(path: Option<&Path>) -> ResizerResult<Self> {
        let mut config = match Self::resolve_file(path)? {
            Some(file) => {
                info!("Loading configuration from: {}", file.display());
                let content = std::fs::read_to_string(&file).map_err(|e| ResizerError::ConfigError {
                    message: format!("cannot read {}: {}", file.display(), e),
                })?;
                Self::from_toml_str(&content)?
            }
            None => {
                debug!("No configuration file, using defaults");
                Self::default()
            }
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> ResizerResult<Self> {
        toml::from_str(content).map_err(|e| ResizerError::ConfigError {
            message: format!("failed to parse TOML config: {}", e),
        })
    }

    /// Apply `RESIZER_*` overrides from the process environment
    pub fn apply_env(&mut self) -> ResizerResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `RESIZER_*` overrides from an arbitrary lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> ResizerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut overrides = 0;

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level.parse()?;
            overrides += 1;
        }
        if let Some(suffix) = lookup(ENV_SUFFIX) {
            self.output.suffix = suffix;
            overrides += 1;
        }
        if let Some(encoder) = lookup(ENV_HW_ENCODER) {
            self.encoder.hardware_encoder = encoder;
            overrides += 1;
        }
        if let Some(prefer) = lookup(ENV_PREFER_HARDWARE) {
            self.encoder.prefer_hardware = parse_bool(ENV_PREFER_HARDWARE, &prefer)?;
            overrides += 1;
        }

        if overrides > 0 {
            debug!("Applied {} environment variable overrides", overrides);
        }
        Ok(())
    }

    pub fn validate(&self) -> ResizerResult<()> {
        let headroom = self.encoder.size_headroom;
        if !(headroom > 0.0 && headroom <= 1.0) {
            return Err(ResizerError::ConfigError {
                message: format!("encoder.size_headroom must be in (0, 1], got {}", headroom),
            });
        }
        if self.playback.join_timeout_ms == 0 {
            return Err(ResizerError::ConfigError {
                message: "playback.join_timeout_ms must be positive".to_string(),
            });
        }
        Ok(())
    }

    fn resolve_file(path: Option<&Path>) -> ResizerResult<Option<PathBuf>> {
        match path {
            Some(p) if p.is_file() => Ok(Some(p.to_path_buf())),
            Some(p) => Err(ResizerError::ConfigError {
                message: format!("config file not found: {}", p.display()),
            }),
            None => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                Ok(local.is_file().then_some(local))
            }
        }
    }
}

fn parse_bool(key: &str, value: &str) -> ResizerResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ResizerError::ConfigError {
            message: format!("{} expects a boolean, got '{}'", key, other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::logging::{LogFormat, LogLevel};
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.output.suffix, "RESIZED");
        assert_eq!(config.encoder.hardware_encoder, "h264_nvenc");
        assert!(config.encoder.prefer_hardware);
        assert_eq!(config.encoder.software_preset, "medium");
        assert_eq!(config.encoder.size_headroom, 0.95);
        assert_eq!(config.playback.join_timeout_ms, 2000);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [output]
            suffix = "SMALL"

            [encoder]
            prefer_hardware = false

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.output.suffix, "SMALL");
        assert!(!config.encoder.prefer_hardware);
        assert_eq!(config.encoder.hardware_encoder, "h264_nvenc");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.playback.join_timeout_ms, 2000);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            AppConfig::from_toml_str("[output\nsuffix = 3"),
            Err(ResizerError::ConfigError { .. })
        ));
        assert!(AppConfig::from_toml_str("[logging]\nlevel = \"chatty\"").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = AppConfig::from_toml_str("[output]\nsuffix = \"FROM_FILE\"").unwrap();
        let env: HashMap<&str, &str> = [
            ("RESIZER_SUFFIX", "FROM_ENV"),
            ("RESIZER_PREFER_HARDWARE", "no"),
            ("RESIZER_HW_ENCODER", "h264_qsv"),
            ("RESIZER_LOG_LEVEL", "trace"),
        ]
        .into_iter()
        .collect();

        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.output.suffix, "FROM_ENV");
        assert!(!config.encoder.prefer_hardware);
        assert_eq!(config.encoder.hardware_encoder, "h264_qsv");
        assert_eq!(config.logging.level, LogLevel::Trace);
    }

    #[test]
    fn test_bad_env_boolean() {
        let mut config = AppConfig::default();
        let result = config.apply_env_from(|key| {
            (key == "RESIZER_PREFER_HARDWARE").then(|| "maybe".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[playback]\njoin_timeout_ms = 750\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.playback.join_timeout_ms, 750);

        assert!(AppConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_validate_headroom() {
        let mut config = AppConfig::default();
        config.encoder.size_headroom = 1.5;
        assert!(config.validate().is_err());
    }
}
