//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk, layering
//! `SCREENSHOT_*` environment overrides on top, and validating the result.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path specified via `--config` CLI flag (must exist)
//! 2. Default location (optional; built-in defaults apply if absent):
//!    - **Linux/macOS:** `~/.mcp-screenshot-server/config.json`
//!    - **Windows:** `%USERPROFILE%\.mcp-screenshot-server\config.json`
//!
//! # Environment Overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `SCREENSHOT_HOST` | `server.host` |
//! | `SCREENSHOT_PORT` | `server.port` |
//! | `SCREENSHOT_TEMP_DIR` | `capture.temp_dir` |
//! | `SCREENSHOT_SUBPROCESS_TIMEOUT` | `capture.capture_timeout_secs` |
//! | `SCREENSHOT_OCR_TIMEOUT` | `capture.ocr_timeout_secs` |
//! | `SCREENSHOT_API_TIMEOUT` | `analysis.timeout_secs` |
//! | `SCREENSHOT_DAILY_LIMIT` | `limits.daily_limit` |
//! | `SCREENSHOT_COUNT_FILE` | `limits.count_file` |
//! | `SCREENSHOT_TOKENS_FLAG` | `limits.tokens_flag` |
//! | `SCREENSHOT_LOG_LEVEL` | `logging.level` |

mod settings;

pub use settings::{
    AnalysisConfig, CaptureConfig, Config, LimitsConfig, LoggingConfig, ServerConfig, LOG_LEVELS,
};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.mcp-screenshot-server/`
/// - **Windows:** `%USERPROFILE%\.mcp-screenshot-server\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".mcp-screenshot-server"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads the configuration with overrides from the process environment.
///
/// If `path` is `None`, uses the platform-specific default location.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file does not exist
/// - The file cannot be read
/// - The JSON is malformed
/// - An environment override does not parse
/// - A value fails validation
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_config_with(path, |name| std::env::var(name).ok())
}

/// Like [`load_config`], with environment lookups routed through `lookup`.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            read_config_file(p)?
        }
        None => match default_config_path() {
            Some(p) if p.exists() => read_config_file(&p)?,
            _ => Config::default(),
        },
    };

    config.apply_overrides(lookup)?;
    config.validate()?;

    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_config_path_exists() {
        let path = default_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("config.json"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        let err = load_config_with(Some(&missing), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { path } if path == missing));
    }

    #[test]
    fn loads_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"server": {"port": 9100}, "limits": {"daily_limit": 5}}"#)
            .unwrap();

        let config = load_config_with(Some(&path), |name| {
            (name == "SCREENSHOT_DAILY_LIMIT").then(|| "9".to_string())
        })
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.limits.daily_limit, 9);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_config_with(Some(&path), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn invalid_override_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();
        let err = load_config_with(Some(&path), |name| {
            (name == "SCREENSHOT_LOG_LEVEL").then(|| "chatty".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }
}
