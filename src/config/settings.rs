//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Every section and field is optional; missing values take the defaults
//! documented on each field.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Log levels accepted by `logging.level`.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// HTTP server and state settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Capture and OCR settings.
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Image analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Usage limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::ValidationError { message });

        if self.server.port == 0 {
            return invalid("server.port must be non-zero".to_string());
        }
        if self.server.queue_capacity == 0 {
            return invalid("server.queue_capacity must be at least 1".to_string());
        }
        for (name, secs) in [
            ("server.sse_idle_timeout_secs", self.server.sse_idle_timeout_secs),
            ("server.task_sweep_interval_secs", self.server.task_sweep_interval_secs),
        ] {
            if secs == 0 {
                return invalid(format!("{name} must be non-zero"));
            }
        }
        for (name, secs) in [
            ("capture.capture_timeout_secs", self.capture.capture_timeout_secs),
            ("capture.ocr_timeout_secs", self.capture.ocr_timeout_secs),
            ("analysis.timeout_secs", self.analysis.timeout_secs),
        ] {
            if !secs.is_finite() || secs <= 0.0 {
                return invalid(format!("{name} must be a positive number of seconds"));
            }
        }
        if self.analysis.max_tokens == 0 {
            return invalid("analysis.max_tokens must be non-zero".to_string());
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return invalid(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }
        Ok(())
    }

    /// Applies `SCREENSHOT_*` overrides looked up through `lookup`.
    ///
    /// `lookup` is usually `|name| std::env::var(name).ok()`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] if a variable is set to a
    /// value that does not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SCREENSHOT_HOST") {
            self.server.host = host;
        }
        override_parsed(&lookup, "SCREENSHOT_PORT", &mut self.server.port)?;
        if let Some(dir) = lookup("SCREENSHOT_TEMP_DIR") {
            self.capture.temp_dir = Some(PathBuf::from(dir));
        }
        override_parsed(
            &lookup,
            "SCREENSHOT_SUBPROCESS_TIMEOUT",
            &mut self.capture.capture_timeout_secs,
        )?;
        override_parsed(&lookup, "SCREENSHOT_OCR_TIMEOUT", &mut self.capture.ocr_timeout_secs)?;
        override_parsed(&lookup, "SCREENSHOT_API_TIMEOUT", &mut self.analysis.timeout_secs)?;
        override_parsed(&lookup, "SCREENSHOT_DAILY_LIMIT", &mut self.limits.daily_limit)?;
        if let Some(path) = lookup("SCREENSHOT_COUNT_FILE") {
            self.limits.count_file = PathBuf::from(path);
        }
        if let Some(path) = lookup("SCREENSHOT_TOKENS_FLAG") {
            self.limits.tokens_flag = PathBuf::from(path);
        }
        if let Some(level) = lookup("SCREENSHOT_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, variable: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(variable) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidOverride {
                variable: variable.to_string(),
                value,
            })?;
    }
    Ok(())
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// HTTP server and in-memory state configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address. Default: `0.0.0.0`
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port. Default: `8000`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds without a notification before an SSE stream sends a ping.
    /// Default: 30
    #[serde(default = "default_sse_idle_timeout")]
    pub sse_idle_timeout_secs: u64,

    /// Notifications buffered per session before the oldest is dropped.
    /// Default: 256
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Lifetime of tasks created by tools, in seconds. `0` keeps them forever.
    /// Default: 3600
    #[serde(default = "default_task_ttl")]
    pub task_ttl_secs: u64,

    /// Seconds between sweeps for expired tasks. Default: 60
    #[serde(default = "default_sweep_interval")]
    pub task_sweep_interval_secs: u64,
}

impl ServerConfig {
    /// SSE idle timeout.
    #[must_use]
    pub const fn sse_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.sse_idle_timeout_secs)
    }

    /// Task TTL, or `None` if tasks never expire.
    #[must_use]
    pub const fn task_ttl(&self) -> Option<Duration> {
        if self.task_ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.task_ttl_secs))
        }
    }

    /// Interval between expiry sweeps.
    #[must_use]
    pub const fn task_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.task_sweep_interval_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sse_idle_timeout_secs: default_sse_idle_timeout(),
            queue_capacity: default_queue_capacity(),
            task_ttl_secs: default_task_ttl(),
            task_sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8000
}

const fn default_sse_idle_timeout() -> u64 {
    30
}

const fn default_queue_capacity() -> usize {
    crate::state::DEFAULT_QUEUE_CAPACITY
}

const fn default_task_ttl() -> u64 {
    3600
}

const fn default_sweep_interval() -> u64 {
    60
}

/// Screenshot capture and OCR configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    /// Directory for temporary captures. Default: the system temp directory.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Capture command timeout in seconds. Default: 10
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_secs: f64,

    /// OCR timeout in seconds. Default: 30
    #[serde(default = "default_ocr_timeout")]
    pub ocr_timeout_secs: f64,
}

impl CaptureConfig {
    /// Capture command timeout.
    #[must_use]
    pub fn capture_timeout(&self) -> Duration {
        secs(self.capture_timeout_secs)
    }

    /// OCR timeout.
    #[must_use]
    pub fn ocr_timeout(&self) -> Duration {
        secs(self.ocr_timeout_secs)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            capture_timeout_secs: default_capture_timeout(),
            ocr_timeout_secs: default_ocr_timeout(),
        }
    }
}

const fn default_capture_timeout() -> f64 {
    10.0
}

const fn default_ocr_timeout() -> f64 {
    30.0
}

/// Vision model configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Environment variable holding the API key. Default: `XAI_API_KEY`
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the chat-completions API. Default: `https://api.x.ai/v1`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name. Default: `grok-4`
    #[serde(default = "default_model")]
    pub model: String,

    /// Token limit for screenshot analysis. Default: 1000
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds. Default: 60
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: f64,
}

impl AnalysisConfig {
    /// Request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_api_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "XAI_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://api.x.ai/v1".to_string()
}

fn default_model() -> String {
    "grok-4".to_string()
}

const fn default_max_tokens() -> u32 {
    1000
}

const fn default_api_timeout() -> f64 {
    60.0
}

/// Daily usage limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Screenshots allowed per calendar day. Default: 1000
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u64,

    /// File holding today's count. Default: `/tmp/screenshot_daily_count.txt`
    #[serde(default = "default_count_file")]
    pub count_file: PathBuf,

    /// File whose existence blocks further screenshots.
    /// Default: `/tmp/out_of_tokens.flag`
    #[serde(default = "default_tokens_flag")]
    pub tokens_flag: PathBuf,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            count_file: default_count_file(),
            tokens_flag: default_tokens_flag(),
        }
    }
}

const fn default_daily_limit() -> u64 {
    1000
}

fn default_count_file() -> PathBuf {
    PathBuf::from("/tmp/screenshot_daily_count.txt")
}

fn default_tokens_flag() -> PathBuf {
    PathBuf::from("/tmp/out_of_tokens.flag")
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
