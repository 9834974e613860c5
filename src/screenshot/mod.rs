//! Screenshot capability: collaborator interfaces and the default handlers.
//!
//! The MCP core never talks to the desktop, OCR engine, LLM, or usage
//! counters directly. It goes through the traits below, which the server
//! wires to the real implementations and tests replace with fakes.
//!
//! # Collaborators
//!
//! | Trait | Default implementation |
//! |-------|------------------------|
//! | [`ScreenCapture`] | [`CommandCapture`] (`scrot -u`) |
//! | [`TextExtractor`] | [`TesseractExtractor`] (`tesseract <image> stdout`) |
//! | [`ImageAnalyzer`] | [`XaiAnalyzer`] (OpenAI-compatible chat completions) |
//! | [`UsageLimiter`] | [`FileUsageLimiter`] (daily count file + out-of-tokens flag) |

mod analysis;
mod capture;
mod handlers;
mod limiter;
mod ocr;

pub use analysis::{ChatContent, ChatMessage, ImageUrl, XaiAnalyzer};
pub use capture::CommandCapture;
pub use handlers::{
    ScreenshotService, CODE_REVIEW_PROMPT, LATEST_SCREENSHOT_URI, SCREENSHOT_ANALYSIS_PROMPT,
    TAKE_SCREENSHOT_TOOL,
};
pub use limiter::FileUsageLimiter;
pub use ocr::TesseractExtractor;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;

/// Captures the active window to a file.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Writes a PNG of the active window to `output`.
    ///
    /// Returns `false` on any failure, including timeout. Never retries.
    async fn capture(&self, output: &Path) -> bool;
}

/// Extracts text from an image.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Returns the trimmed text in `image`, or `None` if there is none or
    /// extraction failed.
    async fn extract_text(&self, image: &Path) -> Option<String>;
}

/// What to ask the analyzer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// A general description of the screenshot.
    Description,
    /// An answer to a specific question.
    Question,
    /// A description and an answer.
    Both,
}

impl AnalysisMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::Question => "question",
            Self::Both => "both",
        }
    }

    /// Whether this mode produces a description.
    #[must_use]
    pub const fn wants_description(self) -> bool {
        matches!(self, Self::Description | Self::Both)
    }

    /// Whether this mode needs a question.
    #[must_use]
    pub const fn wants_answer(self) -> bool {
        matches!(self, Self::Question | Self::Both)
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "description" => Ok(Self::Description),
            "question" => Ok(Self::Question),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown analysis mode '{other}'")),
        }
    }
}

/// Vision-language model access.
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    /// Analyses the screenshot at `image`.
    ///
    /// `question` is only meaningful for [`AnalysisMode::Question`].
    async fn analyze(&self, image: &Path, mode: AnalysisMode, question: Option<&str>)
        -> Option<String>;

    /// Runs a free-form chat completion.
    async fn generate(&self, messages: Vec<ChatMessage>, max_tokens: u32) -> Option<String>;

    /// Name of the model reported to clients.
    fn model(&self) -> &str;
}

/// Daily usage accounting.
#[async_trait]
pub trait UsageLimiter: Send + Sync {
    /// Screenshots taken today.
    async fn daily_count(&self) -> u64;

    /// Records one more screenshot and returns today's new count.
    async fn increment(&self) -> u64;

    /// Whether no further screenshots may be taken today.
    async fn is_exceeded(&self) -> bool;

    /// Checks the limit and records one more screenshot as a single step.
    ///
    /// Returns today's new count, or `None` if the limit is reached. Two
    /// concurrent callers never both get through the last free slot.
    async fn try_acquire(&self) -> Option<u64>;

    /// Blocks further screenshots after the analyzer reported it ran out of tokens.
    async fn mark_out_of_tokens(&self);
}

/// The four collaborators the server depends on.
#[derive(Clone)]
pub struct Collaborators {
    /// Screen capture.
    pub capture: Arc<dyn ScreenCapture>,
    /// OCR.
    pub extractor: Arc<dyn TextExtractor>,
    /// Image analysis and sampling.
    pub analyzer: Arc<dyn ImageAnalyzer>,
    /// Usage limits.
    pub limiter: Arc<dyn UsageLimiter>,
}

impl Collaborators {
    /// Builds the default, process-backed collaborators from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client for the analyzer cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self {
            capture: Arc::new(CommandCapture::new(config.capture.capture_timeout())),
            extractor: Arc::new(TesseractExtractor::new(config.capture.ocr_timeout())),
            analyzer: Arc::new(XaiAnalyzer::from_config(&config.analysis)?),
            limiter: Arc::new(FileUsageLimiter::new(
                config.limits.count_file.clone(),
                config.limits.tokens_flag.clone(),
                config.limits.daily_limit,
            )),
        })
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("model", &self.analyzer.model())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing() {
        assert_eq!("both".parse::<AnalysisMode>(), Ok(AnalysisMode::Both));
        assert!("summary".parse::<AnalysisMode>().is_err());
        assert!(AnalysisMode::Both.wants_description());
        assert!(AnalysisMode::Both.wants_answer());
        assert!(!AnalysisMode::Description.wants_answer());
        assert!(!AnalysisMode::Question.wants_description());
    }
}
