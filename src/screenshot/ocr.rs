//! OCR through the `tesseract` command-line tool.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::TextExtractor;

/// Runs `tesseract <image> stdout` and returns its trimmed output.
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    program: OsString,
    timeout: Duration,
}

impl TesseractExtractor {
    /// Uses `tesseract` from `PATH`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self::with_program("tesseract", timeout)
    }

    /// Uses a specific tesseract binary.
    #[must_use]
    pub fn with_program(program: impl Into<OsString>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl TextExtractor for TesseractExtractor {
    async fn extract_text(&self, image: &Path) -> Option<String> {
        let output = Command::new(&self.program)
            .arg(image)
            .arg("stdout")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to run OCR");
                return None;
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "OCR timed out");
                return None;
            }
        };

        if !output.status.success() {
            warn!(status = %output.status, "OCR exited with failure");
            return None;
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(chars = text.len(), "OCR finished");
        (!text.is_empty()).then_some(text)
    }
}
