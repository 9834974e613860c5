//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use mcp_screenshot_server::config::Config;
use mcp_screenshot_server::mcp::McpServer;
use mcp_screenshot_server::screenshot::{
    AnalysisMode, ChatContent, ChatMessage, Collaborators, ImageAnalyzer, ScreenCapture,
    TextExtractor, UsageLimiter,
};

/// Writes a few fake PNG bytes.
pub struct FakeCapture;

#[async_trait]
impl ScreenCapture for FakeCapture {
    async fn capture(&self, output: &Path) -> bool {
        std::fs::write(output, b"\x89PNG\r\n\x1a\nfake").is_ok()
    }
}

pub struct FakeOcr;

#[async_trait]
impl TextExtractor for FakeOcr {
    async fn extract_text(&self, _image: &Path) -> Option<String> {
        Some("Hello, world".to_string())
    }
}

pub struct FakeAnalyzer;

#[async_trait]
impl ImageAnalyzer for FakeAnalyzer {
    async fn analyze(
        &self,
        _image: &Path,
        mode: AnalysisMode,
        question: Option<&str>,
    ) -> Option<String> {
        match mode {
            AnalysisMode::Question => Some(format!("You asked: {}", question.unwrap_or(""))),
            _ => Some("A terminal window".to_string()),
        }
    }

    async fn generate(&self, messages: Vec<ChatMessage>, _max_tokens: u32) -> Option<String> {
        let text = messages.iter().rev().find_map(|m| {
            m.content.iter().find_map(|c| match c {
                ChatContent::Text { text } => Some(text.clone()),
                ChatContent::ImageUrl { .. } => None,
            })
        })?;
        Some(format!("Reply to: {text}"))
    }

    fn model(&self) -> &str {
        "fake-vision"
    }
}

/// Counts in memory with a fixed limit.
pub struct FakeLimiter {
    pub count: AtomicU64,
    pub limit: u64,
}

#[async_trait]
impl UsageLimiter for FakeLimiter {
    async fn daily_count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    async fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn is_exceeded(&self) -> bool {
        self.count.load(Ordering::SeqCst) >= self.limit
    }

    async fn try_acquire(&self) -> Option<u64> {
        self.count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .ok()
            .map(|previous| previous + 1)
    }

    async fn mark_out_of_tokens(&self) {
        self.count.store(self.limit, Ordering::SeqCst);
    }
}

pub fn collaborators(limit: u64) -> Collaborators {
    Collaborators {
        capture: Arc::new(FakeCapture),
        extractor: Arc::new(FakeOcr),
        analyzer: Arc::new(FakeAnalyzer),
        limiter: Arc::new(FakeLimiter {
            count: AtomicU64::new(0),
            limit,
        }),
    }
}

/// A server backed by fakes, pinging idle SSE streams after one second.
pub fn test_server() -> McpServer {
    let mut config = Config::default();
    config.server.sse_idle_timeout_secs = 1;
    McpServer::with_collaborators(config, collaborators(100))
}
