//! Screenshot analysis and sampling through an OpenAI-compatible
//! chat-completions API (xAI by default).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{AnalysisMode, ImageAnalyzer};
use crate::config::AnalysisConfig;

/// Longest prefix of the prompt echoed back by the simulated analyzer.
const SIMULATED_ECHO_CHARS: usize = 100;

/// One chat message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// `user`, `assistant`, or `system`.
    pub role: String,
    /// Message parts.
    pub content: Vec<ChatContent>,
}

impl ChatMessage {
    /// A message with one text part.
    #[must_use]
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: vec![ChatContent::Text { text: text.into() }],
        }
    }

    fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|part| match part {
            ChatContent::Text { text } => Some(text.as_str()),
            ChatContent::ImageUrl { .. } => None,
        })
    }
}

/// A chat message part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// An image, usually a `data:` URL.
    ImageUrl {
        /// Image location.
        image_url: ImageUrl,
    },
}

impl ChatContent {
    /// An inline base64 image.
    #[must_use]
    pub fn data_url(mime_type: &str, base64_data: &str) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{mime_type};base64,{base64_data}"),
            },
        }
    }
}

/// Image reference inside [`ChatContent::ImageUrl`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageUrl {
    /// URL or `data:` URI.
    pub url: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat-completions client.
///
/// Without an API key every call returns a clearly labelled simulated
/// response instead of contacting the API.
#[derive(Debug, Clone)]
pub struct XaiAnalyzer {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl XaiAnalyzer {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.filter(|key| !key.is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens,
        })
    }

    /// Creates a client from configuration, reading the key from `api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, reqwest::Error> {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            info!(
                variable = %config.api_key_env,
                "No analysis API key set, responses will be simulated"
            );
        }
        Self::new(
            api_key,
            config.base_url.clone(),
            config.model.clone(),
            config.max_tokens,
            config.timeout(),
        )
    }

    /// Whether calls go to the real API.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.api_key.is_some()
    }

    fn simulate(messages: &[ChatMessage]) -> String {
        let prompt = messages.last().and_then(ChatMessage::first_text).unwrap_or_default();
        let echoed: String = prompt.chars().take(SIMULATED_ECHO_CHARS).collect();
        format!("Simulated response to: {echoed}...")
    }

    async fn complete(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<Option<String>, String> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens,
            temperature: 0.7,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("API returned {status}: {body}"));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| format!("failed to parse response: {e}"))?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content))
    }
}

#[async_trait]
impl ImageAnalyzer for XaiAnalyzer {
    async fn analyze(
        &self,
        image: &Path,
        mode: AnalysisMode,
        question: Option<&str>,
    ) -> Option<String> {
        let bytes = match tokio::fs::read(image).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %image.display(), error = %e, "Cannot read screenshot for analysis");
                return None;
            }
        };

        let instruction = match question {
            Some(question) => {
                format!("Analyze this screenshot in {mode} mode with question: {question}.")
            }
            None => format!("Analyze this screenshot in {mode} mode."),
        };
        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: vec![
                ChatContent::data_url("image/png", &BASE64.encode(bytes)),
                ChatContent::Text { text: instruction },
            ],
        }];

        self.generate(messages, self.max_tokens).await
    }

    async fn generate(&self, messages: Vec<ChatMessage>, max_tokens: u32) -> Option<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Some(Self::simulate(&messages));
        };

        debug!(model = %self.model, messages = messages.len(), max_tokens, "Requesting completion");
        match self.complete(api_key, &messages, max_tokens).await {
            Ok(text) => text,
            Err(e) => {
                warn!(model = %self.model, error = %e, "Completion failed");
                None
            }
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}
