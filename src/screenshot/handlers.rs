//! The screenshot tool, resource, and prompts registered by default.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{AnalysisMode, Collaborators};
use crate::error::{HandlerError, HandlerResult};
use crate::mcp::types::{
    Arguments, CallToolResult, ContentBlock, Prompt, PromptArgument, PromptMessage,
    ReadResourceResult, Resource, Role, Tool,
};
use crate::registry::{PromptRegistry, ResourceRegistry, ToolRegistry};
use crate::state::{StateStore, TaskStatus, TaskUpdate};

/// Name of the screenshot tool.
pub const TAKE_SCREENSHOT_TOOL: &str = "take_screenshot";
/// URI of the most recent capture.
pub const LATEST_SCREENSHOT_URI: &str = "screenshot://latest";
/// Name of the general analysis prompt.
pub const SCREENSHOT_ANALYSIS_PROMPT: &str = "screenshot_analysis";
/// Name of the code review prompt.
pub const CODE_REVIEW_PROMPT: &str = "code_review_screenshot";

const PNG_MIME: &str = "image/png";
const ANALYSIS_UNAVAILABLE: &str = "Analysis unavailable.";
const INVALID_MODE: &str = "Invalid mode. Must be 'description', 'question', or 'both'.";
const MODE_DESCRIPTION: &str = "'description' for a detailed description, \
    'question' to answer a specific question, 'both' for both.";

/// Owns the latest capture and implements the default capabilities.
pub struct ScreenshotService {
    collaborators: Collaborators,
    state: Arc<StateStore>,
    latest: RwLock<Option<Arc<Vec<u8>>>>,
    temp_dir: Option<PathBuf>,
    task_ttl: Option<Duration>,
}

impl ScreenshotService {
    /// Creates the service.
    ///
    /// Captures are written below `temp_dir` (the system temp directory if
    /// `None`). Each `take_screenshot` call is tracked as a task living for
    /// `task_ttl`.
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        state: Arc<StateStore>,
        temp_dir: Option<PathBuf>,
        task_ttl: Option<Duration>,
    ) -> Self {
        Self {
            collaborators,
            state,
            latest: RwLock::new(None),
            temp_dir,
            task_ttl,
        }
    }

    /// Registers the tool, resource, and prompts.
    pub fn register(
        self: &Arc<Self>,
        tools: &ToolRegistry,
        resources: &ResourceRegistry,
        prompts: &PromptRegistry,
    ) {
        let service = Arc::clone(self);
        tools.register(tool_definition(), move |arguments: Arguments| {
            let service = Arc::clone(&service);
            async move { service.take_screenshot(arguments).await }
        });

        let service = Arc::clone(self);
        resources.register(resource_definition(), move |_uri: String| {
            let service = Arc::clone(&service);
            async move { Ok::<_, HandlerError>(service.read_latest()) }
        });

        prompts.register(analysis_prompt_definition(), |arguments: Arguments| async move {
            Ok::<_, HandlerError>(analysis_prompt_messages(&arguments))
        });
        prompts.register(code_review_prompt_definition(), |_arguments: Arguments| async {
            Ok::<_, HandlerError>(code_review_prompt_messages())
        });
    }

    /// Bytes of the most recent successful capture.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<Vec<u8>>> {
        self.latest.read().clone()
    }

    /// Contents of `screenshot://latest`.
    #[must_use]
    pub fn read_latest(&self) -> ReadResourceResult {
        match self.latest() {
            Some(bytes) => ReadResourceResult {
                contents: vec![ContentBlock::image(BASE64.encode(bytes.as_slice()), PNG_MIME)],
            },
            None => ReadResourceResult::text("No screenshot has been captured yet."),
        }
    }

    /// Handles a `take_screenshot` call.
    ///
    /// Argument problems, the daily limit, and capture failures are reported
    /// as error-flagged text results.
    ///
    /// # Errors
    ///
    /// Does not return `Err`; every failure is reported in the result.
    #[instrument(skip_all, name = "take_screenshot")]
    pub async fn take_screenshot(&self, arguments: Arguments) -> HandlerResult<CallToolResult> {
        let (mode, question) = match parse_arguments(&arguments) {
            Ok(parsed) => parsed,
            Err(message) => return Ok(CallToolResult::error(message)),
        };

        let Some(count) = self.collaborators.limiter.try_acquire().await else {
            warn!("Daily screenshot limit reached");
            return Ok(CallToolResult::error("Daily screenshot limit exceeded."));
        };
        info!(%mode, daily_count = count, "Taking screenshot");

        let task_id = Uuid::new_v4().to_string();
        self.state
            .create_task(
                &task_id,
                TAKE_SCREENSHOT_TOOL,
                Some(format!("Screenshot ({mode})")),
                self.task_ttl,
            )
            .await;
        self.record(&task_id, TaskUpdate::status(TaskStatus::Running))
            .await;

        match self.capture_and_analyze(mode, question.as_deref()).await {
            Ok((content, bytes)) => {
                *self.latest.write() = Some(Arc::new(bytes));
                self.state
                    .notify_resource_update(LATEST_SCREENSHOT_URI, None)
                    .await;

                let result = serde_json::to_value(&content).unwrap_or(Value::Null);
                self.record(
                    &task_id,
                    TaskUpdate::status(TaskStatus::Completed).with_result(result),
                )
                .await;
                Ok(CallToolResult::new(content))
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Screenshot failed");
                let error = json!({ "message": e.to_string() });
                self.record(&task_id, TaskUpdate::status(TaskStatus::Failed).with_error(error))
                    .await;
                Ok(CallToolResult::error(format!("Error capturing screenshot: {e}")))
            }
        }
    }

    /// Applies a task update, tolerating tasks that were cancelled meanwhile.
    async fn record(&self, task_id: &str, update: TaskUpdate) {
        match self.state.update_task(task_id, update).await {
            Ok(Some(_)) => {}
            Ok(None) => debug!(task_id, "Task vanished before update"),
            Err(e) => debug!(task_id, error = %e, "Task update skipped"),
        }
    }

    async fn capture_and_analyze(
        &self,
        mode: AnalysisMode,
        question: Option<&str>,
    ) -> HandlerResult<(Vec<ContentBlock>, Vec<u8>)> {
        // Removed with everything in it when dropped.
        let dir = self.scratch_dir()?;
        let path = dir.path().join("screenshot.png");

        if !self.collaborators.capture.capture(&path).await {
            return Err(HandlerError::Capture);
        }
        let bytes = tokio::fs::read(&path).await?;

        let mut content = Vec::new();
        if mode.wants_description() {
            let description = self.analyze(&path, AnalysisMode::Description, None).await?;
            content.push(ContentBlock::text(format!("Description: {description}")));
        }
        if mode.wants_answer() {
            let answer = self.analyze(&path, AnalysisMode::Question, question).await?;
            content.push(ContentBlock::text(format!("Answer: {answer}")));
        }
        if let Some(text) = self.collaborators.extractor.extract_text(&path).await {
            content.push(ContentBlock::text(format!("Extracted text:\n{text}")));
        }

        Ok((content, bytes))
    }

    /// Runs one analysis, falling back to a placeholder when it is unavailable.
    ///
    /// A reply saying the model is out of tokens sets the limiter's flag and
    /// fails the capture.
    async fn analyze(
        &self,
        path: &Path,
        mode: AnalysisMode,
        question: Option<&str>,
    ) -> HandlerResult<String> {
        let Some(text) = self.collaborators.analyzer.analyze(path, mode, question).await else {
            return Ok(ANALYSIS_UNAVAILABLE.to_string());
        };
        if reports_out_of_tokens(&text) {
            self.collaborators.limiter.mark_out_of_tokens().await;
            return Err(HandlerError::Collaborator {
                collaborator: "analysis",
                message: "model is out of tokens".to_string(),
            });
        }
        Ok(text)
    }

    fn scratch_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mcp_screenshot_");
        match &self.temp_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
    }
}

fn reports_out_of_tokens(text: &str) -> bool {
    text.to_lowercase().contains("out of tokens")
}

fn parse_arguments(arguments: &Arguments) -> Result<(AnalysisMode, Option<String>), &'static str> {
    let mode = match arguments.get("mode") {
        None | Some(Value::Null) => AnalysisMode::Description,
        Some(Value::String(mode)) => mode
            .parse()
            .map_err(|_| INVALID_MODE)?,
        Some(_) => return Err(INVALID_MODE),
    };

    let question = match arguments.get("question") {
        None | Some(Value::Null) => None,
        Some(Value::String(q)) if q.trim().is_empty() => None,
        Some(Value::String(q)) => Some(q.clone()),
        Some(_) => return Err("Question must be a string."),
    };

    if mode.wants_answer() && question.is_none() {
        return Err("Question required for 'question' or 'both' mode.");
    }
    Ok((mode, question))
}

/// Definition of the `take_screenshot` tool.
fn tool_definition() -> Tool {
    Tool {
        name: TAKE_SCREENSHOT_TOOL.to_string(),
        description: Some(
            "Capture a screenshot of the currently active window, extract its text via OCR, \
             and describe it or answer a question about it with a vision model."
                .to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "mode": {
                    "type": "string",
                    "enum": ["description", "question", "both"],
                    "default": "description",
                    "description": MODE_DESCRIPTION
                },
                "question": {
                    "type": "string",
                    "description":
                        "Question about the screenshot (required for 'question' and 'both')."
                }
            },
            "required": []
        }),
    }
}

/// Definition of `screenshot://latest`.
fn resource_definition() -> Resource {
    Resource {
        uri: LATEST_SCREENSHOT_URI.to_string(),
        name: Some("Latest screenshot".to_string()),
        description: Some("The most recent screenshot captured by take_screenshot.".to_string()),
        mime_type: Some(PNG_MIME.to_string()),
        annotations: None,
    }
}

fn analysis_prompt_definition() -> Prompt {
    Prompt {
        name: SCREENSHOT_ANALYSIS_PROMPT.to_string(),
        description: Some(
            "Analyze a screenshot for UI elements, text content, and overall description."
                .to_string(),
        ),
        arguments: Some(vec![PromptArgument {
            name: "focus_area".to_string(),
            description: Some(
                "Specific area to focus on (e.g., 'buttons', 'text', 'layout')".to_string(),
            ),
            required: false,
        }]),
    }
}

fn code_review_prompt_definition() -> Prompt {
    Prompt {
        name: CODE_REVIEW_PROMPT.to_string(),
        description: Some(
            "Review code visible in a screenshot for potential issues or improvements.".to_string(),
        ),
        arguments: None,
    }
}

fn analysis_prompt_messages(arguments: &Arguments) -> Vec<PromptMessage> {
    let focus_area = arguments
        .get("focus_area")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("general");

    vec![
        PromptMessage::text(
            Role::User,
            format!(
                "Analyze this screenshot focusing on {focus_area}. \
                 Describe the UI elements, text content, and overall layout."
            ),
        ),
        PromptMessage::text(
            Role::Assistant,
            "I'll analyze the screenshot based on the provided image and focus area.",
        ),
    ]
}

fn code_review_prompt_messages() -> Vec<PromptMessage> {
    vec![
        PromptMessage::text(
            Role::User,
            "Review the code visible in this screenshot. \
             Identify any potential issues, bugs, or improvements.",
        ),
        PromptMessage::text(
            Role::Assistant,
            "I'll review the code in the screenshot for quality and potential issues.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::mcp::protocol::NOTIFICATION_RESOURCE_UPDATED;
    use crate::screenshot::{
        ChatMessage, FileUsageLimiter, ImageAnalyzer, ScreenCapture, TextExtractor, UsageLimiter,
    };
    use crate::state::SessionData;

    struct FakeCapture {
        succeed: bool,
    }

    #[async_trait]
    impl ScreenCapture for FakeCapture {
        async fn capture(&self, output: &Path) -> bool {
            self.succeed && std::fs::write(output, b"\x89PNG fake").is_ok()
        }
    }

    struct FakeOcr;

    #[async_trait]
    impl TextExtractor for FakeOcr {
        async fn extract_text(&self, _image: &Path) -> Option<String> {
            Some("fn main() {}".to_string())
        }
    }

    #[derive(Default)]
    struct FakeAnalyzer {
        out_of_tokens: bool,
    }

    #[async_trait]
    impl ImageAnalyzer for FakeAnalyzer {
        async fn analyze(
            &self,
            _image: &Path,
            mode: AnalysisMode,
            question: Option<&str>,
        ) -> Option<String> {
            if self.out_of_tokens {
                return Some("Sorry, this account is OUT OF TOKENS.".to_string());
            }
            Some(format!("{mode}/{}", question.unwrap_or("-")))
        }

        async fn generate(&self, _messages: Vec<ChatMessage>, _max_tokens: u32) -> Option<String> {
            None
        }

        fn model(&self) -> &str {
            "fake"
        }
    }

    #[derive(Default)]
    struct FakeLimiter {
        count: AtomicU64,
        exhausted: AtomicBool,
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
            self.exhausted.load(Ordering::SeqCst)
        }

        async fn try_acquire(&self) -> Option<u64> {
            if self.exhausted.load(Ordering::SeqCst) {
                return None;
            }
            Some(self.count.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn mark_out_of_tokens(&self) {
            self.exhausted.store(true, Ordering::SeqCst);
        }
    }

    fn service(
        capture_ok: bool,
        limiter: Arc<dyn UsageLimiter>,
    ) -> (Arc<ScreenshotService>, Arc<StateStore>) {
        service_with(capture_ok, FakeAnalyzer::default(), limiter)
    }

    fn service_with(
        capture_ok: bool,
        analyzer: FakeAnalyzer,
        limiter: Arc<dyn UsageLimiter>,
    ) -> (Arc<ScreenshotService>, Arc<StateStore>) {
        let state = Arc::new(StateStore::default());
        let collaborators = Collaborators {
            capture: Arc::new(FakeCapture { succeed: capture_ok }),
            extractor: Arc::new(FakeOcr),
            analyzer: Arc::new(analyzer),
            limiter,
        };
        let service = ScreenshotService::new(collaborators, Arc::clone(&state), None, None);
        (Arc::new(service), state)
    }

    fn fake_limiter() -> Arc<dyn UsageLimiter> {
        Arc::new(FakeLimiter::default())
    }

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap_or_default()
    }

    fn texts(result: &CallToolResult) -> Vec<&str> {
        result.content.iter().filter_map(ContentBlock::as_text).collect()
    }

    #[tokio::test]
    async fn both_mode_returns_all_blocks_and_completes_task() {
        let (service, state) = service(true, fake_limiter());
        let queue = state.create_session("watcher", SessionData::new()).await;
        state.subscribe_resource("watcher", LATEST_SCREENSHOT_URI).await;

        let result = service
            .take_screenshot(args(json!({"mode": "both", "question": "Which file?"})))
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(
            texts(&result),
            [
                "Description: description/-",
                "Answer: question/Which file?",
                "Extracted text:\nfn main() {}",
            ]
        );

        let tasks = state.list_tasks().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, TAKE_SCREENSHOT_TOOL);
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert!(tasks[0].result.is_some());

        assert_eq!(service.latest().as_deref().map(Vec::as_slice), Some(&b"\x89PNG fake"[..]));

        let mut methods = Vec::new();
        while let Some(notification) = queue.try_recv() {
            methods.push(notification.method);
        }
        assert!(methods.contains(&NOTIFICATION_RESOURCE_UPDATED.to_string()));
    }

    #[tokio::test]
    async fn argument_errors_are_in_band() {
        let (service, state) = service(true, fake_limiter());

        let cases = [
            (json!({"mode": "poem"}), INVALID_MODE),
            (json!({"mode": "question"}), "Question required for 'question' or 'both' mode."),
            (json!({"mode": "both", "question": 3}), "Question must be a string."),
        ];
        for (arguments, expected) in cases {
            let result = service.take_screenshot(args(arguments)).await.unwrap();
            assert!(result.is_error);
            assert_eq!(texts(&result), [expected]);
        }
        assert!(state.list_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn limit_is_enforced() {
        let limiter = Arc::new(FakeLimiter::default());
        limiter.exhausted.store(true, Ordering::SeqCst);
        let (service, _state) = service(true, Arc::clone(&limiter) as Arc<dyn UsageLimiter>);

        let result = service.take_screenshot(Arguments::new()).await.unwrap();
        assert_eq!(texts(&result), ["Daily screenshot limit exceeded."]);
        assert_eq!(limiter.daily_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_cannot_overrun_limit() {
        let dir = tempfile::tempdir().unwrap();
        let limiter = Arc::new(FileUsageLimiter::new(
            dir.path().join("count.txt"),
            dir.path().join("out_of_tokens.flag"),
            1,
        ));
        let (service, state) = service(true, limiter);

        let calls: Vec<_> = (0..6)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.take_screenshot(Arguments::new()).await })
            })
            .collect();
        let mut refused = 0;
        for call in calls {
            let result = call.await.unwrap().unwrap();
            if texts(&result) == ["Daily screenshot limit exceeded."] {
                refused += 1;
            }
        }

        assert_eq!(refused, 5);
        assert_eq!(state.list_tasks().await.len(), 1);
    }

    #[tokio::test]
    async fn out_of_tokens_reply_blocks_later_captures() {
        let dir = tempfile::tempdir().unwrap();
        let flag = dir.path().join("out_of_tokens.flag");
        let limiter = Arc::new(FileUsageLimiter::new(dir.path().join("count.txt"), &flag, 100));
        let analyzer = FakeAnalyzer { out_of_tokens: true };
        let (service, state) = service_with(true, analyzer, limiter);

        let result = service.take_screenshot(Arguments::new()).await.unwrap();
        assert!(result.is_error);
        assert_eq!(
            texts(&result),
            ["Error capturing screenshot: analysis failed: model is out of tokens"]
        );
        assert!(flag.exists());
        assert_eq!(state.list_tasks().await[0].status, TaskStatus::Failed);
        assert!(service.latest().is_none());

        let result = service.take_screenshot(Arguments::new()).await.unwrap();
        assert_eq!(texts(&result), ["Daily screenshot limit exceeded."]);
    }

    #[test]
    fn out_of_tokens_detection_ignores_case() {
        assert!(reports_out_of_tokens("Error: Out Of Tokens"));
        assert!(!reports_out_of_tokens("A terminal with tokens listed"));
    }

    #[tokio::test]
    async fn capture_failure_fails_task() {
        let (service, state) = service(false, fake_limiter());

        let result = service.take_screenshot(Arguments::new()).await.unwrap();
        assert!(result.is_error);
        assert_eq!(
            texts(&result),
            ["Error capturing screenshot: failed to capture screenshot"]
        );

        let tasks = state.list_tasks().await;
        assert_eq!(tasks[0].status, TaskStatus::Failed);
        assert!(service.latest().is_none());
    }

    #[tokio::test]
    async fn latest_resource_before_and_after_capture() {
        let (service, _state) = service(true, fake_limiter());
        assert_eq!(
            service.read_latest().contents[0].as_text(),
            Some("No screenshot has been captured yet.")
        );

        service.take_screenshot(Arguments::new()).await.unwrap();
        let contents = service.read_latest().contents;
        assert!(matches!(
            &contents[0],
            ContentBlock::Image { mime_type, .. } if mime_type == PNG_MIME
        ));
    }

    #[tokio::test]
    async fn registers_default_capabilities() {
        let (service, _state) = service(true, fake_limiter());
        let tools = ToolRegistry::new();
        let resources = ResourceRegistry::new();
        let prompts = PromptRegistry::new();
        service.register(&tools, &resources, &prompts);

        assert_eq!(tools.list()[0].name, TAKE_SCREENSHOT_TOOL);
        assert_eq!(resources.list()[0].uri, LATEST_SCREENSHOT_URI);
        let names: Vec<_> = prompts.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, [SCREENSHOT_ANALYSIS_PROMPT, CODE_REVIEW_PROMPT]);

        let prompt = prompts
            .get_prompt_response(SCREENSHOT_ANALYSIS_PROMPT, args(json!({"focus_area": "buttons"})))
            .await;
        assert_eq!(prompt.messages.len(), 2);
        assert_eq!(prompt.messages[0].role, Role::User);
        assert!(prompt.messages[0].content[0]
            .as_text()
            .unwrap()
            .contains("focusing on buttons"));

        let default_focus = prompts
            .get_prompt_response(SCREENSHOT_ANALYSIS_PROMPT, Arguments::new())
            .await;
        assert!(default_focus.messages[0].content[0]
            .as_text()
            .unwrap()
            .contains("focusing on general"));
    }
}
