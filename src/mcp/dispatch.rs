//! Request routing.
//!
//! The [`Dispatcher`] turns one JSON-RPC request into exactly one reply:
//!
//! 1. Resolve the method and parse its params ([`McpRequest::parse`]).
//!    Unknown methods get -32601, bad params -32602.
//! 2. Match on the request variant and ask the owning component (registry
//!    or state store) to do the work.
//! 3. Wrap the typed result in a response echoing the request id. Anything
//!    unexpected becomes -32603 with the detail logged, not returned.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use super::methods::{McpRequest, MethodError};
use super::protocol::{
    ErrorCode, JsonRpcError, JsonRpcErrorData, JsonRpcNotification, JsonRpcReply, JsonRpcRequest,
    JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION,
};
use super::types::{
    CancelTaskParams, ContentBlock, CreateMessageParams, CreateMessageResult, EmptyResult,
    Implementation, InitializeParams, InitializeResult, ListPromptsResult, ListResourcesResult,
    ListTasksResult, ListToolsResult, PingResult, Role, ServerCapabilities, StopReason,
    TaskResult,
};
use crate::registry::{PromptRegistry, ResourceRegistry, ToolRegistry};
use crate::screenshot::{ChatContent, ChatMessage, ImageAnalyzer};
use crate::state::StateStore;

/// Session used when a request does not name one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Per-request information supplied by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Session the request belongs to (used by subscriptions).
    pub session_id: String,
}

impl RequestContext {
    /// A context for `session_id`.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_ID)
    }
}

/// Why a known, well-formed request still failed.
#[derive(Debug)]
enum Failure {
    /// -32000
    TaskNotFound(String),
    /// -32603 with a fixed, client-safe message.
    Generation,
    /// -32603; the detail is logged only.
    Internal(String),
}

type Outcome = Result<Value, Failure>;

fn to_result<T: Serialize>(value: &T) -> Outcome {
    serde_json::to_value(value)
        .map_err(|e| Failure::Internal(format!("failed to serialise result: {e}")))
}

/// Routes requests to registries and the state store.
pub struct Dispatcher {
    state: Arc<StateStore>,
    tools: Arc<ToolRegistry>,
    resources: Arc<ResourceRegistry>,
    prompts: Arc<PromptRegistry>,
    analyzer: Arc<dyn ImageAnalyzer>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given components.
    #[must_use]
    pub fn new(
        state: Arc<StateStore>,
        tools: Arc<ToolRegistry>,
        resources: Arc<ResourceRegistry>,
        prompts: Arc<PromptRegistry>,
        analyzer: Arc<dyn ImageAnalyzer>,
    ) -> Self {
        Self {
            state,
            tools,
            resources,
            prompts,
            analyzer,
        }
    }

    /// The state store.
    #[must_use]
    pub const fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// The tool registry.
    #[must_use]
    pub const fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// The resource registry.
    #[must_use]
    pub const fn resources(&self) -> &Arc<ResourceRegistry> {
        &self.resources
    }

    /// The prompt registry.
    #[must_use]
    pub const fn prompts(&self) -> &Arc<PromptRegistry> {
        &self.prompts
    }

    /// Handles one request and produces its reply.
    #[instrument(skip_all, fields(id = %req.id, method = %req.method, session = %ctx.session_id))]
    pub async fn dispatch(&self, req: JsonRpcRequest, ctx: &RequestContext) -> JsonRpcReply {
        let JsonRpcRequest {
            id, method, params, ..
        } = req;

        let request = match McpRequest::parse(&method, params.as_ref()) {
            Ok(request) => request,
            Err(MethodError::UnknownMethod(method)) => {
                debug!("Method not found");
                return JsonRpcReply::Error(JsonRpcError::method_not_found(id, &method));
            }
            Err(MethodError::InvalidParams(detail)) => {
                debug!(detail = %detail, "Invalid params");
                return JsonRpcReply::Error(JsonRpcError::invalid_params(id, detail));
            }
        };

        let outcome = match AssertUnwindSafe(self.route(request, ctx)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => Err(Failure::Internal("method handler panicked".to_string())),
        };

        match outcome {
            Ok(result) => JsonRpcReply::Success(JsonRpcResponse::success(id, result)),
            Err(failure) => JsonRpcReply::Error(Self::failure_reply(id, failure)),
        }
    }

    fn failure_reply(id: RequestId, failure: Failure) -> JsonRpcError {
        match failure {
            Failure::TaskNotFound(task_id) => JsonRpcError::task_not_found(id, &task_id),
            Failure::Generation => JsonRpcError::new(
                Some(id),
                JsonRpcErrorData::with_message(
                    ErrorCode::InternalError,
                    "Failed to generate message",
                ),
            ),
            Failure::Internal(detail) => {
                error!(detail = %detail, "Internal error while handling request");
                JsonRpcError::internal_error(id, "internal server error")
            }
        }
    }

    /// Handles an incoming notification. Notifications never get a reply.
    pub fn handle_notification(&self, notif: &JsonRpcNotification, ctx: &RequestContext) {
        match notif.method.as_str() {
            "notifications/initialized" => {
                info!(session = %ctx.session_id, "Client initialised");
            }
            "notifications/cancelled" => {
                let request_id = notif.params.as_ref().and_then(|p| p.get("requestId"));
                info!(
                    session = %ctx.session_id,
                    request_id = ?request_id,
                    "Client cancelled a request"
                );
            }
            other => {
                debug!(session = %ctx.session_id, method = other, "Ignoring notification");
            }
        }
    }

    async fn route(&self, request: McpRequest, ctx: &RequestContext) -> Outcome {
        match request {
            McpRequest::Initialize(params) => Self::handle_initialize(&params),
            McpRequest::Ping => to_result(&PingResult::default()),
            McpRequest::ListResources => to_result(&ListResourcesResult {
                resources: self.resources.list(),
            }),
            McpRequest::ReadResource(params) => {
                to_result(&self.resources.read_resource(&params.uri).await)
            }
            McpRequest::Subscribe(params) => {
                if self.resources.get(&params.uri).is_none() {
                    debug!(uri = %params.uri, "Subscribing to an unregistered resource");
                }
                self.state
                    .subscribe_resource(&ctx.session_id, &params.uri)
                    .await;
                to_result(&EmptyResult {})
            }
            McpRequest::Unsubscribe(params) => {
                self.state
                    .unsubscribe_resource(&ctx.session_id, &params.uri)
                    .await;
                to_result(&EmptyResult {})
            }
            McpRequest::ListTools => to_result(&ListToolsResult {
                tools: self.tools.list(),
            }),
            McpRequest::CallTool(params) => {
                info!(tool = %params.name, "Calling tool");
                let result = self
                    .tools
                    .call(&params.name, params.arguments.unwrap_or_default())
                    .await;
                to_result(&result)
            }
            McpRequest::ListPrompts => to_result(&ListPromptsResult {
                prompts: self.prompts.list(),
            }),
            McpRequest::GetPrompt(params) => {
                let result = self
                    .prompts
                    .get_prompt_response(&params.name, params.arguments.unwrap_or_default())
                    .await;
                to_result(&result)
            }
            McpRequest::CreateMessage(params) => self.handle_create_message(params).await,
            McpRequest::ListTasks => to_result(&ListTasksResult {
                tasks: self.state.list_tasks().await,
            }),
            McpRequest::GetTask(params) => match self.state.get_task(&params.id).await {
                Some(task) => to_result(&TaskResult { task }),
                None => Err(Failure::TaskNotFound(params.id)),
            },
            McpRequest::CancelTask(params) => self.handle_cancel_task(params).await,
        }
    }

    fn handle_initialize(params: &InitializeParams) -> Outcome {
        info!(
            client_protocol = %params.protocol_version,
            client = ?params.client_info.as_ref().map(|c| c.name.as_str()),
            "Initializing MCP connection"
        );

        to_result(&InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: Implementation::server(),
            instructions: None,
        })
    }

    async fn handle_create_message(&self, params: CreateMessageParams) -> Outcome {
        let mut messages = Vec::with_capacity(params.messages.len() + 1);
        if let Some(system) = params.system_prompt.filter(|s| !s.is_empty()) {
            messages.push(ChatMessage::text("system", system));
        }
        messages.extend(params.messages.into_iter().map(|message| ChatMessage {
            role: match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            }
            .to_string(),
            content: message
                .content
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(ChatContent::Text { text }),
                    ContentBlock::Image { data, mime_type } => {
                        Some(ChatContent::data_url(&mime_type, &data))
                    }
                    ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => None,
                })
                .collect(),
        }));

        let Some(text) = self.analyzer.generate(messages, params.max_tokens).await else {
            return Err(Failure::Generation);
        };

        to_result(&CreateMessageResult {
            role: Role::Assistant,
            content: ContentBlock::text(text),
            model: self.analyzer.model().to_string(),
            stop_reason: Some(StopReason::EndTurn),
        })
    }

    async fn handle_cancel_task(&self, params: CancelTaskParams) -> Outcome {
        let CancelTaskParams { id, reason } = params;
        match self.state.cancel_task(&id).await {
            Some(task) => {
                info!(
                    task_id = %id,
                    reason = ?reason,
                    status = %task.status,
                    "Task cancel requested"
                );
                to_result(&TaskResult { task })
            }
            None => Err(Failure::TaskNotFound(id)),
        }
    }
}
