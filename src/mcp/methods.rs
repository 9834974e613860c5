//! The closed set of MCP methods this server answers.
//!
//! [`McpRequest::parse`] turns a method name plus untyped params into one
//! variant carrying its strongly-typed parameters. The dispatcher then
//! matches on the variant.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{
    CallToolParams, CancelTaskParams, CreateMessageParams, GetPromptParams, InitializeParams,
    ResourceUriParams, TaskIdParams,
};

/// A parsed MCP request.
#[derive(Debug, Clone)]
pub enum McpRequest {
    /// `initialize`
    Initialize(InitializeParams),
    /// `ping`
    Ping,
    /// `resources/list`
    ListResources,
    /// `resources/read`
    ReadResource(ResourceUriParams),
    /// `resources/subscribe`
    Subscribe(ResourceUriParams),
    /// `resources/unsubscribe`
    Unsubscribe(ResourceUriParams),
    /// `tools/list`
    ListTools,
    /// `tools/call`
    CallTool(CallToolParams),
    /// `prompts/list`
    ListPrompts,
    /// `prompts/get`
    GetPrompt(GetPromptParams),
    /// `sampling/createMessage`
    CreateMessage(CreateMessageParams),
    /// `tasks/list`
    ListTasks,
    /// `tasks/get`
    GetTask(TaskIdParams),
    /// `tasks/cancel`
    CancelTask(CancelTaskParams),
}

/// Why a method name and params could not become an [`McpRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MethodError {
    /// No such method.
    #[error("method not found: {0}")]
    UnknownMethod(String),

    /// The params do not fit the method's parameter shape.
    #[error("invalid params: {0}")]
    InvalidParams(String),
}

impl McpRequest {
    /// Every method name [`McpRequest::parse`] accepts.
    pub const METHODS: &'static [&'static str] = &[
        "initialize",
        "ping",
        "resources/list",
        "resources/read",
        "resources/subscribe",
        "resources/unsubscribe",
        "tools/list",
        "tools/call",
        "prompts/list",
        "prompts/get",
        "sampling/createMessage",
        "tasks/list",
        "tasks/get",
        "tasks/cancel",
    ];

    /// Parses a method name and its params.
    ///
    /// Absent or `null` params are treated as an empty object. Any other
    /// non-object params are rejected.
    ///
    /// # Errors
    ///
    /// [`MethodError::UnknownMethod`] for unsupported names,
    /// [`MethodError::InvalidParams`] when the params do not deserialise.
    pub fn parse(method: &str, params: Option<&Value>) -> Result<Self, MethodError> {
        // Resolve the method first so an unknown method with bad params is still -32601.
        if !Self::METHODS.contains(&method) {
            return Err(MethodError::UnknownMethod(method.to_string()));
        }

        let params = match params {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(value @ Value::Object(_)) => value.clone(),
            Some(_) => {
                return Err(MethodError::InvalidParams(
                    "params must be an object".to_string(),
                ))
            }
        };

        let request = match method {
            "initialize" => Self::Initialize(typed(params)?),
            "ping" => Self::Ping,
            "resources/list" => Self::ListResources,
            "resources/read" => Self::ReadResource(typed(params)?),
            "resources/subscribe" => Self::Subscribe(typed(params)?),
            "resources/unsubscribe" => Self::Unsubscribe(typed(params)?),
            "tools/list" => Self::ListTools,
            "tools/call" => Self::CallTool(typed(params)?),
            "prompts/list" => Self::ListPrompts,
            "prompts/get" => Self::GetPrompt(typed(params)?),
            "sampling/createMessage" => Self::CreateMessage(typed(params)?),
            "tasks/list" => Self::ListTasks,
            "tasks/get" => Self::GetTask(typed(params)?),
            "tasks/cancel" => Self::CancelTask(typed(params)?),
            other => return Err(MethodError::UnknownMethod(other.to_string())),
        };
        Ok(request)
    }

    /// The wire name of this request's method.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Initialize(_) => "initialize",
            Self::Ping => "ping",
            Self::ListResources => "resources/list",
            Self::ReadResource(_) => "resources/read",
            Self::Subscribe(_) => "resources/subscribe",
            Self::Unsubscribe(_) => "resources/unsubscribe",
            Self::ListTools => "tools/list",
            Self::CallTool(_) => "tools/call",
            Self::ListPrompts => "prompts/list",
            Self::GetPrompt(_) => "prompts/get",
            Self::CreateMessage(_) => "sampling/createMessage",
            Self::ListTasks => "tasks/list",
            Self::GetTask(_) => "tasks/get",
            Self::CancelTask(_) => "tasks/cancel",
        }
    }
}

fn typed<T: DeserializeOwned>(params: Value) -> Result<T, MethodError> {
    serde_json::from_value(params).map_err(|e| MethodError::InvalidParams(e.to_string()))
}
