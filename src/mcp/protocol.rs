//! JSON-RPC 2.0 message types for MCP protocol.
//!
//! This module defines the envelopes exchanged over the HTTP transport.
//! All messages follow the JSON-RPC 2.0 specification with MCP-specific extensions.
//!
//! # Message Types
//!
//! - **Request**: A message expecting a response (has `id`)
//! - **Response**: A reply to a request (success or error, never both)
//! - **Notification**: A one-way message (no `id`, no response expected)
//!
//! # MCP-Specific Constraints
//!
//! - Request IDs must be strings or integers (never `null`)
//! - An envelope that cannot be classified is a transport error, not a
//!   JSON-RPC error: without a trustworthy `id` there is nothing to reply to.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2025-11-25";

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "mcp-screenshot-server";

/// Server-to-client notification sent whenever a task changes.
pub const NOTIFICATION_TASK_UPDATE: &str = "notifications/tasks/update";

/// Server-to-client notification sent to subscribers of a changed resource.
pub const NOTIFICATION_RESOURCE_UPDATED: &str = "notifications/resources/updated";

/// A JSON-RPC 2.0 request ID.
///
/// Per the MCP specification, IDs must be strings or integers, never `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A JSON-RPC 2.0 request message.
///
/// Requests expect a response from the server.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// Unique request identifier.
    pub id: RequestId,

    /// The method to invoke.
    pub method: String,

    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Builds a request in code (used by tests and embedders).
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    /// Validates that this is a well-formed JSON-RPC 2.0 request.
    ///
    /// Returns an error message if validation fails.
    #[must_use]
    pub fn validate(&self) -> Option<&'static str> {
        if self.jsonrpc != "2.0" {
            return Some("jsonrpc field must be \"2.0\"");
        }
        if self.method.is_empty() {
            return Some("method field cannot be empty");
        }
        None
    }
}

/// A JSON-RPC 2.0 notification message (incoming).
///
/// Notifications do not have an ID and do not expect a response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(default)]
    pub params: Option<Value>,
}

/// An outgoing JSON-RPC 2.0 notification (server to client).
///
/// Queued per session and streamed over SSE.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingNotification {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl OutgoingNotification {
    /// Creates a new outgoing notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this response corresponds to.
    pub id: RequestId,

    /// The result of the method call.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// JSON-RPC error codes this server replies with.
///
/// Bodies that fail to parse never reach the dispatcher; the transport
/// answers them with HTTP 400, so -32700 and -32600 are not modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
    /// The referenced task does not exist.
    TaskNotFound,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::TaskNotFound => -32000,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::TaskNotFound => "Task not found",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A JSON-RPC 2.0 error response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this error corresponds to (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates a new error response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error,
        }
    }

    /// Creates a method not found error response.
    ///
    /// The offending method name is carried in `data.method`.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::from_code(ErrorCode::MethodNotFound)
                .with_data(json!({ "method": method })),
        )
    }

    /// Creates an invalid params error response with a human-readable `data` string.
    #[must_use]
    pub fn invalid_params(id: RequestId, detail: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::from_code(ErrorCode::InvalidParams)
                .with_data(Value::String(detail.into())),
        )
    }

    /// Creates an internal error response.
    ///
    /// `detail` must already be stripped of anything the client should not see.
    #[must_use]
    pub fn internal_error(id: RequestId, detail: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::from_code(ErrorCode::InternalError)
                .with_data(Value::String(detail.into())),
        )
    }

    /// Creates a task-not-found error response.
    #[must_use]
    pub fn task_not_found(id: RequestId, task_id: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::from_code(ErrorCode::TaskNotFound)
                .with_data(json!({ "taskId": task_id })),
        )
    }
}

/// The reply to a request: exactly one of result or error.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JsonRpcReply {
    /// The method succeeded.
    Success(JsonRpcResponse),
    /// The method failed.
    Error(JsonRpcError),
}

impl JsonRpcReply {
    /// Returns the request ID this reply answers.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Success(resp) => Some(&resp.id),
            Self::Error(err) => err.id.as_ref(),
        }
    }

    /// Returns the error object if this is an error reply.
    #[must_use]
    pub const fn error(&self) -> Option<&JsonRpcErrorData> {
        match self {
            Self::Success(_) => None,
            Self::Error(err) => Some(&err.error),
        }
    }

    /// Returns the result if this is a success reply.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match self {
            Self::Success(resp) => Some(&resp.result),
            Self::Error(_) => None,
        }
    }
}

impl From<Result<JsonRpcResponse, JsonRpcError>> for JsonRpcReply {
    fn from(result: Result<JsonRpcResponse, JsonRpcError>) -> Self {
        match result {
            Ok(resp) => Self::Success(resp),
            Err(err) => Self::Error(err),
        }
    }
}

/// An incoming message that could be either a request or notification.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A request expecting a response.
    Request(JsonRpcRequest),
    /// A notification (no response expected).
    Notification(JsonRpcNotification),
}

impl IncomingMessage {
    /// Returns the method name of this message.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Request(req) => &req.method,
            Self::Notification(notif) => &notif.method,
        }
    }

    /// Returns the parameters of this message.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Option::as_ref is not const
    pub fn params(&self) -> Option<&Value> {
        match self {
            Self::Request(req) => req.params.as_ref(),
            Self::Notification(notif) => notif.params.as_ref(),
        }
    }

    /// Returns the request ID if this is a request.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Notification(_) => None,
        }
    }
}

/// Reasons an HTTP body could not be turned into an [`IncomingMessage`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The body is not JSON.
    #[error("malformed JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),

    /// The body is JSON but not a JSON-RPC 2.0 request or notification.
    #[error("invalid JSON-RPC envelope: {0}")]
    InvalidEnvelope(String),
}

impl TransportError {
    fn envelope(message: impl Into<String>) -> Self {
        Self::InvalidEnvelope(message.into())
    }
}

/// Parses a JSON string into an incoming message.
///
/// # Errors
///
/// Returns a [`TransportError`] if the JSON is malformed or the object is
/// neither a request (`jsonrpc`, `id`, `method`) nor a notification
/// (`jsonrpc`, `method`, no `id`).
pub fn parse_message(json: &str) -> Result<IncomingMessage, TransportError> {
    let value: Value = serde_json::from_str(json).map_err(TransportError::MalformedJson)?;

    let obj = value
        .as_object()
        .ok_or_else(|| TransportError::envelope("message must be a JSON object"))?;

    let jsonrpc = obj
        .get("jsonrpc")
        .and_then(Value::as_str)
        .ok_or_else(|| TransportError::envelope("missing jsonrpc field"))?;

    if jsonrpc != "2.0" {
        return Err(TransportError::envelope("jsonrpc field must be \"2.0\""));
    }

    if obj.contains_key("result") || obj.contains_key("error") {
        return Err(TransportError::envelope(
            "responses are not accepted on this endpoint",
        ));
    }

    if obj.contains_key("id") {
        let request: JsonRpcRequest = serde_json::from_value(value)
            .map_err(|e| TransportError::envelope(format!("invalid request: {e}")))?;

        if let Some(problem) = request.validate() {
            return Err(TransportError::envelope(problem));
        }

        Ok(IncomingMessage::Request(request))
    } else {
        let notification: JsonRpcNotification = serde_json::from_value(value)
            .map_err(|e| TransportError::envelope(format!("invalid notification: {e}")))?;

        if notification.method.is_empty() {
            return Err(TransportError::envelope("method field cannot be empty"));
        }

        Ok(IncomingMessage::Notification(notification))
    }
}
