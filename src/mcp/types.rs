//! MCP parameter and result shapes.
//!
//! Field names follow the MCP wire format (camelCase); Rust-side names are
//! snake case.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::state::Task;

// skip_serializing_if hands the predicate a reference.
#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Argument mapping passed to tools and prompts.
pub type Arguments = Map<String, Value>;

// =============================================================================
// Lifecycle
// =============================================================================

/// Name and version of a client or server implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name.
    pub name: String,
    /// Implementation version.
    #[serde(default)]
    pub version: String,
}

impl Implementation {
    /// Identity of this server.
    #[must_use]
    pub fn server() -> Self {
        Self {
            name: super::protocol::SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities (recorded, never influence the reply).
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<Implementation>,
}

/// `listChanged` flag shared by several capability groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListChangedCapability {
    /// Whether the list can change during the session.
    #[serde(skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Resource capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    /// Whether the resource list can change.
    #[serde(skip_serializing_if = "is_false")]
    pub list_changed: bool,
    /// Whether `resources/subscribe` is supported.
    #[serde(skip_serializing_if = "is_false")]
    pub subscribe: bool,
}

/// Server capabilities advertised during initialisation.
///
/// The set is fixed; client-declared capabilities never change it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerCapabilities {
    /// Experimental extensions.
    pub experimental: Map<String, Value>,
    /// Logging support.
    pub logging: Map<String, Value>,
    /// Prompt capabilities.
    pub prompts: ListChangedCapability,
    /// Resource capabilities.
    pub resources: ResourcesCapability,
    /// Tool capabilities.
    pub tools: ListChangedCapability,
    /// Sampling support.
    pub sampling: Map<String, Value>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            experimental: Map::new(),
            logging: Map::new(),
            prompts: ListChangedCapability { list_changed: true },
            resources: ResourcesCapability {
                list_changed: true,
                subscribe: true,
            },
            tools: ListChangedCapability { list_changed: true },
            sampling: Map::new(),
        }
    }
}

/// Result of the initialize request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Negotiated protocol version.
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
    /// Server identity.
    pub server_info: Implementation,
    /// Optional usage hints for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Result of the ping request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PingResult {
    /// Always `true`.
    pub pong: bool,
}

impl Default for PingResult {
    fn default() -> Self {
        Self { pong: true }
    }
}

/// An empty result object (`{}`).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EmptyResult {}

// =============================================================================
// Content
// =============================================================================

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human side.
    User,
    /// The model side.
    Assistant,
}

/// A content block in tool results, resources, prompts, and sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// Base64-encoded image.
    Image {
        /// Base64 image bytes.
        data: String,
        /// MIME type, e.g. `image/png`.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// A tool invocation requested by the model.
    ToolUse {
        /// Invocation id.
        id: String,
        /// Tool name.
        name: String,
        /// Tool input.
        input: Value,
    },
    /// The outcome of a tool invocation.
    ToolResult {
        /// Id of the matching `tool_use` block.
        #[serde(rename = "toolUseId")]
        tool_use_id: String,
        /// Result content.
        content: Vec<ContentBlock>,
        /// Whether the tool failed.
        #[serde(rename = "isError", default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

impl ContentBlock {
    /// Creates a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates an image block from already-encoded data.
    #[must_use]
    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Returns the text if this is a text block.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Optional audience/priority hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    /// Intended audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<Role>>,
    /// Relative importance, 0.0 to 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
}

// =============================================================================
// Tools
// =============================================================================

/// A tool definition for tools/list response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Arguments>,
}

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content returned by the tool.
    pub content: Vec<ContentBlock>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl CallToolResult {
    /// Creates a successful result from content blocks.
    #[must_use]
    pub const fn new(content: Vec<ContentBlock>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![ContentBlock::text(text)])
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(message)],
            is_error: true,
        }
    }
}

/// Result of tools/list.
#[derive(Debug, Clone, Serialize)]
pub struct ListToolsResult {
    /// Registered tools, in registration order.
    pub tools: Vec<Tool>,
}

// =============================================================================
// Resources
// =============================================================================

/// A resource available on the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Resource URI.
    pub uri: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Optional annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// Parameters for resources/read, resources/subscribe, and resources/unsubscribe.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceUriParams {
    /// Resource URI.
    pub uri: String,
}

/// Result of resources/list.
#[derive(Debug, Clone, Serialize)]
pub struct ListResourcesResult {
    /// Registered resources, in registration order.
    pub resources: Vec<Resource>,
}

/// Result of resources/read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadResourceResult {
    /// Resource contents.
    pub contents: Vec<ContentBlock>,
}

impl ReadResourceResult {
    /// A single text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            contents: vec![ContentBlock::text(text)],
        }
    }
}

// =============================================================================
// Prompts
// =============================================================================

/// A declared prompt argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied.
    pub required: bool,
}

/// A prompt template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    /// Prompt name.
    pub name: String,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

/// A message in a prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptMessage {
    /// Author role.
    pub role: Role,
    /// Message content.
    pub content: Vec<ContentBlock>,
}

impl PromptMessage {
    /// A single-text message.
    #[must_use]
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::text(text)],
        }
    }
}

/// Parameters for prompts/get.
#[derive(Debug, Clone, Deserialize)]
pub struct GetPromptParams {
    /// Prompt name.
    pub name: String,
    /// Prompt arguments.
    #[serde(default)]
    pub arguments: Option<Arguments>,
}

/// Result of prompts/list.
#[derive(Debug, Clone, Serialize)]
pub struct ListPromptsResult {
    /// Registered prompts, in registration order.
    pub prompts: Vec<Prompt>,
}

/// Result of prompts/get.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetPromptResult {
    /// Prompt name.
    pub name: String,
    /// Description (also used to report failures).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
    /// Generated messages.
    pub messages: Vec<PromptMessage>,
}

impl GetPromptResult {
    /// A message-less result whose description explains what went wrong.
    #[must_use]
    pub fn failure(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            arguments: None,
            messages: Vec::new(),
        }
    }
}

// =============================================================================
// Sampling
// =============================================================================

/// A message in a sampling request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SamplingMessage {
    /// Author role.
    pub role: Role,
    /// Content; a single block or a list of blocks on the wire.
    #[serde(deserialize_with = "one_or_many")]
    pub content: Vec<ContentBlock>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<ContentBlock>),
        One(ContentBlock),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(blocks) => blocks,
        OneOrMany::One(block) => vec![block],
    })
}

/// Where the sampled context may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IncludeContext {
    /// No extra context.
    None,
    /// Context from this server.
    ThisServer,
    /// Context from every connected server.
    AllServers,
}

/// Parameters for sampling/createMessage.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageParams {
    /// Conversation so far.
    pub messages: Vec<SamplingMessage>,
    /// Model selection hints.
    #[serde(default)]
    pub model_preferences: Option<Value>,
    /// System prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Context inclusion.
    #[serde(default)]
    pub include_context: Option<IncludeContext>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Stop sequences.
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    /// Opaque metadata.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// The model finished its turn.
    EndTurn,
    /// A stop sequence was hit.
    StopSequence,
    /// The token limit was hit.
    MaxTokens,
}

/// Result of sampling/createMessage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResult {
    /// Always `assistant`.
    pub role: Role,
    /// Generated content.
    pub content: ContentBlock,
    /// Model that produced it.
    pub model: String,
    /// Why generation stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

// =============================================================================
// Tasks
// =============================================================================

/// Parameters for tasks/get.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskIdParams {
    /// Task identifier.
    #[serde(alias = "taskId")]
    pub id: String,
}

/// Parameters for tasks/cancel.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelTaskParams {
    /// Task identifier.
    #[serde(alias = "taskId")]
    pub id: String,
    /// Why the client cancelled.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Result of tasks/list.
#[derive(Debug, Clone, Serialize)]
pub struct ListTasksResult {
    /// Tasks in creation order.
    pub tasks: Vec<Task>,
}

/// Result of tasks/get and tasks/cancel.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    /// The task.
    pub task: Task,
}
