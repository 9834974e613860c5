//! Tool, resource, and prompt registries.
//!
//! Each registry maps a key (tool name, resource URI, prompt name) to a
//! definition and an async handler. Lookups take a short read lock and clone
//! the handler out, so handlers always run without any registry lock held.
//!
//! Handler failures never cross the registry boundary. An `Err` or a panic is
//! turned into the method's ordinary result shape carrying an explanatory
//! message, so clients see the failure in-band.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::error::{HandlerError, HandlerResult};
use crate::mcp::types::{
    Arguments, CallToolResult, GetPromptResult, Prompt, PromptMessage, ReadResourceResult,
    Resource, Tool,
};

// =============================================================================
// Handler traits
// =============================================================================

/// Executes a tool call.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool with the caller's arguments.
    async fn call(&self, arguments: Arguments) -> HandlerResult<CallToolResult>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<CallToolResult>> + Send + 'static,
{
    async fn call(&self, arguments: Arguments) -> HandlerResult<CallToolResult> {
        (self)(arguments).await
    }
}

/// Produces a resource's contents.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Reads the resource at `uri`.
    async fn read(&self, uri: &str) -> HandlerResult<ReadResourceResult>;
}

#[async_trait]
impl<F, Fut> ResourceHandler for F
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<ReadResourceResult>> + Send + 'static,
{
    async fn read(&self, uri: &str) -> HandlerResult<ReadResourceResult> {
        (self)(uri.to_string()).await
    }
}

/// Renders a prompt's messages.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Builds the messages for the given arguments.
    async fn messages(&self, arguments: Arguments) -> HandlerResult<Vec<PromptMessage>>;
}

#[async_trait]
impl<F, Fut> PromptHandler for F
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Vec<PromptMessage>>> + Send + 'static,
{
    async fn messages(&self, arguments: Arguments) -> HandlerResult<Vec<PromptMessage>> {
        (self)(arguments).await
    }
}

// =============================================================================
// Generic ordered registry
// =============================================================================

struct Entry<D, H: ?Sized> {
    definition: D,
    handler: Arc<H>,
}

/// Insertion-ordered map of definitions and handlers.
pub struct Registry<D, H: ?Sized> {
    entries: RwLock<IndexMap<String, Entry<D, H>>>,
}

impl<D: Clone, H: ?Sized> Registry<D, H> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
        }
    }

    /// Registers or replaces an entry. Returns `true` if `key` was already present.
    ///
    /// A replaced entry keeps its original position in [`Registry::list`].
    pub fn insert(&self, key: impl Into<String>, definition: D, handler: Arc<H>) -> bool {
        self.entries
            .write()
            .insert(key.into(), Entry { definition, handler })
            .is_some()
    }

    /// All definitions in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<D> {
        self.entries
            .read()
            .values()
            .map(|entry| entry.definition.clone())
            .collect()
    }

    /// The definition registered under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<D> {
        self.entries.read().get(key).map(|entry| entry.definition.clone())
    }

    /// The definition and handler registered under `key`.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<(D, Arc<H>)> {
        self.entries
            .read()
            .get(key)
            .map(|entry| (entry.definition.clone(), Arc::clone(&entry.handler)))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<D: Clone, H: ?Sized> Default for Registry<D, H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Awaits a handler future, folding panics into [`HandlerError::Internal`].
async fn guarded<T, Fut>(fut: Fut) -> HandlerResult<T>
where
    Fut: Future<Output = HandlerResult<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::Internal(format!(
            "handler panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

// =============================================================================
// Tools
// =============================================================================

/// Registered tools.
#[derive(Default)]
pub struct ToolRegistry {
    inner: Registry<Tool, dyn ToolHandler>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its own name.
    pub fn register(&self, tool: Tool, handler: impl ToolHandler + 'static) {
        let name = tool.name.clone();
        if self.inner.insert(name.clone(), tool, Arc::new(handler)) {
            warn!(tool = %name, "Tool re-registered, previous handler replaced");
        } else {
            debug!(tool = %name, "Tool registered");
        }
    }

    /// Tool definitions in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Tool> {
        self.inner.list()
    }

    /// The definition of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Tool> {
        self.inner.get(name)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Calls `name` with `arguments`.
    ///
    /// Unknown tools, handler errors, and handler panics all come back as an
    /// error-flagged text result.
    pub async fn call(&self, name: &str, arguments: Arguments) -> CallToolResult {
        let Some((_, handler)) = self.inner.lookup(name) else {
            warn!(tool = name, "Call to unknown tool");
            return CallToolResult::error(format!("Tool '{name}' not found"));
        };

        match guarded(handler.call(arguments)).await {
            Ok(result) => result,
            Err(e) => {
                error!(tool = name, error = %e, "Tool handler failed");
                CallToolResult::error(format!("Error calling tool '{name}': {e}"))
            }
        }
    }
}

// =============================================================================
// Resources
// =============================================================================

/// Registered resources, keyed by URI.
#[derive(Default)]
pub struct ResourceRegistry {
    inner: Registry<Resource, dyn ResourceHandler>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource under its URI.
    pub fn register(&self, resource: Resource, handler: impl ResourceHandler + 'static) {
        let uri = resource.uri.clone();
        if self.inner.insert(uri.clone(), resource, Arc::new(handler)) {
            warn!(uri = %uri, "Resource re-registered, previous handler replaced");
        } else {
            debug!(uri = %uri, "Resource registered");
        }
    }

    /// Resource definitions in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Resource> {
        self.inner.list()
    }

    /// The definition registered for `uri`.
    #[must_use]
    pub fn get(&self, uri: &str) -> Option<Resource> {
        self.inner.get(uri)
    }

    /// Number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if no resources are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Reads `uri`, reporting unknown URIs and handler failures as text content.
    pub async fn read_resource(&self, uri: &str) -> ReadResourceResult {
        let Some((_, handler)) = self.inner.lookup(uri) else {
            warn!(uri, "Read of unknown resource");
            return ReadResourceResult::text(format!("Resource '{uri}' not found"));
        };

        match guarded(handler.read(uri)).await {
            Ok(result) => result,
            Err(e) => {
                error!(uri, error = %e, "Resource handler failed");
                ReadResourceResult::text(format!("Error reading resource '{uri}': {e}"))
            }
        }
    }
}

// =============================================================================
// Prompts
// =============================================================================

/// Registered prompts.
#[derive(Default)]
pub struct PromptRegistry {
    inner: Registry<Prompt, dyn PromptHandler>,
}

impl PromptRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a prompt under its own name.
    pub fn register(&self, prompt: Prompt, handler: impl PromptHandler + 'static) {
        let name = prompt.name.clone();
        if self.inner.insert(name.clone(), prompt, Arc::new(handler)) {
            warn!(prompt = %name, "Prompt re-registered, previous handler replaced");
        } else {
            debug!(prompt = %name, "Prompt registered");
        }
    }

    /// Prompt definitions in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Prompt> {
        self.inner.list()
    }

    /// The definition of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Prompt> {
        self.inner.get(name)
    }

    /// Number of registered prompts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if no prompts are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Renders `name` with `arguments`.
    ///
    /// The result carries the prompt's declared description and arguments.
    /// Unknown prompts, missing required arguments, and handler failures
    /// produce a message-less result whose description says what went wrong.
    pub async fn get_prompt_response(&self, name: &str, arguments: Arguments) -> GetPromptResult {
        let Some((prompt, handler)) = self.inner.lookup(name) else {
            warn!(prompt = name, "Request for unknown prompt");
            return GetPromptResult::failure(name, format!("Prompt '{name}' not found"));
        };

        let missing = prompt
            .arguments
            .iter()
            .flatten()
            .find(|arg| arg.required && !arguments.contains_key(&arg.name));
        if let Some(arg) = missing {
            return GetPromptResult::failure(
                name,
                format!("Missing required argument '{}'", arg.name),
            );
        }

        match guarded(handler.messages(arguments)).await {
            Ok(messages) => GetPromptResult {
                name: prompt.name,
                description: prompt.description,
                arguments: prompt.arguments,
                messages,
            },
            Err(e) => {
                error!(prompt = name, error = %e, "Prompt handler failed");
                GetPromptResult::failure(name, format!("Error generating prompt '{name}': {e}"))
            }
        }
    }
}
