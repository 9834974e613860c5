//! mcp-screenshot-server: MCP server for screenshot capture and analysis
//!
//! This library implements a Model Context Protocol server that lets AI
//! assistants capture the active window, read the text on it, and have it
//! described by a vision model.
//!
//! # Architecture
//!
//! The protocol core is independent of how screenshots are taken:
//!
//! - **Dispatch**: JSON-RPC 2.0 requests over `POST /mcp`, routed to typed handlers
//! - **Notifications**: per-session queues drained over SSE on `GET /mcp`
//! - **State**: sessions, long-running tasks, and resource subscriptions
//! - **Registries**: tools, resources, and prompts registered at start-up
//!
//! Capture, OCR, analysis and rate limiting sit behind traits in
//! [`screenshot`] so they can be swapped out in tests.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol, dispatch, and HTTP transport
//! - [`registry`]: Tool, resource, and prompt registries
//! - [`screenshot`]: Screenshot capabilities and their collaborators
//! - [`state`]: Sessions, tasks, subscriptions, and notification queues

pub mod config;
pub mod error;
pub mod mcp;
pub mod registry;
pub mod screenshot;
pub mod state;
