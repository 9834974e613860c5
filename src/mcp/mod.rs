//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes screenshot capture and analysis to AI assistants over
//! JSON-RPC 2.0. Requests arrive as HTTP POSTs; server-initiated
//! notifications are pushed over Server-Sent Events.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          MCP Server                          │
//! │                                                              │
//! │   ┌─────────────┐    ┌─────────────┐    ┌──────────────┐     │
//! │   │  Transport  │───▶│ Dispatcher  │───▶│  Registries  │     │
//! │   │ (POST /mcp) │    │  (methods)  │    │ (tools, ...) │     │
//! │   └─────────────┘    └─────────────┘    └──────────────┘     │
//! │          ▲                  │                   │            │
//! │          │                  ▼                   ▼            │
//! │   ┌─────────────┐    ┌─────────────────────────────────┐     │
//! │   │ SSE stream  │◀───│  State store (sessions, tasks,  │     │
//! │   │ (GET /mcp)  │    │  subscriptions, queues)         │     │
//! │   └─────────────┘    └─────────────────────────────────┘     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2025-11-25.

pub mod dispatch;
pub mod methods;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod types;

pub use dispatch::{Dispatcher, RequestContext, DEFAULT_SESSION_ID};
pub use methods::{McpRequest, MethodError};
pub use protocol::{
    JsonRpcError, JsonRpcReply, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION,
};
pub use server::McpServer;
pub use transport::{frame_stream, router, SseFrame};
