//! Error types for mcp-screenshot-server.
//!
//! JSON-RPC level errors live in [`crate::mcp::protocol`]; the enums here cover
//! configuration, the state store, and capability handlers.

use std::path::PathBuf;

use thiserror::Error;

use crate::state::TaskStatus;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// An environment override could not be parsed.
    #[error("invalid value for {variable}: {value:?}")]
    InvalidOverride {
        /// Name of the environment variable.
        variable: String,
        /// The rejected value.
        value: String,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised by the state store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A task that already reached a terminal status was asked to change status.
    #[error("task {id} is already {from} and cannot become {to}")]
    TerminalTransition {
        /// Task identifier.
        id: String,
        /// The terminal status the task is in.
        from: TaskStatus,
        /// The rejected target status.
        to: TaskStatus,
    },
}

/// Result type for tool, resource, and prompt handlers.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Errors a capability handler can report.
///
/// Registries never let these cross their boundary: they are rendered into
/// the handler's normal result payload so the client sees them in-band.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The screenshot could not be captured.
    #[error("failed to capture screenshot")]
    Capture,

    /// An external collaborator failed.
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        /// Which collaborator, e.g. `analysis`.
        collaborator: &'static str,
        /// Failure description.
        message: String,
    },

    /// File I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else.
    #[error("{0}")]
    Internal(String),
}
