//! Task records tracked by the state store.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet started.
    Pending,
    /// In progress.
    Running,
    /// Finished successfully.
    Completed,
    /// Cancelled by a client.
    Cancelled,
    /// Finished with an error.
    Failed,
}

impl TaskStatus {
    /// Returns `true` for `completed`, `cancelled`, and `failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Returns the wire name of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of asynchronous work, as exposed over `tasks/*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier.
    pub id: String,
    /// Short name, usually the tool that spawned it.
    pub name: String,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Input the task was started with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Current status.
    pub status: TaskStatus,
    /// Free-form progress payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,
    /// Result payload once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Task {
    /// Creates a pending task.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description,
            input: None,
            status: TaskStatus::Pending,
            progress: None,
            result: None,
            error: None,
        }
    }
}

/// A partial update applied by [`StateStore::update_task`](super::StateStore::update_task).
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    /// New status.
    pub status: Option<TaskStatus>,
    /// New description.
    pub description: Option<String>,
    /// New progress payload.
    pub progress: Option<Value>,
    /// New result payload.
    pub result: Option<Value>,
    /// New error payload.
    pub error: Option<Value>,
}

impl TaskUpdate {
    /// An update that only changes the status.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Sets the progress payload.
    #[must_use]
    pub fn with_progress(mut self, progress: Value) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Sets the result payload.
    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Sets the error payload.
    #[must_use]
    pub fn with_error(mut self, error: Value) -> Self {
        self.error = Some(error);
        self
    }

    pub(super) fn apply(self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(description) = self.description {
            task.description = Some(description);
        }
        if let Some(progress) = self.progress {
            task.progress = Some(progress);
        }
        if let Some(result) = self.result {
            task.result = Some(result);
        }
        if let Some(error) = self.error {
            task.error = Some(error);
        }
    }
}

/// Bookkeeping kept next to each task but never sent to clients.
#[derive(Debug, Clone)]
pub struct TaskMetadata {
    /// Monotonic creation instant, used for TTL expiry.
    pub created: Instant,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
    /// Wall-clock time of the last update.
    pub updated_at: Option<DateTime<Utc>>,
    /// Time-to-live, if any.
    pub ttl: Option<Duration>,
}

impl TaskMetadata {
    pub(super) fn new(ttl: Option<Duration>) -> Self {
        Self {
            created: Instant::now(),
            created_at: Utc::now(),
            updated_at: None,
            ttl,
        }
    }

    /// Returns `true` once more than `ttl` has elapsed since creation.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(self.created) > ttl)
    }
}
