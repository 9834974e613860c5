//! In-memory state shared by every connection.
//!
//! [`StateStore`] owns sessions, their notification queues, resource
//! subscriptions, and tasks. All mutation goes through one store-wide async
//! mutex. The lock is only ever held for in-memory work: enqueuing into a
//! session queue never waits (see [`NotificationQueue`]), and capability
//! handlers are invoked by the registries outside of it.

mod queue;
mod task;

pub use queue::{NotificationQueue, DEFAULT_QUEUE_CAPACITY};
pub use task::{Task, TaskMetadata, TaskStatus, TaskUpdate};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indexmap::{IndexMap, IndexSet};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::StateError;
use crate::mcp::protocol::{
    OutgoingNotification, NOTIFICATION_RESOURCE_UPDATED, NOTIFICATION_TASK_UPDATE,
};

/// Session data as handed out by [`StateStore::get_session`].
pub type SessionData = Map<String, Value>;

/// A session and its queue live and die together.
struct Session {
    data: SessionData,
    queue: NotificationQueue,
    /// Open SSE streams draining `queue`.
    streams: Arc<AtomicUsize>,
    /// Set once a stream has attached; from then on fan-out needs an open stream.
    streamed: bool,
}

impl Session {
    fn new(data: SessionData, queue_capacity: usize) -> Self {
        Self {
            data,
            queue: NotificationQueue::new(queue_capacity),
            streams: Arc::new(AtomicUsize::new(0)),
            streamed: false,
        }
    }

    /// Whether fan-out should enqueue for this session.
    ///
    /// A session whose streams have all closed misses what fires until it
    /// reconnects. Sessions that never streamed are drained by whoever
    /// created them.
    fn is_listening(&self) -> bool {
        !self.streamed || self.streams.load(Ordering::Acquire) > 0
    }
}

/// Keeps a session marked as connected while an SSE stream is open.
///
/// Dropping it detaches the stream; the session itself stays in the store.
#[derive(Debug)]
pub struct StreamAttachment {
    session_id: String,
    queue: NotificationQueue,
    streams: Arc<AtomicUsize>,
}

impl StreamAttachment {
    /// The attached session.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The session's queue.
    #[must_use]
    pub const fn queue(&self) -> &NotificationQueue {
        &self.queue
    }
}

impl Drop for StreamAttachment {
    fn drop(&mut self) {
        let remaining = self.streams.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        debug!(session_id = %self.session_id, remaining, "Stream detached");
    }
}

struct TaskEntry {
    task: Task,
    metadata: TaskMetadata,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    tasks: IndexMap<String, TaskEntry>,
    subscriptions: HashMap<String, IndexSet<String>>,
}

impl Inner {
    fn broadcast(&self, notification: &OutgoingNotification) -> usize {
        let mut delivered = 0;
        for session in self.sessions.values().filter(|s| s.is_listening()) {
            session.queue.push(notification.clone());
            delivered += 1;
        }
        delivered
    }
}

/// Concurrency-safe store for sessions, tasks, and subscriptions.
pub struct StateStore {
    inner: Mutex<Inner>,
    queue_capacity: usize,
}

impl StateStore {
    /// Creates an empty store whose session queues hold `queue_capacity` entries.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            queue_capacity,
        }
    }

    // ---------------------------------------------------------------------
    // Sessions
    // ---------------------------------------------------------------------

    /// Creates (or replaces) a session together with a fresh notification queue.
    ///
    /// Subscriptions already recorded for the id are kept.
    pub async fn create_session(&self, id: &str, data: SessionData) -> NotificationQueue {
        let session = Session::new(data, self.queue_capacity);
        let queue = session.queue.clone();
        let replaced = self
            .inner
            .lock()
            .await
            .sessions
            .insert(id.to_string(), session)
            .is_some();

        info!(session_id = id, replaced, "Session created");
        queue
    }

    /// Attaches an SSE stream to a session, creating the session if needed.
    ///
    /// While at least one attachment is alive the session receives fan-out.
    /// Once every attachment has been dropped, notifications fired in the
    /// meantime are not queued for it.
    pub async fn attach_stream(&self, id: &str) -> StreamAttachment {
        let mut inner = self.inner.lock().await;
        let created = !inner.sessions.contains_key(id);
        let capacity = self.queue_capacity;
        let session = inner
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(SessionData::new(), capacity));

        session.streamed = true;
        let streams = session.streams.fetch_add(1, Ordering::AcqRel) + 1;
        let attachment = StreamAttachment {
            session_id: id.to_string(),
            queue: session.queue.clone(),
            streams: Arc::clone(&session.streams),
        };
        drop(inner);

        info!(session_id = id, created, streams, "Stream attached");
        attachment
    }

    /// Returns a copy of the session's data.
    pub async fn get_session(&self, id: &str) -> Option<SessionData> {
        self.inner
            .lock()
            .await
            .sessions
            .get(id)
            .map(|session| session.data.clone())
    }

    /// Removes a session, its queue, and its subscriptions.
    ///
    /// Returns `false` if no such session existed.
    pub async fn delete_session(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let existed = inner.sessions.remove(id).is_some();
        inner.subscriptions.remove(id);
        drop(inner);

        if existed {
            info!(session_id = id, "Session deleted");
        }
        existed
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    /// Returns the notification queue for a session.
    pub async fn get_event_queue(&self, id: &str) -> Option<NotificationQueue> {
        self.inner
            .lock()
            .await
            .sessions
            .get(id)
            .map(|session| session.queue.clone())
    }

    /// Pushes a notification to every listening session.
    ///
    /// Returns the number of sessions it was delivered to.
    pub async fn broadcast(&self, notification: &OutgoingNotification) -> usize {
        self.inner.lock().await.broadcast(notification)
    }

    // ---------------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------------

    /// Registers a new task in the `pending` state.
    ///
    /// An existing task with the same id is replaced.
    pub async fn create_task(
        &self,
        id: &str,
        name: &str,
        description: Option<String>,
        ttl: Option<Duration>,
    ) -> Task {
        let task = Task::new(id, name, description);
        self.inner.lock().await.tasks.insert(
            id.to_string(),
            TaskEntry {
                task: task.clone(),
                metadata: TaskMetadata::new(ttl),
            },
        );

        debug!(task_id = id, name, ttl = ?ttl, "Task created");
        task
    }

    /// Looks up a task.
    pub async fn get_task(&self, id: &str) -> Option<Task> {
        self.inner
            .lock()
            .await
            .tasks
            .get(id)
            .map(|entry| entry.task.clone())
    }

    /// Returns the bookkeeping for a task.
    pub async fn task_metadata(&self, id: &str) -> Option<TaskMetadata> {
        self.inner
            .lock()
            .await
            .tasks
            .get(id)
            .map(|entry| entry.metadata.clone())
    }

    /// Applies a partial update and broadcasts a task-update notification to
    /// every connected session.
    ///
    /// Returns `Ok(None)` (and notifies nobody) if the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::TerminalTransition`] if the task is already
    /// terminal and the update asks for a different status. Nothing is
    /// changed or sent in that case.
    pub async fn update_task(
        &self,
        id: &str,
        update: TaskUpdate,
    ) -> Result<Option<Task>, StateError> {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.tasks.get_mut(id) else {
            return Ok(None);
        };

        let current = entry.task.status;
        if let Some(next) = update.status {
            if current.is_terminal() && next != current {
                return Err(StateError::TerminalTransition {
                    id: id.to_string(),
                    from: current,
                    to: next,
                });
            }
        }

        update.apply(&mut entry.task);
        entry.metadata.updated_at = Some(Utc::now());
        let task = entry.task.clone();

        let notification = task_update_notification(&task);
        let delivered = inner.broadcast(&notification);
        drop(inner);

        debug!(task_id = id, status = %task.status, delivered, "Task updated");
        Ok(Some(task))
    }

    /// Moves a task to `cancelled`.
    ///
    /// A task that already finished is returned unchanged and no notification
    /// is sent. Returns `None` for an unknown id.
    pub async fn cancel_task(&self, id: &str) -> Option<Task> {
        let status = self.get_task(id).await?.status;
        if status.is_terminal() {
            debug!(task_id = id, %status, "Cancel ignored for finished task");
            return self.get_task(id).await;
        }

        match self.update_task(id, TaskUpdate::status(TaskStatus::Cancelled)).await {
            Ok(task) => task,
            // Finished between the check and the update.
            Err(StateError::TerminalTransition { .. }) => self.get_task(id).await,
        }
    }

    /// Lists tasks in creation order.
    pub async fn list_tasks(&self) -> Vec<Task> {
        self.inner
            .lock()
            .await
            .tasks
            .values()
            .map(|entry| entry.task.clone())
            .collect()
    }

    /// Removes a task. Returns `false` if it did not exist.
    pub async fn delete_task(&self, id: &str) -> bool {
        self.inner.lock().await.tasks.shift_remove(id).is_some()
    }

    /// Deletes every task whose TTL has elapsed.
    ///
    /// Returns the ids that were removed.
    pub async fn cleanup_expired_tasks(&self) -> Vec<String> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let expired: Vec<String> = inner
            .tasks
            .iter()
            .filter(|(_, entry)| entry.metadata.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            inner.tasks.shift_remove(id);
        }
        drop(inner);

        if !expired.is_empty() {
            info!(count = expired.len(), "Expired tasks removed");
        }
        expired
    }

    // ---------------------------------------------------------------------
    // Subscriptions
    // ---------------------------------------------------------------------

    /// Subscribes a session to a resource URI.
    ///
    /// Returns `false` if the subscription already existed.
    pub async fn subscribe_resource(&self, session_id: &str, uri: &str) -> bool {
        let added = self
            .inner
            .lock()
            .await
            .subscriptions
            .entry(session_id.to_string())
            .or_default()
            .insert(uri.to_string());

        debug!(session_id, uri, added, "Resource subscription");
        added
    }

    /// Removes a subscription. Unknown sessions or URIs are a no-op.
    ///
    /// Returns `true` if a subscription was removed.
    pub async fn unsubscribe_resource(&self, session_id: &str, uri: &str) -> bool {
        self.inner
            .lock()
            .await
            .subscriptions
            .get_mut(session_id)
            .is_some_and(|uris| uris.shift_remove(uri))
    }

    /// Returns the URIs a session is subscribed to, in subscription order.
    pub async fn get_subscriptions(&self, session_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .await
            .subscriptions
            .get(session_id)
            .map(|uris| uris.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Sends a `resources/updated` notification to the sessions subscribed to `uri`.
    ///
    /// Returns the number of sessions notified.
    pub async fn notify_resource_update(&self, uri: &str, content: Option<Value>) -> usize {
        let mut params = json!({ "uri": uri });
        if let Some(content) = content {
            params["content"] = content;
        }
        let notification = OutgoingNotification::new(NOTIFICATION_RESOURCE_UPDATED, Some(params));

        let inner = self.inner.lock().await;
        let mut delivered = 0;
        for (session_id, uris) in &inner.subscriptions {
            if !uris.contains(uri) {
                continue;
            }
            if let Some(session) = inner.sessions.get(session_id).filter(|s| s.is_listening()) {
                session.queue.push(notification.clone());
                delivered += 1;
            }
        }
        drop(inner);

        debug!(uri, delivered, "Resource update published");
        delivered
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

fn task_update_notification(task: &Task) -> OutgoingNotification {
    OutgoingNotification::new(NOTIFICATION_TASK_UPDATE, Some(json!({ "task": task })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_and_queue_are_created_together() {
        let store = StateStore::default();
        let queue = store.create_session("s1", SessionData::new()).await;

        let fetched = store.get_event_queue("s1").await.expect("queue exists");
        assert!(fetched.same_queue(&queue));
        assert!(store.get_session("s1").await.is_some());
    }

    #[tokio::test]
    async fn session_data_round_trips() {
        let store = StateStore::default();
        let mut data = SessionData::new();
        data.insert("client".to_string(), json!("inspector"));
        store.create_session("s1", data).await;

        let data = store.get_session("s1").await.unwrap();
        assert_eq!(data["client"], "inspector");
    }

    #[tokio::test]
    async fn attach_reuses_existing_queue() {
        let store = StateStore::default();
        let first = store.attach_stream("a").await;
        let second = store.attach_stream("a").await;
        assert!(first.queue().same_queue(second.queue()));
        assert_eq!(first.session_id(), "a");
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn detached_session_misses_updates_until_reconnect() {
        let store = StateStore::default();
        let live = store.attach_stream("live").await;
        let gone = store.attach_stream("gone").await;
        let queue = gone.queue().clone();
        drop(gone);
        store.create_task("t1", "job", None, None).await;

        store
            .update_task("t1", TaskUpdate::status(TaskStatus::Running))
            .await
            .unwrap();
        assert_eq!(live.queue().len(), 1);
        assert!(queue.is_empty());

        let back = store.attach_stream("gone").await;
        assert!(back.queue().same_queue(&queue));
        store
            .update_task("t1", TaskUpdate::status(TaskStatus::Completed))
            .await
            .unwrap();
        let note = back.queue().try_recv().unwrap();
        assert_eq!(note.params.unwrap()["task"]["status"], "completed");
        assert!(back.queue().is_empty());
    }

    #[tokio::test]
    async fn one_of_two_streams_keeps_session_listening() {
        let store = StateStore::default();
        let first = store.attach_stream("s").await;
        let second = store.attach_stream("s").await;
        drop(first);

        let note = OutgoingNotification::new("notifications/test", None);
        assert_eq!(store.broadcast(&note).await, 1);
        assert_eq!(second.queue().len(), 1);
    }

    #[tokio::test]
    async fn detached_subscriber_is_skipped() {
        let store = StateStore::default();
        let stream = store.attach_stream("s").await;
        store.subscribe_resource("s", "screenshot://latest").await;
        drop(stream);

        assert_eq!(store.notify_resource_update("screenshot://latest", None).await, 0);
        assert!(store.get_event_queue("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_session_removes_queue_and_subscriptions() {
        let store = StateStore::default();
        store.create_session("s1", SessionData::new()).await;
        store.subscribe_resource("s1", "screenshot://latest").await;

        assert!(store.delete_session("s1").await);
        assert!(store.get_session("s1").await.is_none());
        assert!(store.get_event_queue("s1").await.is_none());
        assert!(store.get_subscriptions("s1").await.is_empty());
        assert!(!store.delete_session("s1").await);
    }

    #[tokio::test]
    async fn update_unknown_task_is_silent() {
        let store = StateStore::default();
        let queue = store.create_session("s1", SessionData::new()).await;

        let result = store
            .update_task("missing", TaskUpdate::status(TaskStatus::Running))
            .await;
        assert_eq!(result, Ok(None));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn update_task_fans_out_once_per_session() {
        let store = StateStore::default();
        let a = store.create_session("a", SessionData::new()).await;
        let b = store.create_session("b", SessionData::new()).await;
        store.create_task("t1", "job", None, None).await;

        let task = store
            .update_task("t1", TaskUpdate::status(TaskStatus::Running))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.status, TaskStatus::Running);

        for queue in [&a, &b] {
            assert_eq!(queue.len(), 1);
            let note = queue.try_recv().unwrap();
            assert_eq!(note.method, NOTIFICATION_TASK_UPDATE);
            assert_eq!(note.params.unwrap()["task"]["status"], "running");
        }
        assert!(store.task_metadata("t1").await.unwrap().updated_at.is_some());
    }

    #[tokio::test]
    async fn terminal_status_is_not_left() {
        let store = StateStore::default();
        let queue = store.create_session("s", SessionData::new()).await;
        store.create_task("t1", "job", None, None).await;
        store
            .update_task("t1", TaskUpdate::status(TaskStatus::Completed))
            .await
            .unwrap();
        queue.try_recv();

        let err = store
            .update_task("t1", TaskUpdate::status(TaskStatus::Running))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::TerminalTransition { .. }));
        assert_eq!(store.get_task("t1").await.unwrap().status, TaskStatus::Completed);
        assert!(queue.is_empty());

        // Non-status fields may still be amended.
        let task = store
            .update_task("t1", TaskUpdate::default().with_result(json!({"ok": true})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.result, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn cancel_task_transitions_once() {
        let store = StateStore::default();
        let queue = store.create_session("s", SessionData::new()).await;
        store.create_task("t1", "job", None, None).await;

        let task = store.cancel_task("t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(queue.len(), 1);

        let again = store.cancel_task("t1").await.unwrap();
        assert_eq!(again.status, TaskStatus::Cancelled);
        assert_eq!(queue.len(), 1);

        assert!(store.cancel_task("missing").await.is_none());
    }

    #[tokio::test]
    async fn list_and_delete_tasks() {
        let store = StateStore::default();
        store.create_task("t1", "first", None, None).await;
        store.create_task("t2", "second", Some("desc".into()), None).await;

        let ids: Vec<_> = store.list_tasks().await.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, ["t1", "t2"]);

        assert!(store.delete_task("t1").await);
        assert!(!store.delete_task("t1").await);
        assert_eq!(store.list_tasks().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_tasks_are_removed() {
        let store = StateStore::default();
        store
            .create_task("t1", "short", None, Some(Duration::from_secs(1)))
            .await;
        store.create_task("t2", "forever", None, None).await;

        tokio::time::advance(Duration::from_secs(2)).await;
        let removed = store.cleanup_expired_tasks().await;

        assert_eq!(removed, ["t1"]);
        assert!(store.get_task("t1").await.is_none());
        assert!(store.get_task("t2").await.is_some());
    }

    #[tokio::test]
    async fn subscribe_is_idempotent() {
        let store = StateStore::default();
        assert!(store.subscribe_resource("s", "screenshot://latest").await);
        assert!(!store.subscribe_resource("s", "screenshot://latest").await);
        assert_eq!(store.get_subscriptions("s").await.len(), 1);

        assert!(store.unsubscribe_resource("s", "screenshot://latest").await);
        assert!(!store.unsubscribe_resource("s", "screenshot://latest").await);
        assert!(!store.unsubscribe_resource("nobody", "screenshot://latest").await);
    }

    #[tokio::test]
    async fn resource_updates_reach_only_subscribers() {
        let store = StateStore::default();
        let a = store.create_session("a", SessionData::new()).await;
        let b = store.create_session("b", SessionData::new()).await;
        store.subscribe_resource("a", "screenshot://latest").await;
        store.subscribe_resource("b", "file:///other").await;

        let delivered = store
            .notify_resource_update("screenshot://latest", None)
            .await;
        assert_eq!(delivered, 1);
        assert!(b.is_empty());

        let note = a.try_recv().unwrap();
        assert_eq!(note.method, NOTIFICATION_RESOURCE_UPDATED);
        assert_eq!(note.params.unwrap()["uri"], "screenshot://latest");
    }

    #[tokio::test]
    async fn subscriber_without_session_is_skipped() {
        let store = StateStore::default();
        store.subscribe_resource("ghost", "screenshot://latest").await;
        assert_eq!(
            store.notify_resource_update("screenshot://latest", Some(json!("x"))).await,
            0
        );
    }

    #[tokio::test]
    async fn concurrent_updates_are_not_lost() {
        let store = std::sync::Arc::new(StateStore::new(1024));
        let queue = store.create_session("s", SessionData::new()).await;
        for i in 0..20 {
            store.create_task(&format!("t{i}"), "job", None, None).await;
        }

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .update_task(&format!("t{i}"), TaskUpdate::status(TaskStatus::Running))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(queue.len(), 20);
        assert!(store
            .list_tasks()
            .await
            .iter()
            .all(|task| task.status == TaskStatus::Running));
    }
}
