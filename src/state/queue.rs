//! Bounded per-session notification queue.
//!
//! Producers (task fan-out, resource updates) never wait: when the queue is
//! full the oldest pending notification is discarded to make room. The single
//! consumer is the SSE stream for the session, which awaits [`NotificationQueue::recv`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use crate::mcp::protocol::OutgoingNotification;

/// Default number of notifications buffered per session.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct Inner {
    buffer: Mutex<VecDeque<OutgoingNotification>>,
    ready: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

/// Cloneable handle to a session's notification queue.
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<Inner>,
}

impl NotificationQueue {
    /// Creates an empty queue holding at most `capacity` notifications.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
                ready: Notify::new(),
                capacity,
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Enqueues a notification without blocking.
    ///
    /// Returns `true` if an older notification had to be dropped.
    pub fn push(&self, notification: OutgoingNotification) -> bool {
        let dropped = {
            let mut buffer = self.inner.buffer.lock();
            let dropped = if buffer.len() >= self.inner.capacity {
                buffer.pop_front().is_some()
            } else {
                false
            };
            buffer.push_back(notification);
            dropped
        };

        if dropped {
            let total = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                capacity = self.inner.capacity,
                dropped_total = total,
                "Notification queue full, dropped oldest entry"
            );
        }

        self.inner.ready.notify_one();
        dropped
    }

    /// Waits for the next notification.
    ///
    /// Cancel-safe: dropping the future never loses a queued notification.
    pub async fn recv(&self) -> OutgoingNotification {
        loop {
            if let Some(notification) = self.try_recv() {
                return notification;
            }
            self.inner.ready.notified().await;
        }
    }

    /// Takes the next notification if one is queued.
    #[must_use]
    pub fn try_recv(&self) -> Option<OutgoingNotification> {
        self.inner.buffer.lock().pop_front()
    }

    /// Number of queued notifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered notifications.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Total notifications discarded because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Returns `true` if both handles refer to the same queue.
    #[must_use]
    pub fn same_queue(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl std::fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("len", &self.len())
            .field("capacity", &self.inner.capacity)
            .field("dropped", &self.dropped())
            .finish()
    }
}
