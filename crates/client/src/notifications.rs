use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio::sync::{broadcast, RwLock};

/// A user-visible diagnostic message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.message
        )
    }
}

/// Append-only notification log with a live broadcast for subscribers.
/// Informational only: nothing reads it back for correctness.
#[derive(Clone)]
pub struct NotificationLog {
    inner: Arc<RwLock<LogState>>,
    tx: broadcast::Sender<Notification>,
}

struct LogState {
    // Survives `clear`
    next_seq: u64,
    entries: Vec<Notification>,
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationLog {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self {
            inner: Arc::new(RwLock::new(LogState {
                next_seq: 1,
                entries: Vec::new(),
            })),
            tx,
        }
    }

    /// Append a message and broadcast it to subscribers.
    /// Sequence numbers are assigned under the write lock, so history and
    /// broadcast order both follow `seq`.
    pub async fn add(&self, message: impl Into<String>) -> Notification {
        let message = message.into();
        let mut inner = self.inner.write().await;

        let notification = Notification {
            seq: inner.next_seq,
            timestamp: Utc::now(),
            message,
        };
        inner.next_seq += 1;
        inner.entries.push(notification.clone());
        let _ = self.tx.send(notification.clone());

        tracing::debug!("notification {}: {}", notification.seq, notification.message);
        notification
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Whole history, oldest first.
    pub async fn entries(&self) -> Vec<Notification> {
        self.inner.read().await.entries.clone()
    }

    /// The newest `limit` entries, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<Notification> {
        let inner = self.inner.read().await;
        let start = inner.entries.len().saturating_sub(limit);
        inner.entries[start..].to_vec()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Empty the visible history. Sequence numbers keep counting.
    pub async fn clear(&self) {
        self.inner.write().await.entries.clear();
    }
}
