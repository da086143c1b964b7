// User-facing transient notifications
//
// Notifications carry a de-duplication key: while one with the same key is
// still on screen, further triggers are dropped.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Key used for the session-expired message
pub const SESSION_EXPIRED_KEY: &str = "session-expired";

/// Text shown when the session cannot be recovered
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired, please log in again";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub key: String,
    pub level: Level,
    pub message: String,
    /// Auto-dismiss after this long
    pub duration: Duration,
}

/// Fan-out point for notifications
pub struct NotificationCenter {
    /// Keys on screen, with their dismissal deadline
    visible: DashMap<String, Instant>,
    tx: broadcast::Sender<Notification>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            visible: DashMap::new(),
            tx,
        }
    }

    /// Receive every notification shown from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Show `notification` unless one with the same key is still visible
    ///
    /// Returns true if it was shown.
    pub fn show(&self, notification: Notification) -> bool {
        let now = Instant::now();
        let deadline = now + notification.duration;

        match self.visible.entry(notification.key.clone()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    tracing::debug!(key = %notification.key, "Duplicate notification suppressed");
                    return false;
                }
                entry.insert(deadline);
            }
            Entry::Vacant(entry) => {
                entry.insert(deadline);
            }
        }

        match notification.level {
            Level::Info => tracing::info!(key = %notification.key, "{}", notification.message),
            Level::Warning => tracing::warn!(key = %notification.key, "{}", notification.message),
            Level::Error => tracing::error!(key = %notification.key, "{}", notification.message),
        }

        // No subscribers is fine
        let _ = self.tx.send(notification);
        true
    }

    /// Take a notification off screen early
    pub fn dismiss(&self, key: &str) {
        self.visible.remove(key);
    }

    pub fn is_visible(&self, key: &str) -> bool {
        self.visible
            .get(key)
            .map(|deadline| *deadline > Instant::now())
            .unwrap_or(false)
    }
}
