// Delayed navigation to the login view

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Where the client sends the user when the session cannot be recovered
pub const LOGIN_ROUTE: &str = "/login";

/// Navigation primitive
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Navigator for terminal front ends: tells the user how to log back in
pub struct LoginPrompt;

impl Navigator for LoginPrompt {
    fn navigate(&self, route: &str) {
        tracing::info!(route = route, "Redirecting to login");
        eprintln!("Your session has ended. Run `pawcare login` to sign in again.");
    }
}

/// Handle to a scheduled redirect
#[derive(Clone, Debug)]
pub struct RedirectHandle {
    route: String,
    delay: Duration,
    cancel: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl RedirectHandle {
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Stop the redirect if it has not fired yet
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    fn is_pending(&self) -> bool {
        !self.is_cancelled() && !self.has_fired()
    }
}

/// Schedules navigation after a delay, at most one pending at a time
pub struct Redirector {
    navigator: Arc<dyn Navigator>,
    pending: Mutex<Option<RedirectHandle>>,
}

impl Redirector {
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self {
            navigator,
            pending: Mutex::new(None),
        }
    }

    /// Navigate to `route` after `delay`
    ///
    /// If a redirect is already pending, returns that one instead of stacking
    /// another. Must be called from within a tokio runtime.
    pub fn schedule(&self, route: &str, delay: Duration) -> RedirectHandle {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(ref handle) = *pending {
            if handle.is_pending() {
                return handle.clone();
            }
        }

        let handle = RedirectHandle {
            route: route.to_string(),
            delay,
            cancel: CancellationToken::new(),
            fired: Arc::new(AtomicBool::new(false)),
        };

        let navigator = self.navigator.clone();
        let task_handle = handle.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = task_handle.cancel.cancelled() => {
                    tracing::debug!(route = %task_handle.route, "Redirect cancelled");
                }
                _ = tokio::time::sleep(task_handle.delay) => {
                    task_handle.fired.store(true, Ordering::SeqCst);
                    navigator.navigate(&task_handle.route);
                }
            }
        });

        tracing::debug!(route = route, delay_ms = delay.as_millis() as u64, "Redirect scheduled");
        *pending = Some(handle.clone());
        handle
    }

    /// Cancel the pending redirect, if any
    pub fn cancel_pending(&self) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(ref handle) = *pending {
            handle.cancel();
        }
    }

    /// The most recently scheduled redirect
    pub fn pending(&self) -> Option<RedirectHandle> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
