// Single-flight refresh coordination
//
// One request leads a refresh; every request that hits a 401 while it is in
// flight waits in a queue for the outcome instead of refreshing again.

use std::mem;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;

use crate::error::ClientError;

/// Outcome handed to queued requests: the new access token, or why there is none
pub type RefreshOutcome = Result<String, ClientError>;

type Waiter = oneshot::Sender<RefreshOutcome>;

/// The queue only exists while a refresh is in flight
enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<Waiter> },
}

/// What a failing request should do next
pub enum Ticket<'a> {
    /// No refresh in flight: this request performs it
    Leader(RefreshLease<'a>),
    /// A refresh is in flight: wait for its outcome
    Follower(oneshot::Receiver<RefreshOutcome>),
}

/// Per-client refresh state
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Become the refresh leader, or join the queue behind the current one
    pub fn acquire(&self) -> Ticket<'_> {
        let mut state = self.lock();
        match *state {
            RefreshState::Idle => {
                *state = RefreshState::Refreshing {
                    waiters: Vec::new(),
                };
                Ticket::Leader(RefreshLease {
                    coordinator: self,
                    settled: false,
                })
            }
            RefreshState::Refreshing { ref mut waiters } => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                tracing::debug!(queued = waiters.len(), "Refresh in flight, request queued");
                Ticket::Follower(rx)
            }
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock(), RefreshState::Refreshing { .. })
    }

    /// Number of requests waiting on the in-flight refresh
    pub fn queued(&self) -> usize {
        match *self.lock() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { ref waiters } => waiters.len(),
        }
    }

    /// Return to idle and hand back the queue, in one critical section
    fn take_waiters(&self) -> Vec<Waiter> {
        match mem::replace(&mut *self.lock(), RefreshState::Idle) {
            RefreshState::Idle => Vec::new(),
            RefreshState::Refreshing { waiters } => waiters,
        }
    }
}

/// Held by the request leading a refresh
///
/// Dropping it without calling `settle` (the leading future was cancelled)
/// still returns the coordinator to idle; queued requests then see a closed
/// channel.
pub struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshLease<'_> {
    /// Finish the refresh and release every queued request, in arrival order
    ///
    /// Returns how many queued requests were released.
    pub fn settle(mut self, outcome: RefreshOutcome) -> usize {
        self.settled = true;
        let waiters = self.coordinator.take_waiters();
        let count = waiters.len();

        match outcome {
            Ok(token) => {
                tracing::debug!(queued = count, "Releasing queued requests with new token");
                for waiter in waiters {
                    let _ = waiter.send(Ok(token.clone()));
                }
            }
            Err(err) => {
                if count > 0 {
                    tracing::warn!(queued = count, error = %err, "Rejecting queued requests");
                }
                for waiter in waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
            }
        }

        count
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let waiters = self.coordinator.take_waiters();
            tracing::warn!(
                queued = waiters.len(),
                "Refresh abandoned before settling, releasing queue"
            );
        }
    }
}
