//! Graceful shutdown coordination for dispatchers.
//!
//! Holds the cancellation token shared by a dispatcher's callers and
//! executors, plus the executor join handles. Shutdown cancels the token
//! and joins the executors, optionally bounded by a timeout.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    /// Executors still running when the timeout elapsed. They are left detached.
    Timeout { remaining: usize },
}

/// Coordinates shutdown of one dispatcher's executors.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    state: Mutex<ShutdownState>,
    executors: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            state: Mutex::new(ShutdownState::Running),
            executors: Mutex::new(Vec::new()),
        }
    }

    /// Token cancelled when shutdown begins.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.lock()
    }

    /// Check if accepting new requests.
    pub fn is_accepting(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Track executor tasks to be joined on shutdown.
    pub fn register(&self, handles: impl IntoIterator<Item = JoinHandle<()>>) {
        self.executors.lock().extend(handles);
    }

    /// Executors registered and not yet joined.
    pub fn executor_count(&self) -> usize {
        self.executors.lock().len()
    }

    /// Signal cancellation, then join executors. `None` waits indefinitely.
    ///
    /// Calling this again after a completed shutdown returns `Complete` at once.
    pub async fn initiate(&self, timeout: Option<Duration>) -> ShutdownResult {
        *self.state.lock() = ShutdownState::Draining;
        self.token.cancel();

        let mut handles = std::mem::take(&mut *self.executors.lock());
        let result = match timeout {
            None => {
                join_all(&mut handles).await;
                ShutdownResult::Complete
            }
            Some(timeout) => match tokio::time::timeout(timeout, join_all(&mut handles)).await {
                Ok(()) => ShutdownResult::Complete,
                Err(_) => ShutdownResult::Timeout {
                    remaining: handles.iter().filter(|h| !h.is_finished()).count(),
                },
            },
        };

        *self.state.lock() = ShutdownState::Stopped;
        result
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

async fn join_all(handles: &mut [JoinHandle<()>]) {
    for joined in futures::future::join_all(handles.iter_mut()).await {
        if let Err(e) = joined {
            tracing::warn!(error = %e, "executor task ended abnormally");
        }
    }
}
