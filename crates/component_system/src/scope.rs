//! Structured concurrency scope for handler tasks
//!
//! A [`Scope`] owns every task spawned into it. Joining a scope waits for all
//! of them, including tasks spawned by other tasks while the join is pending.
//! The first failure cancels the remaining tasks, and all failures are
//! reported together at the join.

use crate::error::ComponentError;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace};

/// Cloneable handle to a group of tasks that are joined and cancelled together
#[derive(Clone, Default)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

#[derive(Default)]
struct ScopeInner {
    tracker: TaskTracker,
    token: CancellationToken,
    failures: Mutex<Vec<ComponentError>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope, run `body` with it, then join every task it spawned.
    ///
    /// An error from `body` cancels the scope; it is still joined before the
    /// error is returned.
    pub async fn open<F, Fut>(body: F) -> Result<(), ComponentError>
    where
        F: FnOnce(Scope) -> Fut,
        Fut: Future<Output = Result<(), ComponentError>>,
    {
        let scope = Scope::new();
        let outcome = body(scope.clone()).await;
        if let Err(err) = outcome {
            scope.cancel();
            // the body failure wins over task failures caused by the cancel
            let _ = scope.join().await;
            return Err(err);
        }
        scope.join().await
    }

    /// Create a scope that is cancelled whenever this one is.
    ///
    /// The child has its own task set and must be joined separately.
    pub fn child(&self) -> Scope {
        Scope {
            inner: Arc::new(ScopeInner {
                tracker: TaskTracker::new(),
                token: self.inner.token.child_token(),
                failures: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Schedule a task in this scope.
    ///
    /// The task stops at its next suspension point once the scope is
    /// cancelled. A failure or panic is recorded for the join and cancels the
    /// remaining tasks.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = Result<(), ComponentError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let token = self.inner.token.clone();
        self.inner.tracker.spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                outcome = AssertUnwindSafe(task).catch_unwind() => outcome,
            };
            let failure = match outcome {
                Ok(Ok(())) => return,
                Ok(Err(ComponentError::Cancelled)) if token.is_cancelled() => return,
                Ok(Err(err)) => err,
                Err(panic) => ComponentError::HandlerPanicked {
                    event: String::new(),
                    owner: "<task>".into(),
                    message: panic_message(panic),
                },
            };
            debug!("Scope task failed, cancelling siblings: {}", failure);
            inner.failures.lock().push(failure);
            inner.token.cancel();
        });
    }

    /// Cancel every outstanding task in this scope
    pub fn cancel(&self) {
        trace!("Cancelling scope with {} live tasks", self.inner.tracker.len());
        self.inner.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolves once the scope has been cancelled
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    /// Number of tasks still running
    pub fn live_tasks(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Cooperative checkpoint: yield to the runtime, then fail if cancelled
    pub async fn checkpoint(&self) -> Result<(), ComponentError> {
        tokio::task::yield_now().await;
        if self.is_cancelled() {
            return Err(ComponentError::Cancelled);
        }
        Ok(())
    }

    /// Wait for every task in the scope and report their failures.
    ///
    /// The scope stays usable afterwards; tasks spawned later are joined by
    /// the next call.
    pub async fn join(&self) -> Result<(), ComponentError> {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();

        let failures = std::mem::take(&mut *self.inner.failures.lock());
        match ComponentError::aggregate(failures) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("live_tasks", &self.live_tasks())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Render a caught panic payload
pub(crate) fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked with unknown payload".to_string()
    }
}
