//! Sequential execution context.
//!
//! Serializes asynchronous tasks submitted over time: at most one runs at a
//! time and they complete in submission order. The order is fixed when
//! [`SequentialContext::run`] is called, not when the returned future is first
//! polled, so a caller may register a task and spawn it later.
//!
//! A failed task never blocks its successors. With retry enabled, a failed
//! task is attempted once more before its error is returned.

use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::warn;

/// Context that runs tasks one at a time in submission order.
pub struct SequentialContext {
    name: &'static str,
    retry_failed: bool,
    /// Completion signal of the most recently submitted task.
    tail: Mutex<oneshot::Receiver<()>>,
}

impl SequentialContext {
    /// Create a context. `name` only appears in logs.
    pub fn new(name: &'static str) -> Self {
        let (done, tail) = oneshot::channel();
        let _ = done.send(());
        Self {
            name,
            retry_failed: false,
            tail: Mutex::new(tail),
        }
    }

    /// Retry a failed task once before reporting its error.
    pub fn with_retry(mut self, retry_failed: bool) -> Self {
        self.retry_failed = retry_failed;
        self
    }

    /// Submit a task. The returned future resolves to the task's own result
    /// once every previously submitted task has settled and this one has run.
    pub fn run<F, Fut, T, E>(&self, mut task: F) -> impl Future<Output = Result<T, E>> + Send
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Display + Send,
    {
        let (done, tail) = oneshot::channel();
        let previous = {
            let mut slot = self.tail.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *slot, tail)
        };
        let name = self.name;
        let retry_failed = self.retry_failed;

        async move {
            // A dropped predecessor counts as settled.
            let _ = previous.await;

            let mut result = task().await;
            if retry_failed {
                let failed = match &result {
                    Err(e) => {
                        warn!(context = name, error = %e, "Sequential task failed, retrying once");
                        true
                    }
                    Ok(_) => false,
                };
                if failed {
                    result = task().await;
                }
            }
            if let Err(e) = &result {
                warn!(context = name, error = %e, "Sequential task failed");
            }

            let _ = done.send(());
            result
        }
    }
}
