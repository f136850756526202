//! Background task tracking for long-running services.
//!
//! Every listener and actor the server starts is spawned through
//! [`BackgroundTasks`], which hands each task a child of one shutdown token
//! and can wait for all of them to wind down.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Named tasks spawned on one runtime and stopped together.
pub struct BackgroundTasks {
    handle: Handle,
    cancel: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl BackgroundTasks {
    #[must_use]
    pub fn new(handle: Handle, cancel: CancellationToken) -> Self {
        Self {
            handle,
            cancel,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Uses the current runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current(cancel: CancellationToken) -> Self {
        Self::new(Handle::current(), cancel)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Spawns the future built by `make`, which receives the task's own
    /// cancellation token.
    pub fn spawn<F>(&self, name: &'static str, make: impl FnOnce(CancellationToken) -> F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = self.handle.spawn(make(self.cancel.child_token()));
        log::debug!("[Runtime] Spawned {}", name);
        self.tasks.lock().push((name, task));
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Cancels every task and waits up to `grace` for each to return.
    /// Tasks still running after that are aborted.
    ///
    /// Returns how many tasks exited on their own.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());

        let mut clean = 0;
        for (name, mut task) in tasks {
            match tokio::time::timeout(grace, &mut task).await {
                Ok(Ok(())) => clean += 1,
                Ok(Err(e)) => log::error!("[Runtime] {} ended abnormally: {}", name, e),
                Err(_) => {
                    log::warn!("[Runtime] {} did not stop within {:?}, aborting", name, grace);
                    task.abort();
                }
            }
        }
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn tasks_see_cancellation_and_are_joined() {
        let tasks = BackgroundTasks::current(CancellationToken::new());
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopped);

        tasks.spawn("waiter", |cancel| async move {
            cancel.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(tasks.len(), 1);

        assert_eq!(tasks.shutdown(Duration::from_secs(1)).await, 1);
        assert!(stopped.load(Ordering::SeqCst));
        assert!(tasks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stragglers_are_aborted() {
        let tasks = BackgroundTasks::current(CancellationToken::new());
        tasks.spawn("stubborn", |_cancel| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        assert_eq!(tasks.shutdown(Duration::from_millis(50)).await, 0);
    }
}
