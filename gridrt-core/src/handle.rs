//! Completion tracking for async dispatch (§4.1 "Handle").
//!
//! A [`Handle`] is a registry of in-flight work items, not a future itself.
//! `waitForCompletion` in the source material spins until the registry is
//! empty, which is what makes nested use safe: a scan that recursively
//! issues more async work against the *same* handle before its own async
//! leaf has completed just adds more entries for the spin loop to drain,
//! rather than deadlocking on a single oneshot that resolves too early.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{FatalKind, Result};
use crate::locality::Locality;

/// Tracks outstanding async work items registered against it. `wait` blocks
/// until the outstanding count returns to zero, including work items
/// registered *during* the wait by already-running tasks (§9, nested
/// handle usage inside the prefix-scan).
#[derive(Clone)]
pub struct Handle {
    outstanding: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl Handle {
    pub fn new() -> Self {
        Handle {
            outstanding: Arc::new(AtomicUsize::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Register one in-flight work item. Call before spawning it.
    fn register(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark one work item complete. Wakes a waiter if the registry just
    /// drained to zero.
    fn complete(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Track a future as one unit of work against this handle, completing
    /// the registration when it resolves. The future may itself register
    /// further work against the same handle before returning — that's the
    /// nested case this type exists to support.
    pub fn track<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.register();
        let this = self.clone();
        tokio::spawn(async move {
            let out = fut.await;
            this.complete();
            out
        })
    }

    /// Spin until every work item registered against this handle — including
    /// ones registered after `wait` was called — has completed. Unlike a
    /// single oneshot channel, re-checking the counter after each wake keeps
    /// this correct under nested registration.
    pub async fn wait(&self) -> Result<()> {
        loop {
            // Register interest before checking the counter: `Notify`
            // only wakes futures that are already polling when
            // `notify_waiters` fires, so checking first and constructing
            // the `notified()` future second leaves a window where the
            // last `complete()` can fire between the two and be missed
            // forever.
            let notified = self.notify.notified();
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return Ok(());
            }
            notified.await;
        }
    }

    /// Same as [`Handle::wait`] but fails fatally if `unreachable` names a
    /// locality the caller already knows is gone, rather than spinning
    /// forever against work that will never complete.
    pub async fn wait_or_unreachable(&self, unreachable: Option<Locality>) -> Result<()> {
        if let Some(loc) = unreachable {
            return Err(FatalKind::UnreachableLocality(loc).into());
        }
        self.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_returns_immediately_with_nothing_registered() {
        let handle = Handle::new();
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn wait_blocks_until_tracked_future_completes() {
        let handle = Handle::new();
        handle.track(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
        });
        assert_eq!(handle.outstanding_count(), 1);
        handle.wait().await.unwrap();
        assert_eq!(handle.outstanding_count(), 0);
    }

    #[tokio::test]
    async fn nested_registration_during_wait_is_drained() {
        let handle = Handle::new();
        let inner = handle.clone();
        handle.track(async move {
            inner
                .track(async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                })
                .await
                .unwrap();
        });
        handle.wait().await.unwrap();
        assert_eq!(handle.outstanding_count(), 0);
    }
}
