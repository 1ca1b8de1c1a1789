//! Cooperative-cancellation helpers shared by every [`crate::client::Client`]
//! run loop.
//!
//! `WaitGroup` gives every `*_run` method a way to signal completion
//! exactly once, even on panic, using RAII instead of a `defer wg.Done()`:
//! a [`Worker`] handle decrements the counter in its `Drop` impl, which
//! fires during unwinding from a panic as reliably as it does on a normal
//! return.

use std::sync::{
    atomic::{
        AtomicUsize,
        Ordering,
    },
    Arc,
};

use tokio::sync::Notify;

#[derive(Clone, Debug, Default)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    count: AtomicUsize,
    notify: Notify,
}

impl WaitGroup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one unit of work and returns a handle that must be dropped
    /// (or allowed to drop) when that work finishes.
    #[must_use]
    pub fn worker(&self) -> Worker {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        Worker {
            wg: self.clone(),
        }
    }

    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Waits until every outstanding [`Worker`] has been dropped.
    pub async fn wait(&self) {
        loop {
            if self.inner.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            let notified = self.inner.notify.notified();
            // Re-check after registering interest to avoid missing a
            // notification fired between the load above and this await.
            if self.inner.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub struct Worker {
    wg: WaitGroup,
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.wg.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.wg.inner.notify.notify_waiters();
        }
    }
}
