//! Cancellation scopes: every spawned stream/cache-writer task registers its
//! `JoinHandle` under the scope that owns it. Cancelling (or dropping the last
//! handle to) a scope aborts every registered task and recursively cancels every
//! child scope, so cancelling a request cancels every leaf stream and cache
//! writer it transitively created.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    handles: Mutex<Vec<JoinHandle<()>>>,
    children: Mutex<Vec<CancellationScope>>,
}

/// A cancellation scope, cheaply cloneable; clones share the same underlying
/// cancellation state.
#[derive(Clone)]
pub struct CancellationScope {
    inner: Arc<Inner>,
}

impl CancellationScope {
    #[must_use]
    pub fn new() -> Self {
        CancellationScope {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                handles: Mutex::new(Vec::new()),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a child scope registered under this one: cancelling `self` also
    /// cancels the child.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = CancellationScope::new();
        if self.is_cancelled() {
            child.cancel();
        } else {
            self.inner.children.lock().unwrap().push(child.clone());
        }
        child
    }

    /// Register a task under this scope. If the scope is already cancelled the
    /// handle is aborted immediately rather than stored.
    pub fn register(&self, handle: JoinHandle<()>) {
        if self.is_cancelled() {
            handle.abort();
            return;
        }
        self.inner.handles.lock().unwrap().push(handle);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once this scope is cancelled. Intended for use in a `select!`
    /// inside a producer loop so it can stop promptly instead of only being
    /// torn down via task abort.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }

    /// Cancel this scope: abort every registered task and recursively cancel
    /// every child scope. Idempotent.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.notify.notify_waiters();
        for handle in self.inner.handles.lock().unwrap().drain(..) {
            handle.abort();
        }
        for child in self.inner.children.lock().unwrap().drain(..) {
            child.cancel();
        }
    }
}

impl Default for CancellationScope {
    fn default() -> Self {
        CancellationScope::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_aborts_registered_tasks() {
        let scope = CancellationScope::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        scope.register(handle);
        scope.cancel();
        assert!(scope.is_cancelled());
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_child() {
        let parent = CancellationScope::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn registering_after_cancel_aborts_immediately() {
        let scope = CancellationScope::new();
        scope.cancel();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        scope.register(handle);
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let scope = CancellationScope::new();
        let waiter_scope = scope.clone();
        let waiter = tokio::spawn(async move {
            waiter_scope.cancelled().await;
        });
        scope.cancel();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn child_created_after_cancel_is_already_cancelled() {
        let parent = CancellationScope::new();
        parent.cancel();
        let child = parent.child();
        assert!(child.is_cancelled());
    }
}
