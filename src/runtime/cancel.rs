//! Hierarchical cooperative cancellation
//!
//! A [`CancellationScope`] is a node in a tree. Cancelling a node cancels every
//! descendant; it never reaches the parent or siblings. Scopes only move from
//! "live" to "cancelled", never back, and the only way to grow the tree is
//! [`CancellationScope::child`].

use crate::error::{common, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::Notify;
use tracing::trace;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

struct ScopeNode {
    id: u64,
    depth: usize,
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<ScopeNode>>>,
}

impl ScopeNode {
    fn new(depth: usize) -> Self {
        Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            depth,
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
            children: Mutex::new(Vec::new()),
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        trace!(scope = self.id, depth = self.depth, "Cancellation scope cancelled");
        self.notify.notify_waiters();

        let children = match self.children.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// A node in the cancellation tree
#[derive(Clone)]
pub struct CancellationScope {
    node: Arc<ScopeNode>,
}

impl CancellationScope {
    /// Create a new root scope
    pub fn new() -> Self {
        Self {
            node: Arc::new(ScopeNode::new(0)),
        }
    }

    /// Derive a child scope
    ///
    /// A child of an already cancelled scope starts out cancelled.
    pub fn child(&self) -> Self {
        let child = Arc::new(ScopeNode::new(self.node.depth + 1));
        let mut children = match self.node.children.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Checked under the lock: `cancel` sets the flag before draining.
        if self.node.cancelled.load(Ordering::SeqCst) {
            child.cancelled.store(true, Ordering::SeqCst);
        } else {
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        Self { node: child }
    }

    /// Cancel this scope and all of its descendants; idempotent
    pub fn cancel(&self) {
        self.node.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.node.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the scope is cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(common::scope_cancelled())
        } else {
            Ok(())
        }
    }

    /// Resolve once the scope is cancelled
    pub async fn cancelled(&self) {
        loop {
            let notified = self.node.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    pub fn id(&self) -> u64 {
        self.node.id
    }

    /// Distance from the root scope
    pub fn depth(&self) -> usize {
        self.node.depth
    }
}

impl Default for CancellationScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationScope")
            .field("id", &self.node.id)
            .field("depth", &self.node.depth)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parent_cancels_children() {
        let root = CancellationScope::new();
        let child = root.child();
        let grandchild = child.child();

        root.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert!(grandchild.check().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_child_does_not_escape_upward() {
        let root = CancellationScope::new();
        let left = root.child();
        let right = root.child();

        left.cancel();
        assert!(left.is_cancelled());
        assert!(!root.is_cancelled());
        assert!(!right.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_scope_starts_cancelled() {
        let root = CancellationScope::new();
        root.cancel();
        assert!(root.child().is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let scope = CancellationScope::new();
        scope.cancel();
        scope.cancel();
        assert!(scope.is_cancelled());
        assert_eq!(scope.child().depth(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let root = CancellationScope::new();
        let child = root.child();

        let waiter = tokio::spawn({
            let child = child.clone();
            async move { child.cancelled().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        root.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be woken")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let scope = CancellationScope::new();
        scope.cancel();
        tokio::time::timeout(Duration::from_millis(100), scope.cancelled())
            .await
            .unwrap();
    }
}
