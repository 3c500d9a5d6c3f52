// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shutdown Coordination
//!
//! Cancellation tokens and graceful-shutdown orchestration for the daemon.
//!
//! ## Token Tree
//!
//! Tokens form a tree rooted at the service loop: the root token covers
//! the daemon, each project supervisor holds a child of the root, and each
//! running executor holds a child of its supervisor's token. Cancelling a
//! token cancels its whole subtree; cancelling a child leaves the parent
//! untouched. This is how a disappearing credential tears down exactly one
//! project while `DrainAndTerminate` tears down everything.
//!
//! ## Usage
//!
//! ```rust
//! use adaptive_runner_bootstrap::shutdown::ShutdownCoordinator;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
//!     let token = coordinator.token();
//!     let worker_token = token.child();
//!
//!     tokio::spawn(async move {
//!         tokio::select! {
//!             _ = worker_token.cancelled() => { /* wind down */ }
//!             _ = tokio::time::sleep(Duration::from_secs(1)) => { /* work */ }
//!         }
//!     });
//!
//!     coordinator.initiate_shutdown();
//!     coordinator.wait_for_shutdown().await;
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::Notify;

/// Default grace period for graceful shutdown (in seconds)
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;

struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<TokenInner>>>,
}

impl TokenInner {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
            children: Mutex::new(Vec::new()),
        })
    }

    fn cancel(self: &Arc<Self>) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();

        // Cancellation fans out downward; a poisoned child list is treated
        // as empty rather than propagating a panic through shutdown.
        let children = match self.children.lock() {
            Ok(mut guard) => guard.drain(..).collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel();
            }
        }
    }
}

/// Cancellation token for signalling shutdown to async tasks.
///
/// Lightweight and cloneable; clones share cancellation state. Child
/// tokens created with [`CancellationToken::child`] are cancelled when any
/// ancestor cancels.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Create a new root cancellation token
    pub fn new() -> Self {
        Self {
            inner: TokenInner::new(),
        }
    }

    /// Create a child token cancelled together with this one.
    ///
    /// A child created after its parent was already cancelled starts out
    /// cancelled.
    pub fn child(&self) -> CancellationToken {
        let child = CancellationToken::new();

        if let Ok(mut children) = self.inner.children.lock() {
            children.push(Arc::downgrade(&child.inner));
        }
        // Window between the parent's cancel fan-out and our registration.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Cancel this token and every descendant
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Check if cancelled (non-blocking)
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for cancellation (async)
    pub async fn cancelled(&self) {
        let mut notified = std::pin::pin!(self.inner.notify.notified());
        // Register interest before the flag check so a cancel landing in
        // between cannot be missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Shutdown coordinator.
///
/// Owns the root cancellation token and enforces a grace period between
/// the shutdown signal and process exit.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    grace_period: Duration,
    shutdown_initiated: Arc<AtomicBool>,
    shutdown_complete: Arc<Notify>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    ///
    /// # Arguments
    ///
    /// * `grace_period` - Maximum time to wait for graceful shutdown
    pub fn new(grace_period: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            grace_period,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            shutdown_complete: Arc::new(Notify::new()),
        }
    }

    /// Get the root cancellation token
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Check if shutdown has been initiated
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Initiate graceful shutdown: flag it, cancel the token tree, start
    /// the grace timer
    pub fn initiate_shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tracing::info!(grace_period = ?self.grace_period, "initiating graceful shutdown");
            self.token.cancel();
        }
    }

    /// Wait for shutdown to complete or the grace period to expire.
    ///
    /// Returns `true` if shutdown completed within the grace period.
    pub async fn wait_for_shutdown(&self) -> bool {
        if !self.is_shutting_down() {
            tracing::warn!("wait_for_shutdown called but shutdown not initiated");
            return true;
        }

        tokio::select! {
            _ = self.shutdown_complete.notified() => {
                tracing::info!("shutdown completed gracefully");
                true
            }
            _ = tokio::time::sleep(self.grace_period) => {
                tracing::warn!("shutdown grace period expired, forcing shutdown");
                false
            }
        }
    }

    /// Signal that all cleanup is done, releasing waiters
    pub fn complete_shutdown(&self) {
        self.shutdown_complete.notify_waiters();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_create_and_cancel() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_token_clone_shares_state() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();
        token1.cancel();
        assert!(token2.is_cancelled());
    }

    #[test]
    fn test_child_cancelled_with_parent() {
        let parent = CancellationToken::new();
        let child = parent.child();
        let grandchild = child.child();

        parent.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_cancel_leaves_parent_running() {
        let parent = CancellationToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_parent_starts_cancelled() {
        let parent = CancellationToken::new();
        parent.cancel();
        assert!(parent.child().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = CancellationToken::new();
        let clone = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            clone.cancel();
        });

        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_waiter_wakes_on_parent_cancel() {
        let parent = CancellationToken::new();
        let child = parent.child();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            parent.cancel();
        });

        child.cancelled().await;
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_coordinator_initiate() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        assert!(!coordinator.is_shutting_down());
        coordinator.initiate_shutdown();
        assert!(coordinator.is_shutting_down());
        assert!(coordinator.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_coordinator_complete_before_grace_expiry() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        coordinator.initiate_shutdown();

        let clone = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            clone.complete_shutdown();
        });

        assert!(coordinator.wait_for_shutdown().await);
    }

    #[tokio::test]
    async fn test_coordinator_grace_timeout() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(50));
        coordinator.initiate_shutdown();
        assert!(!coordinator.wait_for_shutdown().await);
    }
}
