// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Lifecycle Controller
//!
//! Latest-value broadcast of the host lifecycle state. External tooling
//! pushes updates in; every supervisor holds a subscription that yields
//! the current state on join and on every change. History is never
//! replayed - only the latest value matters.

use tokio::sync::watch;

use adaptive_runner_domain::value_objects::LifecycleState;

/// Owner of the lifecycle broadcast channel
pub struct LifecycleController {
    sender: watch::Sender<LifecycleState>,
}

impl LifecycleController {
    /// Creates a controller in the `Running` state
    pub fn new() -> Self {
        let (sender, _) = watch::channel(LifecycleState::Running);
        Self { sender }
    }

    /// The current lifecycle state
    pub fn current(&self) -> LifecycleState {
        *self.sender.borrow()
    }

    /// Applies an update; subscribers observe it immediately
    pub fn set(&self, state: LifecycleState) {
        // send_replace never fails even with no live subscribers.
        let previous = self.sender.send_replace(state);
        if previous != state {
            tracing::info!(from = %previous, to = %state, "lifecycle state changed");
        }
    }

    /// Subscribes; the receiver sees the latest state on join and on
    /// every subsequent change
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.sender.subscribe()
    }
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

/// Completes when the observed state becomes `DrainAndTerminate`.
///
/// Used by executor tasks to force cancellation on terminate while
/// letting `DrainAndSuspend` work run to natural completion. Pends
/// forever when the controller goes away without ever terminating.
pub async fn terminated(mut rx: watch::Receiver<LifecycleState>) {
    loop {
        if rx.borrow().forces_cancellation() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_running() {
        let controller = LifecycleController::new();
        assert_eq!(controller.current(), LifecycleState::Running);
    }

    #[test]
    fn test_subscriber_sees_latest_on_join() {
        let controller = LifecycleController::new();
        controller.set(LifecycleState::DrainAndSuspend);

        let rx = controller.subscribe();
        assert_eq!(*rx.borrow(), LifecycleState::DrainAndSuspend);
    }

    #[tokio::test]
    async fn test_subscriber_sees_changes() {
        let controller = LifecycleController::new();
        let mut rx = controller.subscribe();

        controller.set(LifecycleState::DrainAndTerminate);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), LifecycleState::DrainAndTerminate);
    }

    #[tokio::test]
    async fn test_latest_wins() {
        let controller = LifecycleController::new();
        controller.set(LifecycleState::DrainAndSuspend);
        controller.set(LifecycleState::Running);

        let rx = controller.subscribe();
        assert_eq!(*rx.borrow(), LifecycleState::Running);
    }

    #[tokio::test]
    async fn test_terminated_future() {
        let controller = LifecycleController::new();
        let rx = controller.subscribe();

        let wait = tokio::spawn(terminated(rx));
        controller.set(LifecycleState::DrainAndSuspend);
        assert!(!wait.is_finished());

        controller.set(LifecycleState::DrainAndTerminate);
        tokio::time::timeout(std::time::Duration::from_secs(1), wait)
            .await
            .unwrap()
            .unwrap();
    }
}
