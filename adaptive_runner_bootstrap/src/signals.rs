// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # System Signal Handling
//!
//! Signal handling for graceful daemon shutdown.
//!
//! ## Supported Signals
//!
//! - **SIGTERM** (15) - orchestrator-initiated shutdown
//! - **SIGINT** (2) - user interrupt (Ctrl+C)
//! - **SIGHUP** (1) - hangup (terminal closed)
//!
//! All three initiate the same graceful drain; there is no reload-on-HUP
//! behaviour, configuration changes arrive through the credentials
//! directory and the lifecycle channel instead.

use std::future::Future;
use std::pin::Pin;

/// Callback type for shutdown notification
pub type ShutdownCallback = Box<dyn FnOnce() + Send + 'static>;

/// System signal handling trait
///
/// Abstracts signal delivery so tests can drive shutdown explicitly.
pub trait SystemSignals: Send + Sync {
    /// Wait for a shutdown signal and invoke the callback.
    ///
    /// Blocks until SIGTERM, SIGINT or SIGHUP is received, then calls the
    /// provided callback exactly once to initiate graceful shutdown.
    fn wait_for_signal(
        &self,
        on_shutdown: ShutdownCallback,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Unix signal handler implementation backed by tokio::signal
#[cfg(unix)]
pub struct UnixSignalHandler;

#[cfg(unix)]
impl UnixSignalHandler {
    /// Create a new Unix signal handler
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Default for UnixSignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl SystemSignals for UnixSignalHandler {
    fn wait_for_signal(
        &self,
        on_shutdown: ShutdownCallback,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            use tokio::signal::unix::{signal, SignalKind};

            let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
                tracing::error!("failed to register SIGTERM handler");
                return;
            };
            let Ok(mut sigint) = signal(SignalKind::interrupt()) else {
                tracing::error!("failed to register SIGINT handler");
                return;
            };
            let Ok(mut sighup) = signal(SignalKind::hangup()) else {
                tracing::error!("failed to register SIGHUP handler");
                return;
            };

            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    tracing::info!("received SIGINT (Ctrl+C), initiating graceful shutdown");
                }
                _ = sighup.recv() => {
                    tracing::info!("received SIGHUP, initiating graceful shutdown");
                }
            }

            on_shutdown();
        })
    }
}

/// No-op signal handler for testing
///
/// Never receives signals, allowing tests to control shutdown explicitly.
pub struct NoOpSignalHandler;

impl NoOpSignalHandler {
    /// Create a new no-op signal handler
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoOpSignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSignals for NoOpSignalHandler {
    fn wait_for_signal(
        &self,
        _on_shutdown: ShutdownCallback,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            std::future::pending::<()>().await;
        })
    }
}

/// Create the signal handler for the current platform
pub fn create_signal_handler() -> Box<dyn SystemSignals> {
    #[cfg(unix)]
    {
        Box::new(UnixSignalHandler::new())
    }

    #[cfg(not(unix))]
    {
        compile_error!("the runner daemon only supports unix platforms");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_noop_handler_never_fires() {
        let handler = NoOpSignalHandler::new();
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = Box::new(move || {
            called_clone.store(true, Ordering::SeqCst);
        });

        tokio::select! {
            _ = handler.wait_for_signal(callback) => {
                panic!("no-op handler should never complete");
            }
            _ = tokio::time::sleep(tokio::time::Duration::from_millis(100)) => {}
        }

        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_create_signal_handler() {
        let _handler = create_signal_handler();
    }
}
