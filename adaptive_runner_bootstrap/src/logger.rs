// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Logger
//!
//! Tracing initialisation plus a minimal logging trait for the window
//! before the subscriber is installed (flag validation, config loading).
//!
//! The application proper logs through `tracing` macros directly; this
//! trait exists so bootstrap code can be tested without a global
//! subscriber and so early failures still reach the operator.

use tracing_subscriber::EnvFilter;

/// Bootstrap logging abstraction
pub trait BootstrapLogger: Send + Sync {
    /// Log an error message
    fn error(&self, message: &str);
    /// Log a warning message
    fn warn(&self, message: &str);
    /// Log an info message
    fn info(&self, message: &str);
    /// Log a debug message
    fn debug(&self, message: &str);
}

/// Console logger that routes bootstrap messages through tracing
pub struct ConsoleLogger {
    prefix: String,
}

impl ConsoleLogger {
    /// Create a new console logger with the default prefix
    pub fn new() -> Self {
        Self::with_prefix("bootstrap")
    }

    /// Create a new console logger with a custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapLogger for ConsoleLogger {
    fn error(&self, message: &str) {
        tracing::error!(target: "bootstrap", "[{}] {}", self.prefix, message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "bootstrap", "[{}] {}", self.prefix, message);
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "bootstrap", "[{}] {}", self.prefix, message);
    }

    fn debug(&self, message: &str) {
        tracing::debug!(target: "bootstrap", "[{}] {}", self.prefix, message);
    }
}

/// No-op logger for testing
pub struct NoOpLogger;

impl NoOpLogger {
    /// Create a new no-op logger
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoOpLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapLogger for NoOpLogger {
    fn error(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn debug(&self, _message: &str) {}
}

/// Installs the global tracing subscriber.
///
/// The default level comes from the verbose flag; `RUST_LOG` overrides it
/// entirely when set. Safe to call once per process; later calls are
/// ignored so tests can initialise freely.
pub fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_logger_discards() {
        let logger = NoOpLogger::new();
        logger.error("err");
        logger.warn("warn");
        logger.info("info");
        logger.debug("debug");
    }

    #[test]
    fn test_console_logger_does_not_panic_without_subscriber() {
        let logger = ConsoleLogger::with_prefix("test");
        logger.info("message before subscriber install");
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false);
        init_tracing(true);
    }
}
