// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the hierarchical error system for the runner domain.
//! Every operation in the daemon returns a `RunnerError` carrying a
//! descriptive message and a stable kind, so that supervisors can decide
//! locally whether to retry, requeue, or report.
//!
//! ## Error Architecture
//!
//! The variants map onto the daemon's failure taxonomy:
//!
//! - **Configuration**: `InvalidConfiguration`, `ValidationError` - flag and
//!   config-file problems surfaced at startup
//! - **Credentials**: `CredentialError` - unreadable or unverifiable
//!   credential material; the affected project is omitted and re-evaluated
//!   on the next watcher tick
//! - **Broker**: `QueueError`, `TimeoutError` - transport failures treated
//!   as transient and retried with backoff
//! - **Resources**: `InsufficientGpu`, `ResourceExhausted` - admission
//!   refusals; the message is requeued for another runner
//! - **Allocator**: `UnknownDevice`, `UnknownAllocation` - accounting
//!   violations logged and survived, never panicked on
//! - **Hardware**: `HardwareFault` - ECC failures that exclude a device
//!   from future allocations
//! - **System**: `IoError`, `SerializationError`, `TaskFailed`,
//!   `Cancelled`, `MetricsError`, `InternalError`
//!
//! ## Recovery Strategy
//!
//! `is_recoverable()` is the single classification point used to decide
//! between requeueing a message and acknowledging it with a failure
//! report. Timeouts, broker errors, resource refusals and I/O failures are
//! retried; everything else is permanent.

use thiserror::Error;

/// Domain-specific errors for the compute runner daemon.
///
/// Each variant includes a descriptive message. Errors are cloneable so
/// they can be recorded on a device (ECC faults) or fanned out to the
/// reporting channel without giving up the original.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Credential error: {0}")]
    CredentialError(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Insufficient GPU: {0}")]
    InsufficientGpu(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Unknown allocation: {0}")]
    UnknownAllocation(String),

    #[error("Hardware fault: {0}")]
    HardwareFault(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl RunnerError {
    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new credential error
    pub fn credential_error(msg: impl Into<String>) -> Self {
        Self::CredentialError(msg.into())
    }

    /// Creates a new queue transport error
    pub fn queue_error(msg: impl Into<String>) -> Self {
        Self::QueueError(msg.into())
    }

    /// Creates a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::TimeoutError(msg.into())
    }

    /// Creates a new insufficient-GPU error
    pub fn insufficient_gpu(msg: impl Into<String>) -> Self {
        Self::InsufficientGpu(msg.into())
    }

    /// Creates a new resource exhaustion error
    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// Creates a new hardware fault error
    pub fn hardware_fault(msg: impl Into<String>) -> Self {
        Self::HardwareFault(msg.into())
    }

    /// Creates a new IO error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::IoError(msg.into())
    }

    /// Creates a new metrics error
    pub fn metrics_error(msg: impl Into<String>) -> Self {
        Self::MetricsError(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Creates a cancellation error without further detail
    pub fn cancelled() -> Self {
        Self::Cancelled("operation cancelled".to_string())
    }

    /// Checks whether retrying the failed operation can reasonably succeed.
    ///
    /// Recoverable kinds trigger backoff-and-retry (broker calls) or a
    /// requeue (messages); everything else is acknowledged with a failure
    /// report.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RunnerError::TimeoutError(_)
                | RunnerError::QueueError(_)
                | RunnerError::ResourceExhausted(_)
                | RunnerError::InsufficientGpu(_)
                | RunnerError::IoError(_)
        )
    }

    /// Gets the stable error category tag used in logs and metrics
    pub fn category(&self) -> &'static str {
        match self {
            RunnerError::InvalidConfiguration(_) => "configuration",
            RunnerError::ValidationError(_) => "validation",
            RunnerError::CredentialError(_) => "credentials",
            RunnerError::QueueError(_) => "queue",
            RunnerError::TimeoutError(_) => "timeout",
            RunnerError::InsufficientGpu(_) => "gpu",
            RunnerError::ResourceExhausted(_) => "resource",
            RunnerError::UnknownDevice(_) => "allocator",
            RunnerError::UnknownAllocation(_) => "allocator",
            RunnerError::HardwareFault(_) => "hardware",
            RunnerError::IoError(_) => "io",
            RunnerError::SerializationError(_) => "serialization",
            RunnerError::TaskFailed(_) => "task",
            RunnerError::Cancelled(_) => "cancellation",
            RunnerError::MetricsError(_) => "metrics",
            RunnerError::InternalError(_) => "internal",
        }
    }

    /// Checks whether the error must abort daemon startup rather than be
    /// absorbed by a supervisor
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RunnerError::InvalidConfiguration(_) | RunnerError::ValidationError(_)
        )
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for RunnerError {
    fn from(err: std::io::Error) -> Self {
        RunnerError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for RunnerError {
    fn from(err: serde_json::Error) -> Self {
        RunnerError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(RunnerError::timeout("enumerate").is_recoverable());
        assert!(RunnerError::queue_error("conn reset").is_recoverable());
        assert!(RunnerError::resource_exhausted("no cores").is_recoverable());
        assert!(!RunnerError::invalid_config("bad regex").is_recoverable());
        assert!(!RunnerError::UnknownAllocation("gone".into()).is_recoverable());
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(RunnerError::invalid_config("bad flag").is_fatal());
        assert!(!RunnerError::queue_error("refused").is_fatal());
    }

    #[test]
    fn test_category_is_stable() {
        assert_eq!(RunnerError::UnknownDevice("x".into()).category(), "allocator");
        assert_eq!(RunnerError::UnknownAllocation("y".into()).category(), "allocator");
        assert_eq!(RunnerError::hardware_fault("ecc").category(), "hardware");
    }

    #[test]
    fn test_io_error_conversion() {
        let err: RunnerError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.category(), "io");
    }
}
