// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Supervision Utilities
//!
//! Wrappers around `tokio::spawn` that make background task outcomes
//! visible: every start, completion and failure is logged, and panics
//! surface as typed errors instead of disappearing with the task.

use tokio::task::JoinHandle;
use tracing::{debug, error};

use adaptive_runner_domain::error::RunnerError;

/// Result type alias for application operations
pub type AppResult<T> = Result<T, RunnerError>;

/// Spawns a supervised task with lifecycle logging.
///
/// The returned handle must be awaited (or deliberately detached through
/// the service loop's live map); the wrapper guarantees the outcome is
/// logged either way.
pub fn spawn_supervised<F, T>(name: &'static str, fut: F) -> JoinHandle<AppResult<T>>
where
    F: std::future::Future<Output = AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    debug!(task = name, "task starting");

    tokio::spawn(async move {
        let result = fut.await;

        match &result {
            Ok(_) => debug!(task = name, "task completed"),
            Err(e) => error!(task = name, error = %e, "task failed"),
        }

        result
    })
}

/// Awaits a supervised task, converting panics into typed errors
pub async fn join_supervised<T>(handle: JoinHandle<AppResult<T>>) -> AppResult<T> {
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(RunnerError::internal_error(format!("task panicked: {}", e))),
        Err(e) if e.is_cancelled() => Err(RunnerError::cancelled()),
        Err(e) => Err(RunnerError::internal_error(format!(
            "task join failed: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_propagates() {
        let handle = spawn_supervised("test-success", async { Ok::<i32, RunnerError>(42) });
        assert_eq!(join_supervised(handle).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_error_propagates() {
        let handle = spawn_supervised("test-error", async {
            Err::<(), _>(RunnerError::queue_error("broken"))
        });
        assert!(join_supervised(handle).await.is_err());
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let handle: JoinHandle<AppResult<()>> = tokio::spawn(async {
            panic!("test panic");
        });
        let result = join_supervised(handle).await;
        assert!(result.unwrap_err().to_string().contains("panicked"));
    }
}
