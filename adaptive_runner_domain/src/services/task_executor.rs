// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Executor Service Interface
//!
//! The boundary to whatever actually runs an experiment. The supervisor
//! admits a message, then hands the decoded request and the allocation
//! environment to the executor and waits. The executor owns the child
//! process; the supervisor owns the admission lease and the cancellation
//! decision.
//!
//! The disposition carries the outcome classification - the supervisor
//! does not second-guess it:
//!
//! - `Success` → the message is acked
//! - `Retry` → the failure is transient somewhere below the experiment
//!   (spawn failure, I/O); the message is requeued for another runner
//! - `Fatal` → the experiment itself failed; the message is acked with a
//!   failure report so it never loops

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::entities::ExperimentRequest;

/// Outcome classification for one executed task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDisposition {
    /// Ran to completion with a zero exit
    Success,
    /// Did not run properly for reasons another runner may not share
    Retry(String),
    /// Ran and failed, or can never run; retrying will not help
    Fatal(String),
}

impl TaskDisposition {
    /// Whether the originating message should go back on the queue
    pub fn should_requeue(&self) -> bool {
        matches!(self, TaskDisposition::Retry(_))
    }
}

/// Runs one admitted experiment to completion
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Executes the request with the given process environment.
    ///
    /// Implementations must tolerate being dropped mid-run: cancellation
    /// is delivered by dropping the future, and any child process must die
    /// with it.
    async fn run(
        &self,
        request: &ExperimentRequest,
        env: &BTreeMap<String, String>,
    ) -> TaskDisposition;
}
