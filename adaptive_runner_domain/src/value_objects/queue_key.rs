// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Queue Key Value Object
//!
//! Canonical identity of a queue at a broker. The wire form is
//! `server?queue` where `server` is the credential-stripped server
//! identity (an AMQP URL with the vhost path, or a cloud region) and
//! `queue` is the server-scoped queue name.
//!
//! Queue keys are totally ordered; supervisors rely on that ordering to
//! visit queues deterministically within a scan cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RunnerError;

/// Opaque canonical identifier of a queue at a broker.
///
/// Equality and ordering are by the full `server?queue` pair, so the same
/// queue name on two servers yields two distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueKey {
    server: String,
    queue: String,
}

impl QueueKey {
    /// Creates a queue key from its parts.
    ///
    /// Both parts must be non-empty and the server part must not itself
    /// contain the `?` separator.
    pub fn new(server: impl Into<String>, queue: impl Into<String>) -> Result<Self, RunnerError> {
        let server = server.into();
        let queue = queue.into();

        if server.is_empty() {
            return Err(RunnerError::ValidationError(
                "queue key server part is empty".to_string(),
            ));
        }
        if queue.is_empty() {
            return Err(RunnerError::ValidationError(
                "queue key queue part is empty".to_string(),
            ));
        }
        if server.contains('?') {
            return Err(RunnerError::ValidationError(format!(
                "queue key server part contains a separator: {}",
                server
            )));
        }

        Ok(Self { server, queue })
    }

    /// Parses the canonical `server?queue` form
    pub fn parse(subscription: &str) -> Result<Self, RunnerError> {
        match subscription.split_once('?') {
            Some((server, queue)) => Self::new(server, queue),
            None => Err(RunnerError::ValidationError(format!(
                "subscription was not question-mark separated: {}",
                subscription
            ))),
        }
    }

    /// Server identity this queue lives on
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Server-scoped queue name
    pub fn queue(&self) -> &str {
        &self.queue
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}?{}", self.server, self.queue)
    }
}
