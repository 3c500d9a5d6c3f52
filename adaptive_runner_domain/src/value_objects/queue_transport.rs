// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Transport tag identifying which broker family a queue or project
//! belongs to. Used in project keys, metrics labels and events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The broker families the runner can pull work from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QueueTransport {
    /// AMQP broker (RabbitMQ style), configured through a single URL
    Amqp,
    /// Cloud queue service, configured through per-project credential files
    Cloud,
}

impl QueueTransport {
    /// Stable label used in metrics and log fields
    pub fn label(&self) -> &'static str {
        match self {
            QueueTransport::Amqp => "rabbitMQ",
            QueueTransport::Cloud => "sqs",
        }
    }
}

impl fmt::Display for QueueTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
