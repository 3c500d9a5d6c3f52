// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Runner Events
//!
//! Structured occurrences other parts of the system care about. Components
//! push these onto a single reporting channel; one task at the top of the
//! daemon drains the channel and logs each event exactly once. This keeps
//! noisy inner loops free of logging policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::ProjectId;
use crate::value_objects::QueueKey;

/// An event on the daemon's reporting channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunnerEvent {
    /// A supervisor was spawned for a newly credentialed project
    ProjectStarted {
        project: ProjectId,
        host: String,
        at: DateTime<Utc>,
    },
    /// A project's supervisor was cancelled or finished
    ProjectStopped {
        project: ProjectId,
        host: String,
        reason: String,
        at: DateTime<Utc>,
    },
    /// A device transitioned into an ECC failure state; emitted once per
    /// transition
    DeviceFault {
        uuid: String,
        fault: String,
        at: DateTime<Utc>,
    },
    /// A device was seen by the first monitor pass
    DeviceFound {
        uuid: String,
        name: String,
        at: DateTime<Utc>,
    },
    /// A queue enumeration pass failed
    QueueScanFailed {
        project: ProjectId,
        error: String,
        at: DateTime<Utc>,
    },
    /// A pulled message could not be processed and was requeued
    MessageRequeued {
        queue: QueueKey,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl RunnerEvent {
    /// Creates a project-started event stamped now
    pub fn project_started(project: ProjectId, host: impl Into<String>) -> Self {
        RunnerEvent::ProjectStarted {
            project,
            host: host.into(),
            at: Utc::now(),
        }
    }

    /// Creates a project-stopped event stamped now
    pub fn project_stopped(
        project: ProjectId,
        host: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        RunnerEvent::ProjectStopped {
            project,
            host: host.into(),
            reason: reason.into(),
            at: Utc::now(),
        }
    }

    /// Creates a device-fault event stamped now
    pub fn device_fault(uuid: impl Into<String>, fault: impl Into<String>) -> Self {
        RunnerEvent::DeviceFault {
            uuid: uuid.into(),
            fault: fault.into(),
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::QueueTransport;

    #[test]
    fn test_events_serialize() {
        let event = RunnerEvent::project_started(
            ProjectId::new(QueueTransport::Amqp, "alpha"),
            "node-1",
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("alpha"));
        assert!(json.contains("node-1"));
    }
}
