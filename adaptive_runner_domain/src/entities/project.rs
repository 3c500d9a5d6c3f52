// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Project Entity
//!
//! A project is one credential scope: the unit of tenancy within the
//! daemon. The credential watcher discovers projects on disk, the service
//! loop keys its live map by `ProjectId`, and each live project owns
//! exactly one supervisor.
//!
//! The cancel handle for a running supervisor is owned by the service
//! loop, not by this entity; the entity only carries what the broker
//! adapter needs to authenticate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value_objects::QueueTransport;

/// Key of a live project: at most one supervisor exists per id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId {
    /// Which broker family the project talks to
    pub transport: QueueTransport,
    /// Project name, unique within the transport
    pub name: String,
}

impl ProjectId {
    /// Creates a project id
    pub fn new(transport: QueueTransport, name: impl Into<String>) -> Self {
        Self {
            transport,
            name: name.into(),
        }
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.transport, self.name)
    }
}

/// A discovered credential scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Identity within the daemon
    pub id: ProjectId,
    /// Opaque credential forwarded to the broker adapter
    pub credential: String,
}

impl Project {
    /// Creates a project from its identity and credential blob
    pub fn new(id: ProjectId, credential: impl Into<String>) -> Self {
        Self {
            id,
            credential: credential.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_uniqueness_spans_transports() {
        let amqp = ProjectId::new(QueueTransport::Amqp, "alpha");
        let cloud = ProjectId::new(QueueTransport::Cloud, "alpha");
        assert_ne!(amqp, cloud);
    }

    #[test]
    fn test_display_form() {
        let id = ProjectId::new(QueueTransport::Cloud, "beta");
        assert_eq!(id.to_string(), "sqs/beta");
    }
}
