// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Runner Domain
//!
//! The runner domain holds the core concepts of the compute runner daemon:
//! the machines' GPU inventory, the work requests pulled from queues, the
//! projects (credential scopes) that own those queues, and the lifecycle
//! states that gate new work. It is completely independent of transports,
//! filesystems and process execution - those arrive through the service
//! traits defined here and implemented in the infrastructure layer.
//!
//! ## Module Structure
//!
//! - `entities` - objects with identity: GPU devices, allocations,
//!   experiment requests, projects
//! - `value_objects` - immutable values: queue keys, resource demands,
//!   lifecycle states
//! - `services` - trait seams crossed by the application layer:
//!   `QueueBroker`, `CredentialSource`, `DeviceProbe`
//! - `events` - structured occurrences reported on the daemon's event
//!   channel
//! - `error` - the `RunnerError` taxonomy shared by every layer
//!
//! ## Key Invariants
//!
//! The domain enforces the accounting rules the daemon depends on:
//!
//! - A device's free slots and free memory never exceed its totals and
//!   never go negative.
//! - Every outstanding allocation is recorded in its device's tracking set;
//!   returning an allocation that is not tracked is an error, not a panic.
//! - At most one live project exists per `(transport, name)` pair.
//! - Lifecycle states other than `Running`/`Unknown` never admit new work.

pub mod entities;
pub mod error;
pub mod events;
pub mod services;
pub mod value_objects;

// Re-export commonly used types for convenient access
pub use entities::{DeviceReport, ExperimentRequest, GpuAllocation, GpuDevice, ProjectId};
pub use error::RunnerError;
pub use events::RunnerEvent;
pub use services::{CredentialSource, DeviceProbe, QueueBroker, QueueMessage};
pub use value_objects::{LifecycleState, QueueKey, QueueTransport, ResourceDemand};
