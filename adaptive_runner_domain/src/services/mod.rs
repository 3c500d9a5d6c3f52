// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain service traits: the seams between the core control loops and
//! the outside world. Transports, credential parsing, device probing and
//! task execution all arrive through these traits; infrastructure supplies
//! the implementations.

pub mod credential_source;
pub mod device_probe;
pub mod queue_broker;
pub mod task_executor;

pub use credential_source::CredentialSource;
pub use device_probe::DeviceProbe;
pub use queue_broker::{MessageReceipt, QueueBroker, QueueDescriptor, QueueMessage};
pub use task_executor::{TaskDisposition, TaskExecutor};
