// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Queue transport adapters: AMQP, the cloud queue service, and the
//! in-memory double used by tests and test-mode deployments.

pub mod amqp_broker;
pub mod cloud_broker;
pub mod memory_broker;

pub use amqp_broker::{AmqpBroker, AmqpUrl};
pub use cloud_broker::{CloudBroker, CloudCredential, CloudCredentialSource};
pub use memory_broker::MemoryBroker;
