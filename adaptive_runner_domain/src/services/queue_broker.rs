// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Queue Broker Service Interface
//!
//! The uniform interface over work-queue transports. The core control
//! loops depend only on this trait; the AMQP and cloud adapters implement
//! it, and an in-memory double implements it for tests.
//!
//! ## Contract
//!
//! - `enumerate` discovers queues whose server-side name matches the
//!   `matcher` and does not match the `mismatcher`. An error return is
//!   distinguishable from an empty map: both back the supervisor off, but
//!   they are logged differently.
//! - `pull_one` fetches at most one message and never auto-acks.
//! - `ack`/`nack` signal the outcome; `nack` with `requeue` hands the
//!   message back for another runner.
//! - `publish` exists for tests and tooling; production code paths never
//!   call it.
//!
//! Every call respects the supplied deadline. Results are returned in a
//! `BTreeMap` so that iteration order is the lexicographic queue-key order
//! the supervisor's rotation depends on.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::error::RunnerError;
use crate::value_objects::QueueKey;

/// What `enumerate` knows about one discovered queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDescriptor {
    /// Opaque authentication blob to be used when pulling from this queue
    pub auth: String,
    /// Ready+unacked message count when the transport reports one
    pub backlog_hint: Option<u64>,
}

/// Transport-specific token needed to ack or nack a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageReceipt {
    /// AMQP delivery tag scoped to the channel the message came from
    Amqp { delivery_tag: u64 },
    /// Cloud receipt handle
    Cloud { receipt_handle: String },
    /// In-memory token used by the test double
    Direct { token: String },
}

/// A single undecoded message pulled from a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Message id used for in-flight deduplication
    pub id: String,
    /// Queue the message came from
    pub queue: QueueKey,
    /// Raw payload bytes
    pub body: Vec<u8>,
    /// Token for the outcome call
    pub receipt: MessageReceipt,
}

/// Uniform queue transport interface
#[async_trait]
pub trait QueueBroker: Send + Sync {
    /// Discovers the queues currently visible to this broker connection,
    /// filtered by the match/mismatch expressions
    async fn enumerate(
        &self,
        matcher: Option<&Regex>,
        mismatcher: Option<&Regex>,
        deadline: Duration,
    ) -> Result<BTreeMap<QueueKey, QueueDescriptor>, RunnerError>;

    /// Fetches a single message without acknowledging it; `None` when the
    /// queue is empty
    async fn pull_one(
        &self,
        queue: &QueueKey,
        deadline: Duration,
    ) -> Result<Option<QueueMessage>, RunnerError>;

    /// Acknowledges a message as handled
    async fn ack(&self, message: &QueueMessage) -> Result<(), RunnerError>;

    /// Rejects a message, optionally handing it back to the queue
    async fn nack(&self, message: &QueueMessage, requeue: bool) -> Result<(), RunnerError>;

    /// Sends a payload to a routing key. Test and tooling shim.
    async fn publish(
        &self,
        routing_key: &str,
        content_type: &str,
        payload: &[u8],
    ) -> Result<(), RunnerError>;
}
