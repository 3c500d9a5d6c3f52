// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Queue Broker
//!
//! A complete `QueueBroker` living in process memory. It backs the
//! supervisor and service-loop test suites and doubles as the transport
//! for test-mode deployments with no broker available.
//!
//! Delivery semantics mirror the real transports: pulled messages sit in
//! an in-flight table until acked or nacked, and a nack with requeue puts
//! the message back at the head of its queue.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;

use adaptive_runner_domain::error::RunnerError;
use adaptive_runner_domain::services::{
    MessageReceipt, QueueBroker, QueueDescriptor, QueueMessage,
};
use adaptive_runner_domain::value_objects::QueueKey;

#[derive(Default)]
struct MemoryState {
    queues: BTreeMap<String, VecDeque<(String, Vec<u8>)>>,
    inflight: HashMap<String, (String, String, Vec<u8>)>,
}

/// In-memory broker double
pub struct MemoryBroker {
    server: String,
    state: Mutex<MemoryState>,
    next_id: AtomicU64,
    fail_enumerate: AtomicBool,
    pulls: AtomicU64,
    acks: AtomicU64,
    nacks: AtomicU64,
}

impl MemoryBroker {
    /// Creates a broker with the given server identity
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            state: Mutex::new(MemoryState::default()),
            next_id: AtomicU64::new(1),
            fail_enumerate: AtomicBool::new(false),
            pulls: AtomicU64::new(0),
            acks: AtomicU64::new(0),
            nacks: AtomicU64::new(0),
        }
    }

    /// Declares an empty queue
    pub fn declare_queue(&self, name: &str) {
        self.state
            .lock()
            .queues
            .entry(name.to_string())
            .or_default();
    }

    /// Appends a message to a queue, creating it as needed. Returns the
    /// message id.
    pub fn push(&self, queue: &str, body: impl Into<Vec<u8>>) -> String {
        let id = format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.state
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back((id.clone(), body.into()));
        id
    }

    /// Makes the next enumerate calls fail until reset
    pub fn set_enumerate_failure(&self, failing: bool) {
        self.fail_enumerate.store(failing, Ordering::SeqCst);
    }

    /// Number of pull_one calls observed
    pub fn pull_count(&self) -> u64 {
        self.pulls.load(Ordering::SeqCst)
    }

    /// Number of acks observed
    pub fn ack_count(&self) -> u64 {
        self.acks.load(Ordering::SeqCst)
    }

    /// Number of nacks observed
    pub fn nack_count(&self) -> u64 {
        self.nacks.load(Ordering::SeqCst)
    }

    /// Messages still queued (not in flight) on one queue
    pub fn depth(&self, queue: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// The key this broker exposes a queue name under
    pub fn key_for(&self, queue: &str) -> Result<QueueKey, RunnerError> {
        QueueKey::new(self.server.clone(), queue)
    }
}

#[async_trait]
impl QueueBroker for MemoryBroker {
    async fn enumerate(
        &self,
        matcher: Option<&Regex>,
        mismatcher: Option<&Regex>,
        _deadline: std::time::Duration,
    ) -> Result<BTreeMap<QueueKey, QueueDescriptor>, RunnerError> {
        if self.fail_enumerate.load(Ordering::SeqCst) {
            return Err(RunnerError::queue_error("enumerate failure injected"));
        }

        let state = self.state.lock();
        let mut found = BTreeMap::new();
        for (name, pending) in &state.queues {
            if let Some(matcher) = matcher {
                if !matcher.is_match(name) {
                    continue;
                }
            }
            if let Some(mismatcher) = mismatcher {
                if mismatcher.is_match(name) {
                    continue;
                }
            }
            let Ok(key) = self.key_for(name) else {
                continue;
            };
            found.insert(
                key,
                QueueDescriptor {
                    auth: String::new(),
                    backlog_hint: Some(pending.len() as u64),
                },
            );
        }
        Ok(found)
    }

    async fn pull_one(
        &self,
        queue: &QueueKey,
        _deadline: std::time::Duration,
    ) -> Result<Option<QueueMessage>, RunnerError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        let pending = state
            .queues
            .get_mut(queue.queue())
            .ok_or_else(|| RunnerError::queue_error(format!("no such queue: {}", queue)))?;

        let Some((id, body)) = pending.pop_front() else {
            return Ok(None);
        };

        let token = format!("tok-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        state.inflight.insert(
            token.clone(),
            (queue.queue().to_string(), id.clone(), body.clone()),
        );

        Ok(Some(QueueMessage {
            id,
            queue: queue.clone(),
            body,
            receipt: MessageReceipt::Direct { token },
        }))
    }

    async fn ack(&self, message: &QueueMessage) -> Result<(), RunnerError> {
        let MessageReceipt::Direct { token } = &message.receipt else {
            return Err(RunnerError::queue_error("foreign receipt"));
        };
        let mut state = self.state.lock();
        state
            .inflight
            .remove(token)
            .ok_or_else(|| RunnerError::queue_error(format!("unknown delivery: {}", token)))?;
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(&self, message: &QueueMessage, requeue: bool) -> Result<(), RunnerError> {
        let MessageReceipt::Direct { token } = &message.receipt else {
            return Err(RunnerError::queue_error("foreign receipt"));
        };
        let mut state = self.state.lock();
        let (queue, id, body) = state
            .inflight
            .remove(token)
            .ok_or_else(|| RunnerError::queue_error(format!("unknown delivery: {}", token)))?;
        if requeue {
            state
                .queues
                .entry(queue)
                .or_default()
                .push_front((id, body));
        }
        self.nacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(
        &self,
        routing_key: &str,
        _content_type: &str,
        payload: &[u8],
    ) -> Result<(), RunnerError> {
        self.push(routing_key, payload.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const DEADLINE: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_enumerate_honours_filters() {
        let broker = MemoryBroker::new("memory");
        broker.declare_queue("rmq_alpha");
        broker.declare_queue("rmq_beta_skip");
        broker.declare_queue("other");

        let matcher = Regex::new("^rmq_.*$").unwrap();
        let mismatcher = Regex::new("skip").unwrap();
        let found = broker
            .enumerate(Some(&matcher), Some(&mismatcher), DEADLINE)
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found.keys().next().unwrap().queue(), "rmq_alpha");
    }

    #[tokio::test]
    async fn test_pull_ack_cycle() {
        let broker = MemoryBroker::new("memory");
        broker.push("rmq_q", b"payload".to_vec());
        let key = broker.key_for("rmq_q").unwrap();

        let msg = broker.pull_one(&key, DEADLINE).await.unwrap().unwrap();
        assert_eq!(msg.body, b"payload");
        assert_eq!(broker.depth("rmq_q"), 0);

        broker.ack(&msg).await.unwrap();
        assert_eq!(broker.ack_count(), 1);

        // Acking twice is a transport error.
        assert!(broker.ack(&msg).await.is_err());
    }

    #[tokio::test]
    async fn test_nack_requeue_puts_message_back() {
        let broker = MemoryBroker::new("memory");
        broker.push("rmq_q", b"payload".to_vec());
        let key = broker.key_for("rmq_q").unwrap();

        let msg = broker.pull_one(&key, DEADLINE).await.unwrap().unwrap();
        broker.nack(&msg, true).await.unwrap();
        assert_eq!(broker.depth("rmq_q"), 1);

        let again = broker.pull_one(&key, DEADLINE).await.unwrap().unwrap();
        assert_eq!(again.id, msg.id);
    }

    #[tokio::test]
    async fn test_empty_queue_yields_none() {
        let broker = MemoryBroker::new("memory");
        broker.declare_queue("rmq_q");
        let key = broker.key_for("rmq_q").unwrap();
        assert!(broker.pull_one(&key, DEADLINE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enumerate_failure_injection() {
        let broker = MemoryBroker::new("memory");
        broker.set_enumerate_failure(true);
        assert!(broker.enumerate(None, None, DEADLINE).await.is_err());
        broker.set_enumerate_failure(false);
        assert!(broker.enumerate(None, None, DEADLINE).await.is_ok());
    }
}
