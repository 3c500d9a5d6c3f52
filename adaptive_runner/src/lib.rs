// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Adaptive Runner
//!
//! A long-running compute runner daemon. It pulls machine-learning
//! experiment requests from external work queues (an AMQP broker and a
//! cloud queue service), checks each request against the local machine's
//! CPU, memory, disk and GPU budgets, prepares an isolated execution
//! environment, runs the experiment as a child process, and acknowledges
//! or requeues the message based on the outcome.
//!
//! ## Architecture
//!
//! The crate follows the workspace's layered layout:
//!
//! - **Application layer** (`application`) - the project supervisors and
//!   the service loop that starts and stops them as credentials come and
//!   go
//! - **Infrastructure layer** (`infrastructure`) - the GPU allocator and
//!   monitor, the resource gate, the queue transports, the credential
//!   watcher, the lifecycle broadcast, the script executor and the
//!   Prometheus metrics stack
//!
//! Domain types and the service trait seams live in
//! `adaptive_runner_domain`; process bootstrap (CLI, signals, shutdown,
//! exit codes) lives in `adaptive_runner_bootstrap`.
//!
//! ## Control Flow
//!
//! ```text
//! credential watcher ──full set──▶ service loop ──spawn/cancel──▶ supervisor
//! supervisor ──enumerate/pull──▶ queue broker
//! supervisor ──try_admit──▶ resource gate ──reserve──▶ gpu allocator
//! supervisor ──run──▶ executor ──exit──▶ ack / nack
//! lifecycle controller ──latest state──▶ every supervisor
//! ```

pub mod application;
pub mod infrastructure;
