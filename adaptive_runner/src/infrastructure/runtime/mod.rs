// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Runtime infrastructure: the resource gate, the lifecycle broadcast,
//! the script executor and task supervision helpers.

pub mod executor;
pub mod lifecycle;
pub mod resource_gate;
pub mod supervision;

pub use executor::ScriptExecutor;
pub use lifecycle::LifecycleController;
pub use resource_gate::{AdmissionHandle, AdmissionReject, ResourceGate};
pub use supervision::{join_supervised, spawn_supervised, AppResult};
