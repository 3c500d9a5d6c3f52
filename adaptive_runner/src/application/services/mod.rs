// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Application services: the per-project supervisor and the service loop
//! that owns the live project set.

pub mod project_supervisor;
pub mod service_loop;

pub use project_supervisor::{ProjectSupervisor, SupervisorContext};
pub use service_loop::{ApplyOutcome, ServiceLoop, SupervisorSpawner};
