// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Entities for the runner domain: objects with identity whose state
//! changes over time - GPU devices and their outstanding allocations,
//! decoded experiment requests, and project credential scopes.

pub mod experiment_request;
pub mod gpu_device;
pub mod project;

pub use experiment_request::ExperimentRequest;
pub use gpu_device::{DeviceReport, GpuAllocation, GpuDevice};
pub use project::{Project, ProjectId};
