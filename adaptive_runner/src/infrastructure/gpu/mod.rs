// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! GPU inventory management: the allocator, its platform probes and the
//! periodic health monitor.

pub mod allocator;
pub mod monitor;
pub mod probe;

pub use allocator::{GpuAllocator, GpuAllocations};
pub use monitor::GpuMonitor;
pub use probe::{detect_probe, EmptyProbe, InventoryFileProbe, StaticProbe};
