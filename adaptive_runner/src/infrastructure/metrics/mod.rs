// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Prometheus observability: the metrics service, the scrape endpoint
//! and the gauge refresh loop.

pub mod endpoint;
pub mod service;

use std::sync::Arc;
use std::time::Duration;

use adaptive_runner_bootstrap::shutdown::CancellationToken;

use crate::infrastructure::gpu::GpuAllocator;

pub use endpoint::MetricsEndpoint;
pub use service::MetricsService;

/// Refreshes the resource gauges on a fixed cadence until cancelled
pub async fn run_exporter(
    metrics: MetricsService,
    allocator: Arc<GpuAllocator>,
    period: Duration,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(period) => {}
        }
        metrics.record_gpu_inventory(&allocator);
    }
}
