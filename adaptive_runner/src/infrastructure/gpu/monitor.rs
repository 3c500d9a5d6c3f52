// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # GPU Health Monitor
//!
//! Periodic re-probe of the GPU hardware. The monitor notices ECC
//! failures, records them on the allocator's inventory and forwards each
//! fault to the reporting channel exactly once per transition. The first
//! pass also announces every visible device.
//!
//! The period is jittered so a fleet of runners started together does not
//! thunder against the management library in lockstep.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use adaptive_runner_bootstrap::shutdown::CancellationToken;
use adaptive_runner_domain::events::RunnerEvent;
use adaptive_runner_domain::services::DeviceProbe;

use super::allocator::GpuAllocator;

/// Baseline monitor period
pub const MONITOR_PERIOD: Duration = Duration::from_secs(30);
/// Maximum jitter applied either side of the baseline
pub const MONITOR_JITTER: Duration = Duration::from_secs(3);

/// Periodic GPU health watcher
pub struct GpuMonitor {
    allocator: Arc<GpuAllocator>,
    probe: Arc<dyn DeviceProbe>,
    events: mpsc::Sender<RunnerEvent>,
    period: Duration,
    jitter: Duration,
}

impl GpuMonitor {
    /// Creates a monitor with the production period
    pub fn new(
        allocator: Arc<GpuAllocator>,
        probe: Arc<dyn DeviceProbe>,
        events: mpsc::Sender<RunnerEvent>,
    ) -> Self {
        Self::with_period(allocator, probe, events, MONITOR_PERIOD, MONITOR_JITTER)
    }

    /// Creates a monitor with an explicit period. Test constructor.
    pub fn with_period(
        allocator: Arc<GpuAllocator>,
        probe: Arc<dyn DeviceProbe>,
        events: mpsc::Sender<RunnerEvent>,
        period: Duration,
        jitter: Duration,
    ) -> Self {
        Self {
            allocator,
            probe,
            events,
            period,
            jitter,
        }
    }

    fn jittered_period(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.period;
        }
        let jitter_ms = self.jitter.as_millis() as i64;
        let offset = rand::rng().random_range(-jitter_ms..=jitter_ms);
        let base_ms = self.period.as_millis() as i64;
        Duration::from_millis((base_ms + offset).max(1) as u64)
    }

    /// Runs until the token cancels
    pub async fn run(self, token: CancellationToken) {
        debug!("starting gpu monitor");
        let mut first_pass = true;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("stopping gpu monitor");
                    return;
                }
                _ = tokio::time::sleep(self.jittered_period()) => {}
            }

            let reports = match self.probe.probe() {
                Ok(reports) => reports,
                Err(e) => {
                    warn!(error = %e, "gpu health probe failed");
                    continue;
                }
            };

            for report in &reports {
                if first_pass {
                    let _ = self
                        .events
                        .send(RunnerEvent::DeviceFound {
                            uuid: report.uuid.clone(),
                            name: report.name.clone(),
                            at: chrono::Utc::now(),
                        })
                        .await;
                }

                if let Some(fault) = &report.ecc_failure {
                    // Only the healthy-to-failed transition is reported;
                    // repeats stay silent.
                    if self.allocator.record_ecc_failure(&report.uuid, fault) {
                        let _ = self
                            .events
                            .send(RunnerEvent::device_fault(report.uuid.clone(), fault.clone()))
                            .await;
                    }
                }
            }

            first_pass = false;
        }
    }
}
