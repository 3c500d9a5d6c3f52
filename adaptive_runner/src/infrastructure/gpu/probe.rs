// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Device Probes
//!
//! Platform implementations of the `DeviceProbe` seam.
//!
//! Real deployments describe their hardware through an inventory file (the
//! same JSON shape the management library emits); hosts without GPUs run
//! with the empty probe and the daemon degrades to CPU-only operation.
//! Tests use `StaticProbe` to script device health over time.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

use adaptive_runner_domain::entities::DeviceReport;
use adaptive_runner_domain::error::RunnerError;
use adaptive_runner_domain::services::DeviceProbe;

/// Environment variable naming the GPU inventory file
pub const GPU_INVENTORY_ENV: &str = "ADARUN_GPU_INVENTORY";

#[derive(Debug, Deserialize)]
struct InventoryFile {
    devices: Vec<InventoryDevice>,
}

#[derive(Debug, Deserialize)]
struct InventoryDevice {
    uuid: String,
    name: String,
    #[serde(default)]
    memtot: u64,
    #[serde(default)]
    memfree: u64,
    #[serde(default)]
    eccfailure: Option<String>,
}

/// Probe backed by a JSON inventory file re-read on every call, so
/// externally injected ECC failures become visible to the monitor
pub struct InventoryFileProbe {
    path: PathBuf,
}

impl InventoryFileProbe {
    /// Creates a probe reading the given inventory file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DeviceProbe for InventoryFileProbe {
    fn probe(&self) -> Result<Vec<DeviceReport>, RunnerError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            RunnerError::io_error(format!(
                "could not read gpu inventory {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let inventory: InventoryFile = serde_json::from_str(&raw).map_err(|e| {
            RunnerError::SerializationError(format!(
                "gpu inventory {} is malformed: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(inventory
            .devices
            .into_iter()
            .map(|d| DeviceReport {
                uuid: d.uuid,
                name: d.name,
                mem_total: d.memtot,
                mem_free: if d.memfree == 0 { d.memtot } else { d.memfree },
                ecc_failure: d.eccfailure,
            })
            .collect())
    }
}

/// Probe for hosts without GPU hardware
pub struct EmptyProbe;

impl DeviceProbe for EmptyProbe {
    fn probe(&self) -> Result<Vec<DeviceReport>, RunnerError> {
        Ok(Vec::new())
    }
}

/// Scriptable probe for tests: reports whatever was last stored
#[derive(Clone, Default)]
pub struct StaticProbe {
    reports: Arc<Mutex<Vec<DeviceReport>>>,
}

impl StaticProbe {
    /// Creates a probe preloaded with reports
    pub fn new(reports: Vec<DeviceReport>) -> Self {
        Self {
            reports: Arc::new(Mutex::new(reports)),
        }
    }

    /// Replaces the reports the next probe call will return
    pub fn set_reports(&self, reports: Vec<DeviceReport>) {
        *self.reports.lock() = reports;
    }
}

impl DeviceProbe for StaticProbe {
    fn probe(&self) -> Result<Vec<DeviceReport>, RunnerError> {
        Ok(self.reports.lock().clone())
    }
}

/// Chooses the platform probe: the inventory file when configured,
/// otherwise the empty probe
pub fn detect_probe() -> Box<dyn DeviceProbe> {
    match std::env::var(GPU_INVENTORY_ENV) {
        Ok(path) if !path.is_empty() => Box::new(InventoryFileProbe::new(path)),
        _ => Box::new(EmptyProbe),
    }
}
