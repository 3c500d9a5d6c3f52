// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # GPU Device Entity
//!
//! One record per physical GPU discovered at startup. A device carries its
//! slot and memory inventory plus the tracking set of outstanding
//! allocation ids, so that releases can be validated against what was
//! actually granted.
//!
//! ## Slots
//!
//! A slot is an abstract quantum of GPU capacity derived from the device
//! model name. Larger data-centre cards expose more slots:
//!
//! | Model family | Slots |
//! |---|---|
//! | Tesla V100 | 16 |
//! | Tesla P100 | 8 |
//! | Tesla P40 | 4 |
//! | Tesla K80, TITAN X, GTX 10xx, RTX 2080 Ti | 2 |
//! | unrecognised | 0 (device is unusable, reported once) |
//!
//! ## Invariants
//!
//! - `0 <= slots_free <= slots_total`, same for memory
//! - every allocation id in `tracking` has already been subtracted from
//!   the free counters
//! - a device with a recorded ECC failure keeps its inventory but is
//!   excluded from new allocations

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::RunnerError;

/// Derives the logical slot count for a device model name.
///
/// Returns zero for models the runner does not recognise; callers are
/// expected to surface a warning in that case.
pub fn slots_for_model(name: &str) -> u32 {
    if name.contains("Tesla V100") {
        16
    } else if name.contains("Tesla P100") {
        8
    } else if name.contains("Tesla P40") {
        4
    } else if name.contains("Tesla K80")
        || name.contains("TITAN X")
        || name.contains("RTX 2080 Ti")
        || name.contains("GTX 1050")
        || name.contains("GTX 1060")
        || name.contains("GTX 1070")
        || name.contains("GTX 1080")
    {
        2
    } else {
        0
    }
}

/// Raw device health as reported by the platform probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReport {
    /// Opaque device identifier
    pub uuid: String,
    /// Model string, used to derive the slot count
    pub name: String,
    /// Total device memory in bytes
    pub mem_total: u64,
    /// Free device memory in bytes at probe time
    pub mem_free: u64,
    /// Error text when the device reported an ECC failure
    pub ecc_failure: Option<String>,
}

/// Tracked inventory for one GPU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuDevice {
    /// Opaque device identifier, primary key within the inventory
    pub uuid: String,
    /// Model string the slot count was derived from
    pub name: String,
    /// Logical slot capacity of the device
    pub slots_total: u32,
    /// Memory capacity in bytes
    pub mem_total: u64,
    /// Slots not currently granted to an allocation
    pub slots_free: u32,
    /// Memory not currently granted to an allocation
    pub mem_free: u64,
    /// Recorded hardware fault; when set the device takes no new work
    pub ecc_failure: Option<RunnerError>,
    /// Outstanding allocation ids on this device
    pub tracking: HashSet<String>,
}

impl GpuDevice {
    /// Builds a fully-free device from a platform report.
    ///
    /// The free memory figure from the report becomes the device's working
    /// capacity: memory other processes already hold is never handed out.
    pub fn from_report(report: &DeviceReport) -> Self {
        let slots = slots_for_model(&report.name);
        Self {
            uuid: report.uuid.clone(),
            name: report.name.clone(),
            slots_total: slots,
            mem_total: report.mem_free,
            slots_free: slots,
            mem_free: report.mem_free,
            ecc_failure: report
                .ecc_failure
                .as_ref()
                .map(|msg| RunnerError::hardware_fault(msg.clone())),
            tracking: HashSet::new(),
        }
    }

    /// Whether the device can participate in new allocations
    pub fn is_usable(&self) -> bool {
        self.ecc_failure.is_none() && self.slots_total > 0
    }
}

/// A grant of `(device, slots, memory)` held by one in-flight task.
///
/// The environment map carries everything a child process needs to confine
/// itself to the granted device, at minimum `CUDA_VISIBLE_DEVICES`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuAllocation {
    /// Fresh unique id minted at grant time, member of the device's
    /// tracking set until released
    pub id: String,
    /// Device the grant was made against
    pub device_uuid: String,
    /// Slots granted on that device
    pub slots: u32,
    /// Memory in bytes granted on that device
    pub mem: u64,
    /// Environment variables for the child process
    pub env: std::collections::BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_table() {
        assert_eq!(slots_for_model("Tesla V100-SXM2-16GB"), 16);
        assert_eq!(slots_for_model("Tesla P100-PCIE-16GB"), 8);
        assert_eq!(slots_for_model("Tesla P40"), 4);
        assert_eq!(slots_for_model("Tesla K80"), 2);
        assert_eq!(slots_for_model("GeForce GTX 1080 Ti"), 2);
        assert_eq!(slots_for_model("HAL 9000"), 0);
    }

    #[test]
    fn test_from_report_uses_free_memory() {
        let report = DeviceReport {
            uuid: "GPU-1".to_string(),
            name: "Tesla P40".to_string(),
            mem_total: 24_000_000_000,
            mem_free: 20_000_000_000,
            ecc_failure: None,
        };
        let device = GpuDevice::from_report(&report);
        assert_eq!(device.slots_total, 4);
        assert_eq!(device.slots_free, 4);
        assert_eq!(device.mem_total, 20_000_000_000);
        assert_eq!(device.mem_free, 20_000_000_000);
        assert!(device.is_usable());
    }

    #[test]
    fn test_ecc_failure_makes_device_unusable() {
        let report = DeviceReport {
            uuid: "GPU-2".to_string(),
            name: "Tesla V100".to_string(),
            mem_total: 16,
            mem_free: 16,
            ecc_failure: Some("double bit ecc error".to_string()),
        };
        let device = GpuDevice::from_report(&report);
        assert!(!device.is_usable());
        assert_eq!(device.slots_total, 16);
    }

    #[test]
    fn test_unrecognised_model_is_unusable() {
        let report = DeviceReport {
            uuid: "GPU-3".to_string(),
            name: "Experimental TPU".to_string(),
            mem_total: 8,
            mem_free: 8,
            ecc_failure: None,
        };
        assert!(!GpuDevice::from_report(&report).is_usable());
    }
}
