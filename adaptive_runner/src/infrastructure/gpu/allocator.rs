// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # GPU Allocator
//!
//! The process-wide GPU inventory and its slot+memory bin-packing
//! reservation engine. One instance exists per daemon; tests construct
//! their own instances from synthetic devices.
//!
//! ## Allocation Model
//!
//! Capacity is expressed in **slots** derived from the device model (a
//! V100 is sixteen slots, a P100 eight, and so on). A request asks for a
//! total slot count, a per-device memory grant, the set of per-device slot
//! sizes it can work with, and the minimum number of devices the grant
//! must span.
//!
//! The allocator never splits a card between experiments: a chosen card
//! contributes all the slots the request can use from it, and a request
//! with `max_mem == 0` takes the card whole.
//!
//! ## Selection
//!
//! Eligible cards (no ECC fault, `slots_total` in the permitted units) are
//! sorted ascending by free slots, tie-broken by UUID. For every start
//! position in that order a greedy run builds one candidate combination;
//! the combination with the least slot waste wins, then the one touching
//! the fewest cards, then the earliest generated. Sorting small-free-first
//! keeps fragmentation down and makes the whole procedure deterministic
//! and reproducible.
//!
//! ## Concurrency
//!
//! A single mutex covers the whole inventory. Operations are short and
//! linearizable; aggregate readers take the same lock and return copies.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::{debug, warn};

use adaptive_runner_domain::entities::gpu_device::{GpuAllocation, GpuDevice};
use adaptive_runner_domain::error::RunnerError;
use adaptive_runner_domain::services::DeviceProbe;

/// The allocations granted to one request, one entry per device
pub type GpuAllocations = Vec<GpuAllocation>;

/// Builds the default unit-of-allocation set: the even slot counts from 2
/// up to `end`, with the starting value always included.
fn evens(start: u32, end: u32) -> Vec<u32> {
    let mut result = vec![start];
    let mut cur = start + 1;
    while cur < end + 1 {
        if cur % 2 == 0 {
            result.push(cur);
            cur += 2;
        } else {
            cur += 1;
        }
    }
    result
}

/// Process-wide GPU inventory with atomic reserve/release
pub struct GpuAllocator {
    devices: Mutex<BTreeMap<String, GpuDevice>>,
}

impl GpuAllocator {
    /// Builds the inventory from a platform probe, honouring a visible
    /// device filter.
    ///
    /// The filter is a comma-separated list of device UUIDs (the literal
    /// `all`, or an empty string, selects every discovered device). Index
    /// entries are accepted with a one-shot warning. Devices excluded by
    /// the filter are skipped; devices with an unrecognised model keep an
    /// inventory entry with zero slots and produce a warning.
    ///
    /// Returns the allocator plus the warnings gathered during discovery,
    /// which the caller forwards to the reporting channel.
    pub fn from_probe(
        probe: &dyn DeviceProbe,
        visible_devices: &str,
    ) -> Result<(Self, Vec<RunnerError>), RunnerError> {
        let reports = probe.probe()?;
        let mut warnings = Vec::new();

        let filter = visible_devices.trim();
        let mut selected: Vec<String> = Vec::new();
        if !filter.is_empty() && filter != "all" {
            let mut warned_indexes = false;
            for entry in filter.split(',') {
                let entry = entry.trim();
                if entry.is_empty() {
                    continue;
                }
                if let Ok(index) = entry.parse::<usize>() {
                    if !warned_indexes {
                        warned_indexes = true;
                        warnings.push(RunnerError::invalid_config(
                            "visible devices should be using UUIDs not indexes",
                        ));
                    }
                    match reports.get(index) {
                        Some(report) => selected.push(report.uuid.clone()),
                        None => warnings.push(RunnerError::invalid_config(format!(
                            "visible devices contained an index past the known population of GPU cards: {}",
                            index
                        ))),
                    }
                } else {
                    selected.push(entry.to_string());
                }
            }
        }

        let mut devices = BTreeMap::new();
        for report in &reports {
            if !selected.is_empty() && !selected.iter().any(|uuid| uuid == &report.uuid) {
                debug!(uuid = %report.uuid, "gpu skipped by visible device filter");
                continue;
            }
            let device = GpuDevice::from_report(report);
            if device.slots_total == 0 {
                warnings.push(RunnerError::invalid_config(format!(
                    "unrecognized gpu device {} ({})",
                    report.name, report.uuid
                )));
            }
            devices.insert(device.uuid.clone(), device);
        }

        Ok((
            Self {
                devices: Mutex::new(devices),
            },
            warnings,
        ))
    }

    /// Builds an allocator directly from devices. Test constructor.
    pub fn with_devices(devices: impl IntoIterator<Item = GpuDevice>) -> Self {
        Self {
            devices: Mutex::new(
                devices
                    .into_iter()
                    .map(|d| (d.uuid.clone(), d))
                    .collect(),
            ),
        }
    }

    /// Attempts to reserve `max_slots` slots spread over at least
    /// `device_floor` devices, granting `max_mem` bytes on each
    /// participating device.
    ///
    /// `units_of_allocation` is the set of per-device slot sizes the
    /// caller accepts; a device is eligible only if its total slot count
    /// is a member. An empty set defaults to the even sizes from 2 up to
    /// `2 * (max_slots + 1)`.
    ///
    /// With `live == false` the call is a pure feasibility query: success
    /// returns an empty list and no state changes; failure returns exactly
    /// the error the live call would.
    ///
    /// A request of zero slots and zero memory is the empty allocation and
    /// always succeeds.
    pub fn allocate(
        &self,
        max_slots: u32,
        max_mem: u64,
        units_of_allocation: &[u32],
        device_floor: u32,
        live: bool,
    ) -> Result<GpuAllocations, RunnerError> {
        if max_slots == 0 && max_mem == 0 {
            return Ok(Vec::new());
        }

        let mut units: Vec<u32> = if units_of_allocation.is_empty() {
            evens(2, (max_slots + 1) * 2)
        } else {
            units_of_allocation.to_vec()
        };
        units.sort_unstable();

        let floor = device_floor.max(1) as usize;

        let mut devices = self.devices.lock();

        // Cards that are whole, healthy and of a permitted size, ordered
        // smallest free count first so concentration falls out of the
        // waste comparison.
        let mut eligible: Vec<(String, u32)> = devices
            .values()
            .filter(|d| d.ecc_failure.is_none())
            .filter(|d| units.binary_search(&d.slots_total).is_ok())
            .map(|d| (d.uuid.clone(), d.slots_free))
            .collect();

        if eligible.is_empty() {
            return Err(RunnerError::insufficient_gpu(format!(
                "insufficient free GPUs (want {} slots in units {:?})",
                max_slots, units
            )));
        }

        eligible.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        struct Combination {
            cards: Vec<String>,
            waste: u64,
        }

        let mut combinations: Vec<Combination> = Vec::new();
        for start in 0..eligible.len() {
            let mut cards = Vec::new();
            let mut slots_found: u64 = 0;
            for (uuid, free) in &eligible[start..] {
                cards.push(uuid.clone());
                slots_found += u64::from(*free);
                if slots_found >= u64::from(max_slots) && cards.len() >= floor {
                    break;
                }
            }
            if slots_found >= u64::from(max_slots) && cards.len() >= floor {
                combinations.push(Combination {
                    cards,
                    waste: slots_found - u64::from(max_slots),
                });
            }
        }

        if combinations.is_empty() {
            return Err(RunnerError::insufficient_gpu(format!(
                "insufficient GPU (want {} slots over at least {} devices)",
                max_slots, floor
            )));
        }

        // Least waste first, then fewest cards; stable sorts keep the
        // earliest-generated combination ahead on full ties.
        combinations.sort_by_key(|c| c.waste);
        let min_waste = combinations[0].waste;
        combinations.retain(|c| c.waste == min_waste);
        combinations.sort_by_key(|c| c.cards.len());
        let chosen = &combinations[0];

        if !live {
            return Ok(Vec::new());
        }

        let mut granted = Vec::with_capacity(chosen.cards.len());
        for uuid in &chosen.cards {
            let device = match devices.get_mut(uuid) {
                Some(device) => device,
                None => {
                    return Err(RunnerError::UnknownDevice(uuid.clone()));
                }
            };

            let (slots, mem) = if max_mem == 0 {
                // The caller does not know its footprint: take the card
                // whole.
                (device.slots_free, device.mem_free)
            } else {
                (max_slots.min(device.slots_free), max_mem.min(device.mem_free))
            };

            device.slots_free -= slots;
            device.mem_free -= mem;

            let id = uuid::Uuid::new_v4().to_string();
            device.tracking.insert(id.clone());

            let mut env = std::collections::BTreeMap::new();
            env.insert("CUDA_VISIBLE_DEVICES".to_string(), uuid.clone());

            granted.push(GpuAllocation {
                id,
                device_uuid: uuid.clone(),
                slots,
                mem,
                env,
            });
        }

        Ok(granted)
    }

    /// Returns a previously granted allocation to the inventory.
    ///
    /// Fails with `UnknownDevice` when the device has left the inventory
    /// and `UnknownAllocation` when the id is not in the device's tracking
    /// set - a double release lands here.
    pub fn release(&self, allocation: &GpuAllocation) -> Result<(), RunnerError> {
        if allocation.slots == 0 && allocation.mem == 0 {
            return Ok(());
        }

        let mut devices = self.devices.lock();

        let device = devices.get_mut(&allocation.device_uuid).ok_or_else(|| {
            RunnerError::UnknownDevice(format!(
                "device no longer in service: {}",
                allocation.device_uuid
            ))
        })?;

        if !device.tracking.remove(&allocation.id) {
            return Err(RunnerError::UnknownAllocation(format!(
                "invalid allocation: {}",
                allocation.id
            )));
        }

        device.slots_free += allocation.slots;
        device.mem_free += allocation.mem;

        Ok(())
    }

    /// Records an ECC failure on a device.
    ///
    /// Returns true only on the transition from healthy to failed, so the
    /// caller can report each fault exactly once. The inventory entry is
    /// retained.
    pub fn record_ecc_failure(&self, uuid: &str, fault: &str) -> bool {
        let mut devices = self.devices.lock();
        match devices.get_mut(uuid) {
            Some(device) if device.ecc_failure.is_none() => {
                warn!(uuid = %uuid, fault = %fault, "gpu entered ecc failure state");
                device.ecc_failure = Some(RunnerError::hardware_fault(fault.to_string()));
                true
            }
            _ => false,
        }
    }

    /// Number of devices in the inventory
    pub fn device_count(&self) -> usize {
        self.devices.lock().len()
    }

    /// Total and free slot counts across the inventory
    pub fn slots(&self) -> (u64, u64) {
        let devices = self.devices.lock();
        let mut total = 0u64;
        let mut free = 0u64;
        for device in devices.values() {
            total += u64::from(device.slots_total);
            free += u64::from(device.slots_free);
        }
        (total, free)
    }

    /// Largest free slot count on any single device
    pub fn largest_free_slots(&self) -> u32 {
        self.devices
            .lock()
            .values()
            .map(|d| d.slots_free)
            .max()
            .unwrap_or(0)
    }

    /// Largest free memory on any single usable device
    pub fn largest_free_mem(&self) -> u64 {
        self.devices
            .lock()
            .values()
            .filter(|d| d.slots_total != 0)
            .map(|d| d.mem_free)
            .max()
            .unwrap_or(0)
    }

    /// Deep copy of the inventory for reporting
    pub fn inventory(&self) -> Vec<GpuDevice> {
        self.devices.lock().values().cloned().collect()
    }
}
