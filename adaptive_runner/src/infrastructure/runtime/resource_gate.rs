// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Gate
//!
//! Admits a task atomically against four budgets: CPU cores, RAM, disk
//! and GPUs. The non-GPU budgets are plain counters behind one mutex; the
//! GPU budget delegates to the allocator. Admission is all-or-nothing -
//! when any budget refuses, everything taken earlier in the attempt is
//! rolled back before the rejection is returned.
//!
//! ## Leases
//!
//! A successful admission yields an [`AdmissionHandle`] that returns every
//! held budget when dropped. The supervisor moves the handle into the
//! executor task so the resources live exactly as long as the work,
//! including on cancellation paths.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use adaptive_runner_domain::entities::GpuAllocation;
use adaptive_runner_domain::error::RunnerError;
use adaptive_runner_domain::value_objects::ResourceDemand;

use crate::infrastructure::gpu::GpuAllocator;

/// Why an admission was refused, with the unmet amount
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionReject {
    /// Not enough CPU cores; carries how many were missing
    NoCpu { wanted: u32, missing: u32 },
    /// Not enough RAM; carries the missing byte count
    NoMem { wanted: u64, missing: u64 },
    /// Not enough disk; carries the missing byte count
    NoDisk { wanted: u64, missing: u64 },
    /// The GPU allocator refused
    NoGpu { cause: String },
}

impl AdmissionReject {
    /// Folds the rejection into the domain error taxonomy
    pub fn into_error(self) -> RunnerError {
        match &self {
            AdmissionReject::NoGpu { cause } => RunnerError::insufficient_gpu(cause.clone()),
            _ => RunnerError::resource_exhausted(self.to_string()),
        }
    }
}

impl fmt::Display for AdmissionReject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionReject::NoCpu { wanted, missing } => {
                write!(f, "insufficient cpu: wanted {} cores, {} short", wanted, missing)
            }
            AdmissionReject::NoMem { wanted, missing } => {
                write!(f, "insufficient memory: wanted {} bytes, {} short", wanted, missing)
            }
            AdmissionReject::NoDisk { wanted, missing } => {
                write!(f, "insufficient disk: wanted {} bytes, {} short", wanted, missing)
            }
            AdmissionReject::NoGpu { cause } => write!(f, "insufficient gpu: {}", cause),
        }
    }
}

struct Budgets {
    cores_free: u32,
    mem_free: u64,
    disk_free: u64,
}

struct GateInner {
    budgets: Mutex<Budgets>,
    cores_total: u32,
    mem_total: u64,
    disk_total: u64,
    gpus: Arc<GpuAllocator>,
}

impl GateInner {
    fn give_back(&self, cpus: u32, ram: u64, hdd: u64, gpu_allocs: &[GpuAllocation]) {
        {
            let mut budgets = self.budgets.lock();
            budgets.cores_free = (budgets.cores_free + cpus).min(self.cores_total);
            budgets.mem_free = (budgets.mem_free + ram).min(self.mem_total);
            budgets.disk_free = (budgets.disk_free + hdd).min(self.disk_total);
        }
        for alloc in gpu_allocs {
            if let Err(e) = self.gpus.release(alloc) {
                // An accounting violation is survivable; it is logged and
                // the remaining allocations still go back.
                error!(error = %e, allocation = %alloc.id, "gpu release failed");
            }
        }
    }
}

/// Atomic admission over the machine's budgets
pub struct ResourceGate {
    inner: Arc<GateInner>,
}

impl ResourceGate {
    /// Creates a gate over the given budgets and GPU inventory
    pub fn new(cores: u32, mem: u64, disk: u64, gpus: Arc<GpuAllocator>) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(GateInner {
                budgets: Mutex::new(Budgets {
                    cores_free: cores,
                    mem_free: mem,
                    disk_free: disk,
                }),
                cores_total: cores,
                mem_total: mem,
                disk_total: disk,
                gpus,
            }),
        })
    }

    /// Attempts to admit a task. All four budgets are taken together or
    /// not at all.
    pub fn try_admit(&self, demand: &ResourceDemand) -> Result<AdmissionHandle, AdmissionReject> {
        {
            let mut budgets = self.inner.budgets.lock();

            if budgets.cores_free < demand.cpus {
                return Err(AdmissionReject::NoCpu {
                    wanted: demand.cpus,
                    missing: demand.cpus - budgets.cores_free,
                });
            }
            if budgets.mem_free < demand.ram {
                return Err(AdmissionReject::NoMem {
                    wanted: demand.ram,
                    missing: demand.ram - budgets.mem_free,
                });
            }
            if budgets.disk_free < demand.hdd {
                return Err(AdmissionReject::NoDisk {
                    wanted: demand.hdd,
                    missing: demand.hdd - budgets.disk_free,
                });
            }

            budgets.cores_free -= demand.cpus;
            budgets.mem_free -= demand.ram;
            budgets.disk_free -= demand.hdd;
        }

        // GPU last: a refusal there must give back the counters taken
        // above.
        let gpu_allocs = if demand.wants_gpu() {
            match self
                .inner
                .gpus
                .allocate(demand.gpus, demand.gpu_mem, &[], demand.gpu_count, true)
            {
                Ok(allocs) => allocs,
                Err(e) => {
                    self.inner.give_back(demand.cpus, demand.ram, demand.hdd, &[]);
                    return Err(AdmissionReject::NoGpu {
                        cause: e.to_string(),
                    });
                }
            }
        } else {
            Vec::new()
        };

        debug!(
            cpus = demand.cpus,
            ram = demand.ram,
            hdd = demand.hdd,
            gpu_devices = gpu_allocs.len(),
            "task admitted"
        );

        Ok(AdmissionHandle {
            gate: Arc::clone(&self.inner),
            cpus: demand.cpus,
            ram: demand.ram,
            hdd: demand.hdd,
            gpu_allocs,
            released: false,
        })
    }

    /// Releases a handle explicitly. Equivalent to dropping it.
    pub fn release(&self, handle: AdmissionHandle) {
        drop(handle);
    }

    /// Free core count right now
    pub fn cores_free(&self) -> u32 {
        self.inner.budgets.lock().cores_free
    }

    /// Free memory in bytes right now
    pub fn mem_free(&self) -> u64 {
        self.inner.budgets.lock().mem_free
    }

    /// Free disk in bytes right now
    pub fn disk_free(&self) -> u64 {
        self.inner.budgets.lock().disk_free
    }

    /// The GPU inventory behind this gate
    pub fn gpu_allocator(&self) -> &Arc<GpuAllocator> {
        &self.inner.gpus
    }
}

/// Budgets held by one admitted task, returned on drop
pub struct AdmissionHandle {
    gate: Arc<GateInner>,
    cpus: u32,
    ram: u64,
    hdd: u64,
    gpu_allocs: Vec<GpuAllocation>,
    released: bool,
}

impl AdmissionHandle {
    /// The process environment implied by the GPU grant: all granted
    /// device UUIDs joined for `CUDA_VISIBLE_DEVICES`
    pub fn env(&self) -> std::collections::BTreeMap<String, String> {
        let mut env = std::collections::BTreeMap::new();
        if !self.gpu_allocs.is_empty() {
            let devices: Vec<&str> = self
                .gpu_allocs
                .iter()
                .map(|a| a.device_uuid.as_str())
                .collect();
            env.insert("CUDA_VISIBLE_DEVICES".to_string(), devices.join(","));
        }
        env
    }

    /// The GPU allocations held by this admission
    pub fn gpu_allocations(&self) -> &[GpuAllocation] {
        &self.gpu_allocs
    }
}

impl Drop for AdmissionHandle {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.gate
                .give_back(self.cpus, self.ram, self.hdd, &self.gpu_allocs);
        }
    }
}
