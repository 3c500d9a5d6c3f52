// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service Implementation
//!
//! Prometheus-based metrics for runner observability: lifecycle skips
//! (the `queue_ignored` counter), GPU inventory gauges, live project and
//! task counts. Thread-safe, clone-cheap, and registered against a
//! private registry so tests can construct as many instances as they
//! like.

use std::sync::Arc;

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use tracing::debug;

use adaptive_runner_domain::error::RunnerError;

use crate::infrastructure::gpu::GpuAllocator;

/// Prometheus metrics service for the runner daemon
#[derive(Clone)]
pub struct MetricsService {
    registry: Arc<Registry>,

    // Lifecycle metrics
    queue_ignored: IntCounterVec,

    // GPU inventory gauges
    gpu_slots_total: IntGauge,
    gpu_slots_free: IntGauge,
    gpu_largest_free_mem: IntGauge,

    // Work accounting
    projects_active: IntGauge,
    tasks_started_total: IntCounter,
    tasks_completed_total: IntCounter,
    tasks_failed_total: IntCounter,
    tasks_requeued_total: IntCounter,
}

impl MetricsService {
    /// Create a new MetricsService with a private Prometheus registry
    pub fn new() -> Result<Self, RunnerError> {
        let registry = Registry::new();

        let queue_ignored = IntCounterVec::new(
            Opts::new(
                "queue_ignored",
                "Number of queue polls skipped because the lifecycle state disallows new work",
            ),
            &["host", "transport", "queue"],
        )
        .map_err(|e| RunnerError::metrics_error(format!("Failed to create queue_ignored metric: {}", e)))?;

        let gpu_slots_total = IntGauge::with_opts(
            Opts::new("gpu_slots_total", "Total GPU slots in the inventory").namespace("runner"),
        )
        .map_err(|e| RunnerError::metrics_error(format!("Failed to create gpu_slots_total metric: {}", e)))?;

        let gpu_slots_free = IntGauge::with_opts(
            Opts::new("gpu_slots_free", "GPU slots not granted to any task").namespace("runner"),
        )
        .map_err(|e| RunnerError::metrics_error(format!("Failed to create gpu_slots_free metric: {}", e)))?;

        let gpu_largest_free_mem = IntGauge::with_opts(
            Opts::new(
                "gpu_largest_free_mem_bytes",
                "Largest free memory on any single usable GPU",
            )
            .namespace("runner"),
        )
        .map_err(|e| {
            RunnerError::metrics_error(format!("Failed to create gpu_largest_free_mem metric: {}", e))
        })?;

        let projects_active = IntGauge::with_opts(
            Opts::new("projects_active", "Live projects with a running supervisor")
                .namespace("runner"),
        )
        .map_err(|e| RunnerError::metrics_error(format!("Failed to create projects_active metric: {}", e)))?;

        let tasks_started_total = IntCounter::with_opts(
            Opts::new("tasks_started_total", "Tasks admitted and handed to the executor")
                .namespace("runner"),
        )
        .map_err(|e| RunnerError::metrics_error(format!("Failed to create tasks_started_total metric: {}", e)))?;

        let tasks_completed_total = IntCounter::with_opts(
            Opts::new("tasks_completed_total", "Tasks that ran to successful completion")
                .namespace("runner"),
        )
        .map_err(|e| {
            RunnerError::metrics_error(format!("Failed to create tasks_completed_total metric: {}", e))
        })?;

        let tasks_failed_total = IntCounter::with_opts(
            Opts::new("tasks_failed_total", "Tasks acknowledged with a failure report")
                .namespace("runner"),
        )
        .map_err(|e| RunnerError::metrics_error(format!("Failed to create tasks_failed_total metric: {}", e)))?;

        let tasks_requeued_total = IntCounter::with_opts(
            Opts::new("tasks_requeued_total", "Messages returned to their queue")
                .namespace("runner"),
        )
        .map_err(|e| {
            RunnerError::metrics_error(format!("Failed to create tasks_requeued_total metric: {}", e))
        })?;

        registry
            .register(Box::new(queue_ignored.clone()))
            .map_err(|e| RunnerError::metrics_error(format!("Failed to register queue_ignored: {}", e)))?;
        registry
            .register(Box::new(gpu_slots_total.clone()))
            .map_err(|e| RunnerError::metrics_error(format!("Failed to register gpu_slots_total: {}", e)))?;
        registry
            .register(Box::new(gpu_slots_free.clone()))
            .map_err(|e| RunnerError::metrics_error(format!("Failed to register gpu_slots_free: {}", e)))?;
        registry
            .register(Box::new(gpu_largest_free_mem.clone()))
            .map_err(|e| {
                RunnerError::metrics_error(format!("Failed to register gpu_largest_free_mem: {}", e))
            })?;
        registry
            .register(Box::new(projects_active.clone()))
            .map_err(|e| RunnerError::metrics_error(format!("Failed to register projects_active: {}", e)))?;
        registry
            .register(Box::new(tasks_started_total.clone()))
            .map_err(|e| RunnerError::metrics_error(format!("Failed to register tasks_started_total: {}", e)))?;
        registry
            .register(Box::new(tasks_completed_total.clone()))
            .map_err(|e| {
                RunnerError::metrics_error(format!("Failed to register tasks_completed_total: {}", e))
            })?;
        registry
            .register(Box::new(tasks_failed_total.clone()))
            .map_err(|e| RunnerError::metrics_error(format!("Failed to register tasks_failed_total: {}", e)))?;
        registry
            .register(Box::new(tasks_requeued_total.clone()))
            .map_err(|e| {
                RunnerError::metrics_error(format!("Failed to register tasks_requeued_total: {}", e))
            })?;

        debug!("MetricsService initialized with Prometheus registry");

        Ok(Self {
            registry: Arc::new(registry),
            queue_ignored,
            gpu_slots_total,
            gpu_slots_free,
            gpu_largest_free_mem,
            projects_active,
            tasks_started_total,
            tasks_completed_total,
            tasks_failed_total,
            tasks_requeued_total,
        })
    }

    /// Record one skipped poll for a queue held back by lifecycle state
    pub fn inc_queue_ignored(&self, host: &str, transport: &str, queue: &str) {
        self.queue_ignored
            .with_label_values(&[host, transport, queue])
            .inc();
    }

    /// Current value of the ignored counter for one queue
    pub fn queue_ignored_value(&self, host: &str, transport: &str, queue: &str) -> u64 {
        self.queue_ignored
            .with_label_values(&[host, transport, queue])
            .get()
    }

    /// Refresh the GPU gauges from the allocator
    pub fn record_gpu_inventory(&self, allocator: &GpuAllocator) {
        let (total, free) = allocator.slots();
        self.gpu_slots_total.set(total as i64);
        self.gpu_slots_free.set(free as i64);
        self.gpu_largest_free_mem
            .set(allocator.largest_free_mem() as i64);
    }

    /// A supervisor was spawned
    pub fn inc_projects(&self) {
        self.projects_active.inc();
    }

    /// A supervisor was cancelled or finished
    pub fn dec_projects(&self) {
        self.projects_active.dec();
    }

    /// A task was admitted and handed to the executor
    pub fn inc_tasks_started(&self) {
        self.tasks_started_total.inc();
    }

    /// A task completed successfully
    pub fn inc_tasks_completed(&self) {
        self.tasks_completed_total.inc();
    }

    /// A task was acknowledged with a failure report
    pub fn inc_tasks_failed(&self) {
        self.tasks_failed_total.inc();
    }

    /// A message went back to its queue
    pub fn inc_tasks_requeued(&self) {
        self.tasks_requeued_total.inc();
    }

    /// Get Prometheus metrics in text format for scraping
    pub fn render(&self) -> Result<String, RunnerError> {
        let encoder = prometheus::TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .map_err(|e| RunnerError::metrics_error(format!("Failed to encode metrics: {}", e)))
    }

    /// The underlying registry for advanced usage
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_runner_domain::entities::gpu_device::GpuDevice;
    use std::collections::HashSet;

    #[test]
    fn test_service_creation() {
        let service = MetricsService::new().unwrap();
        let rendered = service.render().unwrap();
        assert!(rendered.contains("runner_gpu_slots_total"));
    }

    #[test]
    fn test_queue_ignored_accumulates() {
        let service = MetricsService::new().unwrap();
        service.inc_queue_ignored("node-1", "rabbitMQ", "rmq_a");
        service.inc_queue_ignored("node-1", "rabbitMQ", "rmq_a");
        service.inc_queue_ignored("node-1", "rabbitMQ", "rmq_b");
        assert_eq!(service.queue_ignored_value("node-1", "rabbitMQ", "rmq_a"), 2);
        assert_eq!(service.queue_ignored_value("node-1", "rabbitMQ", "rmq_b"), 1);
    }

    #[test]
    fn test_gpu_gauges_follow_allocator() {
        let service = MetricsService::new().unwrap();
        let allocator = GpuAllocator::with_devices([GpuDevice {
            uuid: "card-0".to_string(),
            name: "test".to_string(),
            slots_total: 4,
            mem_total: 1_000,
            slots_free: 4,
            mem_free: 1_000,
            ecc_failure: None,
            tracking: HashSet::new(),
        }]);

        service.record_gpu_inventory(&allocator);
        let rendered = service.render().unwrap();
        assert!(rendered.contains("runner_gpu_slots_total 4"));
        assert!(rendered.contains("runner_gpu_slots_free 4"));
        assert!(rendered.contains("runner_gpu_largest_free_mem_bytes 1000"));
    }
}
