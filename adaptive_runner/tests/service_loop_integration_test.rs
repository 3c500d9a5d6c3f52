// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Service loop integration test: credential emissions drive the
//! service loop, the service loop spawns and cancels real supervisors
//! over the in-memory broker, and admitted work flows through the
//! resource gate to an executor. No network, no GPUs, real control
//! flow.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::mpsc;

use adaptive_runner::application::services::{
    ProjectSupervisor, ServiceLoop, SupervisorContext, SupervisorSpawner,
};
use adaptive_runner::infrastructure::adapters::MemoryBroker;
use adaptive_runner::infrastructure::gpu::GpuAllocator;
use adaptive_runner::infrastructure::metrics::MetricsService;
use adaptive_runner::infrastructure::runtime::lifecycle::LifecycleController;
use adaptive_runner::infrastructure::runtime::resource_gate::ResourceGate;
use adaptive_runner::infrastructure::runtime::supervision::spawn_supervised;
use adaptive_runner_bootstrap::shutdown::CancellationToken;
use adaptive_runner_domain::entities::{ExperimentRequest, Project};
use adaptive_runner_domain::services::{TaskDisposition, TaskExecutor};
use adaptive_runner_domain::value_objects::QueueTransport;

/// Executor that records how many runs completed
struct CountingExecutor {
    completed: AtomicU64,
}

#[async_trait]
impl TaskExecutor for CountingExecutor {
    async fn run(
        &self,
        _request: &ExperimentRequest,
        _env: &BTreeMap<String, String>,
    ) -> TaskDisposition {
        self.completed.fetch_add(1, Ordering::SeqCst);
        TaskDisposition::Success
    }
}

/// Spawner wiring real supervisors onto one shared in-memory broker
struct TestSpawner {
    broker: Arc<MemoryBroker>,
    gate: Arc<ResourceGate>,
    executor: Arc<CountingExecutor>,
    lifecycle: LifecycleController,
    metrics: MetricsService,
    events: mpsc::Sender<adaptive_runner_domain::events::RunnerEvent>,
}

impl SupervisorSpawner for TestSpawner {
    fn spawn(
        &self,
        project: Project,
        token: CancellationToken,
    ) -> Result<(), adaptive_runner_domain::error::RunnerError> {
        let ctx = SupervisorContext {
            broker: self.broker.clone(),
            gate: Arc::clone(&self.gate),
            executor: self.executor.clone(),
            lifecycle: self.lifecycle.subscribe(),
            metrics: self.metrics.clone(),
            events: self.events.clone(),
            host: "test-host".to_string(),
            matcher: Some(Regex::new("^rmq_.*$").unwrap()),
            mismatcher: None,
            baseline: Duration::from_millis(20),
            deadline: Duration::from_secs(1),
            backoff_cap: Duration::from_millis(200),
        };
        spawn_supervised(
            "project-supervisor",
            ProjectSupervisor::new(project, ctx).run(token),
        );
        Ok(())
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

fn project_set(names: &[&str]) -> HashMap<String, String> {
    names
        .iter()
        .map(|n| (n.to_string(), String::new()))
        .collect()
}

#[tokio::test]
async fn test_credential_driven_supervision_lifecycle() {
    let broker = Arc::new(MemoryBroker::new("memory"));
    let executor = Arc::new(CountingExecutor {
        completed: AtomicU64::new(0),
    });
    let metrics = MetricsService::new().unwrap();
    let gate = ResourceGate::new(4, 1_000_000, 1_000_000, Arc::new(GpuAllocator::with_devices([])));
    let lifecycle = LifecycleController::new();
    let (events_tx, mut events_rx) = mpsc::channel(64);
    tokio::spawn(async move { while events_rx.recv().await.is_some() {} });

    let spawner = Arc::new(TestSpawner {
        broker: broker.clone(),
        gate,
        executor: executor.clone(),
        lifecycle,
        metrics: metrics.clone(),
        events: events_tx.clone(),
    });

    let service = Arc::new(ServiceLoop::new(spawner, metrics.clone(), "test-host"));
    let root = CancellationToken::new();
    let (ticks_tx, ticks_rx) = mpsc::channel(8);

    let service_clone = Arc::clone(&service);
    let service_token = root.child();
    let service_handle = tokio::spawn(async move {
        service_clone.run(ticks_rx, events_tx, service_token).await;
    });

    // Work is queued before the project exists; it must be picked up as
    // soon as credentials appear.
    broker.push(
        "rmq_jobs",
        br#"{"experiment": {"key": "exp-1"}, "resources": {"cpus": 1}}"#.to_vec(),
    );

    ticks_tx
        .send((QueueTransport::Amqp, project_set(&["memory"])))
        .await
        .unwrap();

    let executor_probe = executor.clone();
    wait_until(|| executor_probe.completed.load(Ordering::SeqCst) == 1).await;
    let broker_probe = broker.clone();
    wait_until(|| broker_probe.ack_count() == 1).await;
    assert_eq!(service.live_count(), 1);

    // Emitting the same set again changes nothing.
    ticks_tx
        .send((QueueTransport::Amqp, project_set(&["memory"])))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(service.live_count(), 1);

    // Credentials disappear: the supervisor is cancelled and stops
    // pulling even though work remains queued.
    ticks_tx
        .send((QueueTransport::Amqp, project_set(&[])))
        .await
        .unwrap();
    let service_probe = Arc::clone(&service);
    wait_until(move || service_probe.live_count() == 0).await;

    tokio::time::sleep(Duration::from_millis(60)).await;
    let pulls_after_removal = broker.pull_count();
    broker.push(
        "rmq_jobs",
        br#"{"experiment": {"key": "exp-2"}, "resources": {"cpus": 1}}"#.to_vec(),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(broker.pull_count(), pulls_after_removal);
    assert_eq!(executor.completed.load(Ordering::SeqCst), 1);

    // Shutdown is clean.
    root.cancel();
    drop(ticks_tx);
    service_handle.await.unwrap();
}
