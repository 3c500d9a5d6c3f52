// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Runner Daemon Entry Point
//!
//! Wires the bootstrap, domain and infrastructure layers into the
//! running daemon:
//!
//! 1. Parse flags, merge the optional config file, validate everything in
//!    one pass and exit non-zero on the first bad set.
//! 2. Discover host capacity (cores, memory, disk) and the GPU
//!    inventory.
//! 3. Start the long-lived control tasks: GPU monitor, metrics endpoint
//!    and exporter, credential watcher, service loop, signal handler.
//! 4. Wait for a signal, cancel the token tree and drain within the
//!    grace period.
//!
//! Runtime errors never terminate the process; only configuration
//! validation failures produce a non-zero exit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use regex::Regex;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use adaptive_runner::application::services::{
    ProjectSupervisor, ServiceLoop, SupervisorContext, SupervisorSpawner,
};
use adaptive_runner::infrastructure::adapters::{AmqpBroker, CloudBroker, CloudCredentialSource};
use adaptive_runner::infrastructure::config::{load_settings, FileSettings};
use adaptive_runner::infrastructure::gpu::{detect_probe, GpuAllocator, GpuMonitor};
use adaptive_runner::infrastructure::metrics::{
    run_exporter, MetricsEndpoint, MetricsService,
};
use adaptive_runner::infrastructure::runtime::lifecycle::LifecycleController;
use adaptive_runner::infrastructure::runtime::resource_gate::ResourceGate;
use adaptive_runner::infrastructure::runtime::supervision::spawn_supervised;
use adaptive_runner::infrastructure::runtime::ScriptExecutor;
use adaptive_runner::infrastructure::watch::{CredentialWatcher, ProjectSet};
use adaptive_runner_bootstrap::cli::RunnerCli;
use adaptive_runner_bootstrap::config::RunnerConfig;
use adaptive_runner_bootstrap::exit_code::ExitCode;
use adaptive_runner_bootstrap::logger::init_tracing;
use adaptive_runner_bootstrap::platform;
use adaptive_runner_bootstrap::shutdown::{CancellationToken, ShutdownCoordinator};
use adaptive_runner_bootstrap::signals::create_signal_handler;
use adaptive_runner_domain::entities::Project;
use adaptive_runner_domain::error::RunnerError;
use adaptive_runner_domain::events::RunnerEvent;
use adaptive_runner_domain::services::{QueueBroker, TaskExecutor};
use adaptive_runner_domain::value_objects::{LifecycleState, QueueTransport};

/// Builds supervisors for the transports this deployment has configured
struct DaemonSpawner {
    amqp: Option<Arc<AmqpBroker>>,
    gate: Arc<ResourceGate>,
    executor: Arc<dyn TaskExecutor>,
    lifecycle: watch::Receiver<LifecycleState>,
    metrics: MetricsService,
    events: mpsc::Sender<RunnerEvent>,
    host: String,
    matcher: Option<Regex>,
    mismatcher: Option<Regex>,
    baseline: Duration,
    deadline: Duration,
    backoff_cap: Duration,
}

impl SupervisorSpawner for DaemonSpawner {
    fn spawn(&self, project: Project, token: CancellationToken) -> Result<(), RunnerError> {
        let broker: Arc<dyn QueueBroker> = match project.id.transport {
            QueueTransport::Amqp => self
                .amqp
                .clone()
                .ok_or_else(|| RunnerError::internal_error("amqp transport is not configured"))?,
            QueueTransport::Cloud => Arc::new(CloudBroker::from_blob(&project.credential)?),
        };

        let ctx = SupervisorContext {
            broker,
            gate: Arc::clone(&self.gate),
            executor: Arc::clone(&self.executor),
            lifecycle: self.lifecycle.clone(),
            metrics: self.metrics.clone(),
            events: self.events.clone(),
            host: self.host.clone(),
            matcher: self.matcher.clone(),
            mismatcher: self.mismatcher.clone(),
            baseline: self.baseline,
            deadline: self.deadline,
            backoff_cap: self.backoff_cap,
        };

        let supervisor = ProjectSupervisor::new(project, ctx);
        spawn_supervised("project-supervisor", supervisor.run(token));
        Ok(())
    }
}

/// The AMQP transport has no credentials directory: its single project is
/// the broker itself, emitted on the watcher cadence so the service loop
/// treats both transports identically.
async fn amqp_project_source(
    identity: String,
    auth: String,
    ticks: mpsc::Sender<ProjectSet>,
    interval: Duration,
    token: CancellationToken,
) {
    let set: HashMap<String, String> = HashMap::from([(identity, auth)]);
    loop {
        if ticks
            .send((QueueTransport::Amqp, set.clone()))
            .await
            .is_err()
        {
            return;
        }
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Drains the reporting channel, logging each event exactly once
async fn watch_reporting_channel(
    mut events: mpsc::Receiver<RunnerEvent>,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => return,
            event = events.recv() => event,
        };
        let Some(event) = event else { return };
        match &event {
            RunnerEvent::DeviceFault { uuid, fault, .. } => {
                warn!(uuid = %uuid, fault = %fault, "device fault reported");
            }
            RunnerEvent::QueueScanFailed { project, error, .. } => {
                warn!(project = %project, error = %error, "queue scan failed");
            }
            _ => info!(event = ?event, "runner event"),
        }
    }
}

/// Fills flags left at their defaults from the optional config file
fn merge_file_settings(cli: &mut RunnerCli, file: &FileSettings) {
    if cli.amqp_url.is_empty() {
        if let Some(url) = &file.amqp_url {
            cli.amqp_url = url.clone();
        }
    }
    if cli.sqs_certs.is_empty() {
        if let Some(dir) = &file.sqs_certs {
            cli.sqs_certs = dir.clone();
        }
    }
    if let Some(port) = file.mgmt_port {
        cli.mgmt_port = port;
    }
    if let Some(expr) = &file.queue_match {
        if cli.queue_match == "^(rmq|sqs)_.*$" {
            cli.queue_match = expr.clone();
        }
    }
    if let Some(expr) = &file.queue_mismatch {
        if cli.queue_mismatch.is_empty() {
            cli.queue_mismatch = expr.clone();
        }
    }
    if let Some(dir) = &file.working_dir {
        cli.working_dir = dir.clone();
    }
    if let Some(cores) = file.max_cores {
        if cli.max_cores == 0 {
            cli.max_cores = cores;
        }
    }
    if let Some(mem) = &file.max_mem {
        if cli.max_mem == "0gb" {
            cli.max_mem = mem.clone();
        }
    }
    if let Some(disk) = &file.max_disk {
        if cli.max_disk == "0gb" {
            cli.max_disk = disk.clone();
        }
    }
    if let Some(devices) = &file.visible_devices {
        if cli.visible_devices == "all" {
            cli.visible_devices = devices.clone();
        }
    }
    if let Some(port) = file.prom_port {
        if cli.prom_port == 9090 {
            cli.prom_port = port;
        }
    }
}

/// Resolves the zero-default budgets against the host's actual capacity
fn resolve_budgets(config: &RunnerConfig) -> (u32, u64, u64) {
    let cores = if config.max_cores() == 0 {
        platform::available_cores()
    } else {
        config.max_cores()
    };

    let mem = if config.max_mem() == 0 {
        platform::memory_info().map(|(_, available)| available).unwrap_or(0)
    } else {
        config.max_mem()
    };

    let disk = if config.max_disk() == 0 {
        platform::available_disk_space(config.working_dir())
            .map(|free| free / 100 * 85)
            .unwrap_or(0)
    } else {
        config.max_disk()
    };

    (cores, mem, disk)
}

fn fail_startup(errors: &[String], code: ExitCode) -> ! {
    for error in errors {
        error!("{}", error);
    }
    std::process::exit(code.as_i32());
}

#[tokio::main]
async fn main() {
    let mut cli = RunnerCli::parse();
    init_tracing(cli.verbose);

    if let Some(path) = cli.config.clone() {
        match load_settings(&path) {
            Ok(settings) => merge_file_settings(&mut cli, &settings),
            Err(e) => fail_startup(&[e.to_string()], ExitCode::DataError),
        }
    }

    // Gather every flag problem before stopping, one pass for the
    // operator instead of a failure at a time.
    let validation_errors = cli.validate();
    if !validation_errors.is_empty() {
        fail_startup(&validation_errors, ExitCode::UsageError);
    }

    let config = match cli.to_config() {
        Ok(config) => config,
        Err(e) => fail_startup(&[e], ExitCode::UsageError),
    };

    info!(version = env!("CARGO_PKG_VERSION"), "runner starting");

    if let Err(e) = std::fs::create_dir_all(config.working_dir()) {
        fail_startup(
            &[format!(
                "working directory {} is unusable: {}",
                config.working_dir().display(),
                e
            )],
            ExitCode::NoInput,
        );
    }

    // GPU inventory, honouring the visibility filter.
    let probe: Arc<dyn adaptive_runner_domain::services::DeviceProbe> = Arc::from(detect_probe());
    let (allocator, gpu_warnings) =
        match GpuAllocator::from_probe(probe.as_ref(), config.visible_devices()) {
            Ok(result) => result,
            Err(e) => fail_startup(&[e.to_string()], ExitCode::Software),
        };
    let allocator = Arc::new(allocator);
    for warning in &gpu_warnings {
        warn!(warning = %warning, "gpu discovery");
    }

    let (total_slots, free_slots) = allocator.slots();
    if !config.cpu_only() && allocator.device_count() > 0 && free_slots == 0 {
        fail_startup(
            &["no available GPUs could be found in the configured inventory".to_string()],
            ExitCode::DataError,
        );
    }
    info!(
        devices = allocator.device_count(),
        total_slots, free_slots, "gpu inventory ready"
    );

    let (cores, mem, disk) = resolve_budgets(&config);
    if disk == 0 {
        fail_startup(
            &["insufficient disk storage available for the working directory".to_string()],
            ExitCode::NoInput,
        );
    }
    info!(cores, mem, disk, "resource budgets resolved");
    let gate = ResourceGate::new(cores, mem, disk, Arc::clone(&allocator));

    let metrics = match MetricsService::new() {
        Ok(metrics) => metrics,
        Err(e) => fail_startup(&[e.to_string()], ExitCode::Software),
    };
    metrics.record_gpu_inventory(&allocator);

    let host = platform::hostname();
    let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
    let root = coordinator.token();

    let (events_tx, events_rx) = mpsc::channel::<RunnerEvent>(256);
    tokio::spawn(watch_reporting_channel(events_rx, root.child()));

    let lifecycle = Arc::new(LifecycleController::new());

    // Long-lived control tasks.
    let monitor = GpuMonitor::new(Arc::clone(&allocator), probe, events_tx.clone());
    tokio::spawn(monitor.run(root.child()));

    let exporter_period = if config.test_mode() {
        Duration::from_secs(2)
    } else {
        Duration::from_secs(15)
    };
    tokio::spawn(run_exporter(
        metrics.clone(),
        Arc::clone(&allocator),
        exporter_period,
        root.child(),
    ));

    let endpoint = MetricsEndpoint::new(metrics.clone(), config.prom_port());
    let endpoint_token = root.child();
    tokio::spawn(async move {
        if let Err(e) = endpoint.run(endpoint_token).await {
            warn!(error = %e, "metrics endpoint failed");
        }
    });

    // Queue name filters were validated at startup; compile failures
    // cannot reach this point.
    let matcher = Regex::new(config.queue_match()).ok();
    let mismatcher = if config.queue_mismatch().is_empty() {
        None
    } else {
        Regex::new(config.queue_mismatch()).ok()
    };

    let amqp = match config.amqp_url() {
        Some(url) => match AmqpBroker::new(url, config.mgmt_port()) {
            Ok(broker) => Some(Arc::new(broker)),
            Err(e) => fail_startup(&[e.to_string()], ExitCode::UsageError),
        },
        None => None,
    };

    let executor: Arc<dyn TaskExecutor> =
        Arc::new(ScriptExecutor::new(config.working_dir().clone()));

    let spawner = Arc::new(DaemonSpawner {
        amqp: amqp.clone(),
        gate,
        executor,
        lifecycle: lifecycle.subscribe(),
        metrics: metrics.clone(),
        events: events_tx.clone(),
        host: host.clone(),
        matcher,
        mismatcher,
        baseline: config.service_interval(),
        deadline: config.broker_deadline(),
        backoff_cap: config.backoff_cap(),
    });

    let (ticks_tx, ticks_rx) = mpsc::channel::<ProjectSet>(16);

    if let Some(amqp) = &amqp {
        info!(identity = %amqp.identity(), "amqp transport configured");
        tokio::spawn(amqp_project_source(
            amqp.identity().to_string(),
            String::new(),
            ticks_tx.clone(),
            config.service_interval(),
            root.child(),
        ));
    } else {
        info!("amqp transport disabled");
    }

    if let Some(certs_dir) = config.sqs_certs_dir() {
        info!(root = %certs_dir.display(), "cloud transport configured");
        let source = Arc::new(CloudCredentialSource::new(config.broker_deadline()));
        let watcher = CredentialWatcher::new(certs_dir, source, config.service_interval());
        tokio::spawn(watcher.run(ticks_tx.clone(), root.child()));
    } else {
        info!("cloud transport disabled");
    }
    drop(ticks_tx);

    let service = Arc::new(ServiceLoop::new(spawner, metrics.clone(), host.clone()));
    let service_clone = Arc::clone(&service);
    let service_events = events_tx.clone();
    let service_token = root.child();
    let service_coordinator = coordinator.clone();
    let service_handle = tokio::spawn(async move {
        service_clone
            .run(ticks_rx, service_events, service_token)
            .await;
        service_coordinator.complete_shutdown();
    });

    // Block on the signal handler; everything after this is shutdown.
    let signals = create_signal_handler();
    let shutdown_coordinator = coordinator.clone();
    signals
        .wait_for_signal(Box::new(move || {
            shutdown_coordinator.initiate_shutdown();
        }))
        .await;

    if !coordinator.wait_for_shutdown().await {
        warn!("supervisors did not drain within the grace period");
    }
    let _ = service_handle.await;

    info!(projects = service.live_count(), "runner stopped");
    std::process::exit(ExitCode::Success.as_i32());
}
