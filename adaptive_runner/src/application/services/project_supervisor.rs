// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Project Supervisor
//!
//! The per-project control task. One supervisor exists per live project
//! and runs until its cancellation token fires.
//!
//! ## Cycle
//!
//! Each cycle enumerates the project's queues and visits each queue at
//! most once, in lexicographic queue-key order so no queue starves. Per
//! queue the supervisor consults the lifecycle state, pulls at most one
//! message, admits it through the resource gate and hands it to an
//! executor task. Outcome signalling (ack/nack) happens in the executor
//! task when the work finishes, never before.
//!
//! ## Backoff
//!
//! Enumeration failures and empty results double the cycle sleep up to a
//! three-minute cap; a successful non-empty enumeration resets it to the
//! baseline. Pull failures back off the affected queue only, leaving the
//! rest of the cycle untouched.
//!
//! ## Cancellation
//!
//! The supervisor's token is a child of the service loop's; each executor
//! task holds a child of the supervisor's. Work in flight runs to natural
//! completion unless the host lifecycle turns `DrainAndTerminate` or the
//! project itself is torn down - both cancel the executor, whose message
//! is then requeued for another runner.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use adaptive_runner_bootstrap::shutdown::CancellationToken;
use adaptive_runner_domain::entities::{ExperimentRequest, Project};
use adaptive_runner_domain::events::RunnerEvent;
use adaptive_runner_domain::services::{QueueBroker, QueueMessage, TaskDisposition, TaskExecutor};
use adaptive_runner_domain::value_objects::{LifecycleState, QueueKey};

use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::runtime::lifecycle;
use crate::infrastructure::runtime::resource_gate::ResourceGate;
use crate::infrastructure::runtime::supervision::{spawn_supervised, AppResult};

/// Everything a supervisor needs besides its project
#[derive(Clone)]
pub struct SupervisorContext {
    /// Transport the project's queues live on
    pub broker: Arc<dyn QueueBroker>,
    /// Admission control for the machine's budgets
    pub gate: Arc<ResourceGate>,
    /// Runs admitted work
    pub executor: Arc<dyn TaskExecutor>,
    /// Latest-value lifecycle subscription
    pub lifecycle: watch::Receiver<LifecycleState>,
    /// Daemon metrics
    pub metrics: MetricsService,
    /// Daemon reporting channel
    pub events: mpsc::Sender<RunnerEvent>,
    /// This machine's name, used in metrics labels
    pub host: String,
    /// Positive queue name filter
    pub matcher: Option<Regex>,
    /// Negative queue name filter
    pub mismatcher: Option<Regex>,
    /// Baseline interval between cycles
    pub baseline: Duration,
    /// Deadline for every broker call
    pub deadline: Duration,
    /// Upper bound for exponential backoff
    pub backoff_cap: Duration,
}

/// The per-project control task
pub struct ProjectSupervisor {
    project: Project,
    ctx: SupervisorContext,
    active: Arc<Mutex<HashSet<String>>>,
}

impl ProjectSupervisor {
    /// Creates a supervisor for one project
    pub fn new(project: Project, ctx: SupervisorContext) -> Self {
        Self {
            project,
            ctx,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Runs the cycle loop until the token cancels
    pub async fn run(self, token: CancellationToken) -> AppResult<()> {
        info!(project = %self.project.id, "supervisor starting");

        // First cycle fires quickly so fresh credentials begin pulling
        // without waiting a whole interval.
        let mut wait = self.ctx.baseline.min(Duration::from_secs(1));
        let mut scan_backoff = self.ctx.baseline;
        let mut queue_backoff: HashMap<QueueKey, (Instant, Duration)> = HashMap::new();

        'cycles: loop {
            tokio::select! {
                _ = token.cancelled() => break 'cycles,
                _ = tokio::time::sleep(wait) => {}
            }
            wait = self.ctx.baseline;

            let found = tokio::select! {
                _ = token.cancelled() => break 'cycles,
                result = self.ctx.broker.enumerate(
                    self.ctx.matcher.as_ref(),
                    self.ctx.mismatcher.as_ref(),
                    self.ctx.deadline,
                ) => result,
            };

            let found = match found {
                Err(e) => {
                    warn!(project = %self.project.id, error = %e, "unable to refresh queue manifest");
                    let _ = self
                        .ctx
                        .events
                        .send(RunnerEvent::QueueScanFailed {
                            project: self.project.id.clone(),
                            error: e.to_string(),
                            at: chrono::Utc::now(),
                        })
                        .await;
                    scan_backoff = (scan_backoff * 2).min(self.ctx.backoff_cap);
                    wait = scan_backoff;
                    continue;
                }
                Ok(found) if found.is_empty() => {
                    debug!(project = %self.project.id, "no matching queues found");
                    scan_backoff = (scan_backoff * 2).min(self.ctx.backoff_cap);
                    wait = scan_backoff;
                    continue;
                }
                Ok(found) => {
                    scan_backoff = self.ctx.baseline;
                    found
                }
            };

            // BTreeMap iteration is the lexicographic visit order the
            // rotation depends on.
            for (key, descriptor) in &found {
                if token.is_cancelled() {
                    break 'cycles;
                }

                if !self.ctx.lifecycle.borrow().admits_new_work() {
                    self.ctx.metrics.inc_queue_ignored(
                        &self.ctx.host,
                        self.project.id.transport.label(),
                        key.queue(),
                    );
                    continue;
                }

                if let Some((until, _)) = queue_backoff.get(key) {
                    if Instant::now() < *until {
                        continue;
                    }
                }

                let pulled = tokio::select! {
                    _ = token.cancelled() => break 'cycles,
                    result = self.ctx.broker.pull_one(key, self.ctx.deadline) => result,
                };

                match pulled {
                    Err(e) => {
                        let delay = queue_backoff
                            .get(key)
                            .map(|(_, delay)| (*delay * 2).min(self.ctx.backoff_cap))
                            .unwrap_or(self.ctx.baseline);
                        warn!(queue = %key, error = %e, delay = ?delay, "pull failed, backing off queue");
                        queue_backoff.insert(key.clone(), (Instant::now() + delay, delay));
                    }
                    Ok(None) => {
                        queue_backoff.remove(key);
                    }
                    Ok(Some(message)) => {
                        queue_backoff.remove(key);
                        debug!(
                            queue = %key,
                            backlog = ?descriptor.backlog_hint,
                            message = %message.id,
                            "message pulled"
                        );
                        self.handle_message(message, &token).await;
                    }
                }
            }
        }

        info!(project = %self.project.id, "supervisor stopping");
        Ok(())
    }

    /// Decodes, admits and dispatches one pulled message.
    ///
    /// The admission lease moves into the executor task and is given back
    /// when the task exits, successful or not.
    async fn handle_message(&self, message: QueueMessage, token: &CancellationToken) {
        // A message id being processed must not be processed again
        // concurrently on this supervisor.
        if !self.active.lock().insert(message.id.clone()) {
            debug!(message = %message.id, "duplicate delivery while in flight, requeueing");
            if let Err(e) = self.ctx.broker.nack(&message, true).await {
                warn!(message = %message.id, error = %e, "requeue of duplicate failed");
            }
            return;
        }

        let request = match ExperimentRequest::decode(&message.body) {
            Ok(request) => request,
            Err(e) => {
                // Undecodable work would loop forever on requeue; report
                // the failure and let the message go.
                warn!(message = %message.id, error = %e, "request decode failed, acknowledged with failure");
                self.ctx.metrics.inc_tasks_failed();
                if let Err(e) = self.ctx.broker.ack(&message).await {
                    warn!(message = %message.id, error = %e, "ack of undecodable message failed");
                }
                self.active.lock().remove(&message.id);
                return;
            }
        };

        let lease = match self.ctx.gate.try_admit(&request.resources) {
            Ok(lease) => lease,
            Err(reject) => {
                // Another runner with fitting resources may pick it up.
                debug!(
                    message = %message.id,
                    experiment = %request.key(),
                    reason = %reject,
                    "admission refused, requeueing"
                );
                self.ctx.metrics.inc_tasks_requeued();
                let _ = self
                    .ctx
                    .events
                    .send(RunnerEvent::MessageRequeued {
                        queue: message.queue.clone(),
                        reason: reject.to_string(),
                        at: chrono::Utc::now(),
                    })
                    .await;
                if let Err(e) = self.ctx.broker.nack(&message, true).await {
                    warn!(message = %message.id, error = %e, "requeue failed");
                }
                self.active.lock().remove(&message.id);
                return;
            }
        };

        self.ctx.metrics.inc_tasks_started();

        let broker = Arc::clone(&self.ctx.broker);
        let executor = Arc::clone(&self.ctx.executor);
        let metrics = self.ctx.metrics.clone();
        let active = Arc::clone(&self.active);
        let lifecycle = self.ctx.lifecycle.clone();
        let exec_token = token.child();

        spawn_supervised("experiment", async move {
            let env = lease.env();

            let disposition = tokio::select! {
                disposition = executor.run(&request, &env) => Some(disposition),
                _ = exec_token.cancelled() => None,
                _ = lifecycle::terminated(lifecycle) => None,
            };

            let result: AppResult<()> = match &disposition {
                Some(TaskDisposition::Success) => {
                    metrics.inc_tasks_completed();
                    broker.ack(&message).await
                }
                Some(TaskDisposition::Fatal(reason)) => {
                    // The experiment failed on its own terms; report and
                    // acknowledge so it never loops.
                    warn!(experiment = %request.key(), reason = %reason, "experiment failed");
                    metrics.inc_tasks_failed();
                    broker.ack(&message).await
                }
                Some(TaskDisposition::Retry(reason)) => {
                    warn!(experiment = %request.key(), reason = %reason, "experiment retried elsewhere");
                    metrics.inc_tasks_requeued();
                    broker.nack(&message, true).await
                }
                None => {
                    info!(experiment = %request.key(), "experiment cancelled, requeueing");
                    metrics.inc_tasks_requeued();
                    broker.nack(&message, true).await
                }
            };

            active.lock().remove(&message.id);
            // The lease is held to this point deliberately: budgets go
            // back only when the work is truly finished.
            drop(lease);

            result
        });
    }
}
