// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Service Loop
//!
//! The top-level wiring: holds the set of live supervisors and applies
//! watcher emissions against it. On each tick the full incoming project
//! set is diffed with the live map - departures get their cancel handle
//! invoked, arrivals get a supervisor spawned with a fresh child token.
//! The loop owns every cancel handle; supervisors only ever see their own
//! token.
//!
//! Applying the same set twice is a no-op: no new spawns, no
//! cancellations. A project whose supervisor could not be constructed is
//! left out of the live map so the next tick retries it.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use adaptive_runner_bootstrap::shutdown::CancellationToken;
use adaptive_runner_domain::entities::{Project, ProjectId};
use adaptive_runner_domain::error::RunnerError;
use adaptive_runner_domain::events::RunnerEvent;
use adaptive_runner_domain::value_objects::QueueTransport;

use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::watch::ProjectSet;

/// Constructs and spawns a supervisor for a newly credentialed project
pub trait SupervisorSpawner: Send + Sync {
    /// Spawns the supervisor task; the token is the project's cancel
    /// handle, already a child of the service loop's token
    fn spawn(&self, project: Project, token: CancellationToken) -> Result<(), RunnerError>;
}

/// The outcome of applying one watcher emission
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Projects a supervisor was spawned for
    pub spawned: Vec<ProjectId>,
    /// Projects whose cancel handle was invoked
    pub cancelled: Vec<ProjectId>,
}

/// Holder of the live project map
pub struct ServiceLoop {
    live: Mutex<HashMap<ProjectId, CancellationToken>>,
    spawner: std::sync::Arc<dyn SupervisorSpawner>,
    metrics: MetricsService,
    host: String,
}

impl ServiceLoop {
    /// Creates an empty service loop
    pub fn new(
        spawner: std::sync::Arc<dyn SupervisorSpawner>,
        metrics: MetricsService,
        host: impl Into<String>,
    ) -> Self {
        Self {
            live: Mutex::new(HashMap::new()),
            spawner,
            metrics,
            host: host.into(),
        }
    }

    /// Diffs one transport's full project set against the live map.
    ///
    /// Removals are cancelled before additions are spawned, so a
    /// same-tick replacement of a project observes the removal first.
    pub fn apply(
        &self,
        root: &CancellationToken,
        transport: QueueTransport,
        found: &HashMap<String, String>,
    ) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        let mut live = self.live.lock();

        let departed: Vec<ProjectId> = live
            .keys()
            .filter(|id| id.transport == transport && !found.contains_key(&id.name))
            .cloned()
            .collect();

        for id in departed {
            if let Some(cancel) = live.remove(&id) {
                cancel.cancel();
            }
            info!(project = %id, "credentials no longer available, project stopped");
            self.metrics.dec_projects();
            outcome.cancelled.push(id);
        }

        for (name, credential) in found {
            let id = ProjectId::new(transport, name.clone());
            if live.contains_key(&id) {
                continue;
            }

            let token = root.child();
            let project = Project::new(id.clone(), credential.clone());
            match self.spawner.spawn(project, token.clone()) {
                Ok(()) => {
                    info!(project = %id, host = %self.host, "project started");
                    live.insert(id.clone(), token);
                    self.metrics.inc_projects();
                    outcome.spawned.push(id);
                }
                Err(e) => {
                    // Left absent deliberately: the next watcher tick
                    // retries the spawn.
                    warn!(project = %id, error = %e, "supervisor construction failed");
                    token.cancel();
                }
            }
        }

        outcome
    }

    /// Cancels every live supervisor and empties the map
    pub fn shutdown(&self) {
        let mut live = self.live.lock();
        for (id, cancel) in live.drain() {
            debug!(project = %id, "cancelling supervisor for shutdown");
            cancel.cancel();
            self.metrics.dec_projects();
        }
    }

    /// Number of live projects
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Snapshot of the live project ids
    pub fn live_projects(&self) -> Vec<ProjectId> {
        self.live.lock().keys().cloned().collect()
    }

    /// Applies watcher emissions until the token cancels, then tears
    /// every supervisor down. No additions happen after the shutdown
    /// signal.
    pub async fn run(
        &self,
        mut ticks: mpsc::Receiver<ProjectSet>,
        events: mpsc::Sender<RunnerEvent>,
        token: CancellationToken,
    ) {
        info!("service loop starting");

        loop {
            let tick = tokio::select! {
                _ = token.cancelled() => break,
                tick = ticks.recv() => tick,
            };

            let Some((transport, found)) = tick else {
                break;
            };

            let outcome = self.apply(&token, transport, &found);
            for id in &outcome.spawned {
                let _ = events
                    .send(RunnerEvent::project_started(id.clone(), self.host.clone()))
                    .await;
            }
            for id in &outcome.cancelled {
                let _ = events
                    .send(RunnerEvent::project_stopped(
                        id.clone(),
                        self.host.clone(),
                        "credentials removed",
                    ))
                    .await;
            }
        }

        self.shutdown();
        info!("service loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Spawner that records every spawn and exposes the tokens it was
    /// handed.
    #[derive(Default)]
    struct RecordingSpawner {
        spawns: Mutex<Vec<(ProjectId, CancellationToken)>>,
        fail_names: Mutex<Vec<String>>,
    }

    impl RecordingSpawner {
        fn spawn_count_for(&self, name: &str) -> usize {
            self.spawns
                .lock()
                .iter()
                .filter(|(id, _)| id.name == name)
                .count()
        }

        fn token_for(&self, name: &str) -> CancellationToken {
            self.spawns
                .lock()
                .iter()
                .find(|(id, _)| id.name == name)
                .map(|(_, token)| token.clone())
                .unwrap()
        }
    }

    impl SupervisorSpawner for RecordingSpawner {
        fn spawn(&self, project: Project, token: CancellationToken) -> Result<(), RunnerError> {
            if self.fail_names.lock().contains(&project.id.name) {
                return Err(RunnerError::credential_error("construction refused"));
            }
            self.spawns.lock().push((project.id, token));
            Ok(())
        }
    }

    fn set(names: &[&str]) -> HashMap<String, String> {
        names
            .iter()
            .map(|n| (n.to_string(), format!("cred-{}", n)))
            .collect()
    }

    fn service() -> (Arc<RecordingSpawner>, ServiceLoop, CancellationToken) {
        let spawner = Arc::new(RecordingSpawner::default());
        let service = ServiceLoop::new(
            spawner.clone(),
            MetricsService::new().unwrap(),
            "test-host",
        );
        (spawner, service, CancellationToken::new())
    }

    #[test]
    fn test_project_add_remove_sequence() {
        let (spawner, service, root) = service();
        let transport = QueueTransport::Cloud;

        // {P1} then {P1, P2} then {P2}: P1 and P2 spawn once each, P1
        // cancels once at the third tick.
        let first = service.apply(&root, transport, &set(&["p1"]));
        assert_eq!(first.spawned.len(), 1);
        assert!(first.cancelled.is_empty());

        let second = service.apply(&root, transport, &set(&["p1", "p2"]));
        assert_eq!(second.spawned.len(), 1);
        assert!(second.cancelled.is_empty());

        let p1_token = spawner.token_for("p1");
        let third = service.apply(&root, transport, &set(&["p2"]));
        assert!(third.spawned.is_empty());
        assert_eq!(third.cancelled.len(), 1);
        assert_eq!(third.cancelled[0].name, "p1");

        assert_eq!(spawner.spawn_count_for("p1"), 1);
        assert_eq!(spawner.spawn_count_for("p2"), 1);
        assert!(p1_token.is_cancelled());
        assert!(!spawner.token_for("p2").is_cancelled());
        assert_eq!(service.live_count(), 1);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let (spawner, service, root) = service();
        let transport = QueueTransport::Cloud;

        service.apply(&root, transport, &set(&["p1", "p2"]));
        let again = service.apply(&root, transport, &set(&["p1", "p2"]));

        assert!(again.spawned.is_empty());
        assert!(again.cancelled.is_empty());
        assert_eq!(spawner.spawn_count_for("p1"), 1);
        assert_eq!(spawner.spawn_count_for("p2"), 1);
        assert_eq!(service.live_count(), 2);
    }

    #[test]
    fn test_transports_do_not_interfere() {
        let (_, service, root) = service();

        service.apply(&root, QueueTransport::Cloud, &set(&["shared-name"]));
        // An empty AMQP set must not cancel the cloud project of the
        // same name.
        let outcome = service.apply(&root, QueueTransport::Amqp, &set(&[]));
        assert!(outcome.cancelled.is_empty());
        assert_eq!(service.live_count(), 1);
    }

    #[test]
    fn test_failed_construction_retries_next_tick() {
        let (spawner, service, root) = service();
        let transport = QueueTransport::Cloud;

        spawner.fail_names.lock().push("p1".to_string());
        let first = service.apply(&root, transport, &set(&["p1"]));
        assert!(first.spawned.is_empty());
        assert_eq!(service.live_count(), 0);

        spawner.fail_names.lock().clear();
        let second = service.apply(&root, transport, &set(&["p1"]));
        assert_eq!(second.spawned.len(), 1);
        assert_eq!(service.live_count(), 1);
    }

    #[test]
    fn test_shutdown_cancels_everything() {
        let (spawner, service, root) = service();
        service.apply(&root, QueueTransport::Cloud, &set(&["p1", "p2"]));

        service.shutdown();
        assert_eq!(service.live_count(), 0);
        assert!(spawner.token_for("p1").is_cancelled());
        assert!(spawner.token_for("p2").is_cancelled());
    }

    #[test]
    fn test_supervisor_tokens_are_children_of_root() {
        let (spawner, service, root) = service();
        service.apply(&root, QueueTransport::Cloud, &set(&["p1"]));

        root.cancel();
        assert!(spawner.token_for("p1").is_cancelled());
    }
}
