// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Credential Watcher
//!
//! Periodic scan of the credentials root. Every immediate subdirectory is
//! a candidate project; hidden entries are ignored and a parse failure in
//! one subdirectory never hides the others.
//!
//! The watcher emits the **full current set** on every scan - diffing
//! against the live map is the service loop's job. The first scan runs
//! after one second so a freshly started daemon picks its projects up
//! quickly; after that the steady-state cadence applies.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use adaptive_runner_bootstrap::shutdown::CancellationToken;
use adaptive_runner_domain::services::CredentialSource;
use adaptive_runner_domain::value_objects::QueueTransport;

/// One full-set emission: the transport plus project name → credential
pub type ProjectSet = (QueueTransport, HashMap<String, String>);

/// Interval before the very first scan
pub const INITIAL_SCAN_DELAY: Duration = Duration::from_secs(1);

/// Watches one credentials root with one credential source
pub struct CredentialWatcher {
    root: PathBuf,
    source: Arc<dyn CredentialSource>,
    interval: Duration,
}

impl CredentialWatcher {
    /// Creates a watcher over `root` with the given steady-state interval
    pub fn new(root: impl Into<PathBuf>, source: Arc<dyn CredentialSource>, interval: Duration) -> Self {
        Self {
            root: root.into(),
            source,
            interval,
        }
    }

    /// Scans the root once, returning the full project set.
    ///
    /// An unreadable root yields an empty set with a warning; the next
    /// scan retries.
    pub async fn scan(&self) -> HashMap<String, String> {
        let mut found = HashMap::new();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "credentials root not readable");
                return found;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(root = %self.root.display(), error = %e, "credentials scan aborted");
                    break;
                }
            };

            let name = entry.file_name();
            let name = name.to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => {}
                _ => continue,
            }

            match self.source.load(&entry.path()).await {
                Ok(project) => {
                    found.insert(project.id.name.clone(), project.credential);
                }
                Err(e) => {
                    // One bad subdirectory must not hide the rest.
                    warn!(
                        project_dir = %entry.path().display(),
                        error = %e,
                        "credential subdirectory skipped"
                    );
                }
            }
        }

        found
    }

    /// Runs until cancelled, emitting the full set after every scan
    pub async fn run(self, emit: mpsc::Sender<ProjectSet>, token: CancellationToken) {
        debug!(root = %self.root.display(), "starting credential watcher");
        let transport = self.source.transport();
        let mut wait = INITIAL_SCAN_DELAY;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(root = %self.root.display(), "stopping credential watcher");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }
            wait = self.interval;

            let found = self.scan().await;
            if emit.send((transport, found)).await.is_err() {
                // Receiver went away; the daemon is shutting down.
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_runner_domain::entities::{Project, ProjectId};
    use adaptive_runner_domain::error::RunnerError;
    use async_trait::async_trait;
    use std::path::Path;

    /// Source that accepts directories containing a `cred` file and
    /// refuses everything else.
    struct FileSource;

    #[async_trait]
    impl CredentialSource for FileSource {
        fn transport(&self) -> QueueTransport {
            QueueTransport::Cloud
        }

        async fn load(&self, project_dir: &Path) -> Result<Project, RunnerError> {
            let cred = tokio::fs::read_to_string(project_dir.join("cred"))
                .await
                .map_err(|e| RunnerError::credential_error(e.to_string()))?;
            let name = project_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(Project::new(
                ProjectId::new(QueueTransport::Cloud, name),
                cred.trim().to_string(),
            ))
        }
    }

    fn add_project(root: &Path, name: &str, cred: &str) {
        let dir = root.join(name);
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("cred"), cred).unwrap();
    }

    #[tokio::test]
    async fn test_scan_emits_full_set() {
        let root = tempfile::tempdir().unwrap();
        add_project(root.path(), "alpha", "cred-a");
        add_project(root.path(), "beta", "cred-b");

        let watcher = CredentialWatcher::new(
            root.path(),
            Arc::new(FileSource),
            Duration::from_secs(15),
        );
        let found = watcher.scan().await;
        assert_eq!(found.len(), 2);
        assert_eq!(found.get("alpha").map(String::as_str), Some("cred-a"));
        assert_eq!(found.get("beta").map(String::as_str), Some("cred-b"));
    }

    #[tokio::test]
    async fn test_hidden_entries_and_files_ignored() {
        let root = tempfile::tempdir().unwrap();
        add_project(root.path(), "alpha", "cred-a");
        std::fs::create_dir(root.path().join(".hidden")).unwrap();
        std::fs::write(root.path().join("stray-file"), "not a project").unwrap();

        let watcher = CredentialWatcher::new(
            root.path(),
            Arc::new(FileSource),
            Duration::from_secs(15),
        );
        let found = watcher.scan().await;
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("alpha"));
    }

    #[tokio::test]
    async fn test_parse_failure_does_not_halt_scan() {
        let root = tempfile::tempdir().unwrap();
        add_project(root.path(), "alpha", "cred-a");
        // beta has no cred file and fails to parse.
        std::fs::create_dir(root.path().join("beta")).unwrap();

        let watcher = CredentialWatcher::new(
            root.path(),
            Arc::new(FileSource),
            Duration::from_secs(15),
        );
        let found = watcher.scan().await;
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("alpha"));
    }

    #[tokio::test]
    async fn test_missing_root_yields_empty_set() {
        let watcher = CredentialWatcher::new(
            "/nonexistent/credentials",
            Arc::new(FileSource),
            Duration::from_secs(15),
        );
        assert!(watcher.scan().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_emits_and_stops_on_cancel() {
        let root = tempfile::tempdir().unwrap();
        add_project(root.path(), "alpha", "cred-a");

        let watcher = CredentialWatcher::new(
            root.path(),
            Arc::new(FileSource),
            Duration::from_millis(20),
        );
        let (tx, mut rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(tx, token.clone()));

        let (transport, found) = rx.recv().await.unwrap();
        assert_eq!(transport, QueueTransport::Cloud);
        assert_eq!(found.len(), 1);

        token.cancel();
        handle.await.unwrap();
    }
}
