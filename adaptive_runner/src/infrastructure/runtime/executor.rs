// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Script Executor
//!
//! Runs an admitted experiment as a child process under `/bin/bash -c`,
//! inside a private work area with its own `TMPDIR`. Both output streams
//! are drained line by line into tracing and an `output.log` beside the
//! work, so interactive progress survives even when the child dies.
//!
//! Cancellation is delivered by dropping the returned future; the child
//! is started with `kill_on_drop` so no orphan survives a forced drain.
//!
//! ## Outcome classification
//!
//! - the command ran and exited zero → `Success`
//! - the command ran and exited non-zero → `Fatal` (the experiment is the
//!   problem; another runner would fail the same way)
//! - the command could not be started or its output could not be captured
//!   → `Retry` (the host is the problem)

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use adaptive_runner_domain::entities::ExperimentRequest;
use adaptive_runner_domain::services::{TaskDisposition, TaskExecutor};

/// Executes experiment commands in work areas under a common root
pub struct ScriptExecutor {
    working_root: PathBuf,
}

impl ScriptExecutor {
    /// Creates an executor storing work areas under `working_root`
    pub fn new(working_root: impl Into<PathBuf>) -> Self {
        Self {
            working_root: working_root.into(),
        }
    }

    async fn stream_lines<R>(
        reader: R,
        label: &str,
        run_key: &str,
        output: &mut tokio::fs::File,
    ) -> Result<(), std::io::Error>
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            debug!(run_key = %run_key, stream = %label, "{}", line);
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TaskExecutor for ScriptExecutor {
    async fn run(
        &self,
        request: &ExperimentRequest,
        env: &BTreeMap<String, String>,
    ) -> TaskDisposition {
        let run_key = request.key().to_string();

        let Some(command) = request
            .extra
            .get("command")
            .and_then(serde_json::Value::as_str)
        else {
            return TaskDisposition::Fatal(format!(
                "experiment {} carries no runnable command",
                run_key
            ));
        };

        let work_dir = match tempfile::Builder::new()
            .prefix(&format!("{}-", run_key))
            .tempdir_in(&self.working_root)
        {
            Ok(dir) => dir,
            Err(e) => {
                return TaskDisposition::Retry(format!("could not create work area: {}", e));
            }
        };

        // The child gets a private TMPDIR because package installs tend
        // to leave dirt behind.
        let tmp_dir = work_dir.path().join("tmp");
        if let Err(e) = tokio::fs::create_dir_all(&tmp_dir).await {
            return TaskDisposition::Retry(format!("could not create tmp dir: {}", e));
        }

        let output_path = work_dir.path().join("output.log");
        let mut output = match tokio::fs::File::create(&output_path).await {
            Ok(file) => file,
            Err(e) => {
                return TaskDisposition::Retry(format!("could not create output log: {}", e));
            }
        };

        info!(run_key = %run_key, dir = %work_dir.path().display(), "starting experiment");

        let mut child = match tokio::process::Command::new("/bin/bash")
            .arg("-c")
            .arg(command)
            .current_dir(work_dir.path())
            .env("TMPDIR", &tmp_dir)
            .envs(env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return TaskDisposition::Retry(format!("could not start experiment: {}", e));
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Drain both streams before waiting so the child can never block
        // on a full pipe.
        if let Some(stdout) = stdout {
            if let Err(e) = Self::stream_lines(stdout, "stdout", &run_key, &mut output).await {
                warn!(run_key = %run_key, error = %e, "stdout capture failed");
            }
        }
        if let Some(stderr) = stderr {
            if let Err(e) = Self::stream_lines(stderr, "stderr", &run_key, &mut output).await {
                warn!(run_key = %run_key, error = %e, "stderr capture failed");
            }
        }

        match child.wait().await {
            Ok(status) if status.success() => {
                info!(run_key = %run_key, "experiment completed");
                TaskDisposition::Success
            }
            Ok(status) => TaskDisposition::Fatal(format!(
                "experiment {} exited with {}",
                run_key, status
            )),
            Err(e) => TaskDisposition::Retry(format!("wait on experiment failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(command: Option<&str>) -> ExperimentRequest {
        let mut payload = serde_json::json!({"experiment": {"key": "exp-test"}});
        if let Some(cmd) = command {
            payload["command"] = serde_json::Value::String(cmd.to_string());
        }
        ExperimentRequest::decode(payload.to_string().as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_successful_command() {
        let root = tempfile::tempdir().unwrap();
        let executor = ScriptExecutor::new(root.path());
        let disposition = executor
            .run(&request(Some("echo hello")), &BTreeMap::new())
            .await;
        assert_eq!(disposition, TaskDisposition::Success);
    }

    #[tokio::test]
    async fn test_failing_command_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let executor = ScriptExecutor::new(root.path());
        let disposition = executor
            .run(&request(Some("exit 3")), &BTreeMap::new())
            .await;
        assert!(matches!(disposition, TaskDisposition::Fatal(_)));
        assert!(!disposition.should_requeue());
    }

    #[tokio::test]
    async fn test_missing_command_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let executor = ScriptExecutor::new(root.path());
        let disposition = executor.run(&request(None), &BTreeMap::new()).await;
        assert!(matches!(disposition, TaskDisposition::Fatal(_)));
    }

    #[tokio::test]
    async fn test_unusable_working_root_is_retryable() {
        let executor = ScriptExecutor::new("/nonexistent/work/root");
        let disposition = executor
            .run(&request(Some("echo hi")), &BTreeMap::new())
            .await;
        assert!(disposition.should_requeue());
    }

    #[tokio::test]
    async fn test_env_reaches_child() {
        let root = tempfile::tempdir().unwrap();
        let executor = ScriptExecutor::new(root.path());
        let mut env = BTreeMap::new();
        env.insert("CUDA_VISIBLE_DEVICES".to_string(), "GPU-7".to_string());
        let disposition = executor
            .run(
                &request(Some("test \"$CUDA_VISIBLE_DEVICES\" = GPU-7")),
                &env,
            )
            .await;
        assert_eq!(disposition, TaskDisposition::Success);
    }
}
