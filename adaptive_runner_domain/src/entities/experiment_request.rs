// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Experiment Request Entity
//!
//! The decoded form of a queue message: which experiment to run and what
//! resources it needs. Payloads are JSON; anything the runner does not
//! understand is preserved in `extra` so downstream tooling can still see
//! it.
//!
//! A decode failure is a permanent error - requeueing a message no runner
//! can parse would loop it forever.

use serde::{Deserialize, Serialize};

use crate::error::RunnerError;
use crate::value_objects::ResourceDemand;

/// Identity block of a request payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    /// Globally unique experiment key, also used as the run key for the
    /// executor's work area
    pub key: String,
    /// Optional wall-clock bound for the run, humanised (`"1h"`, `"30m"`)
    #[serde(default)]
    pub max_duration: Option<String>,
}

/// A work request pulled from a queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRequest {
    /// Experiment identity
    pub experiment: ExperimentSpec,
    /// Resources the experiment asks for
    #[serde(default)]
    pub resources: ResourceDemand,
    /// Fields the runner does not interpret, kept for diagnostics
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ExperimentRequest {
    /// Decodes a JSON payload into a request.
    ///
    /// The experiment key must be present and non-empty; everything else
    /// defaults.
    pub fn decode(payload: &[u8]) -> Result<Self, RunnerError> {
        let request: ExperimentRequest = serde_json::from_slice(payload).map_err(|e| {
            RunnerError::SerializationError(format!("experiment request decode failed: {}", e))
        })?;

        if request.experiment.key.is_empty() {
            return Err(RunnerError::ValidationError(
                "experiment request is missing an experiment key".to_string(),
            ));
        }

        Ok(request)
    }

    /// The experiment key used for tracking and deduplication
    pub fn key(&self) -> &str {
        &self.experiment.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_minimal() {
        let request =
            ExperimentRequest::decode(br#"{"experiment": {"key": "exp-0001"}}"#).unwrap();
        assert_eq!(request.key(), "exp-0001");
        assert_eq!(request.resources, ResourceDemand::default());
    }

    #[test]
    fn test_decode_with_resources() {
        let payload = br#"{
            "experiment": {"key": "exp-0002", "max_duration": "2h"},
            "resources": {"cpus": 4, "ram": "8gb", "gpus": 2, "gpu_mem": "4gib"}
        }"#;
        let request = ExperimentRequest::decode(payload).unwrap();
        assert_eq!(request.resources.cpus, 4);
        assert_eq!(request.resources.gpus, 2);
        assert_eq!(request.experiment.max_duration.as_deref(), Some("2h"));
    }

    #[test]
    fn test_decode_failures_are_permanent() {
        let err = ExperimentRequest::decode(b"not json").unwrap_err();
        assert!(!err.is_recoverable());

        let err = ExperimentRequest::decode(br#"{"experiment": {"key": ""}}"#).unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let request = ExperimentRequest::decode(
            br#"{"experiment": {"key": "exp-0003"}, "pythonver": "3.10"}"#,
        )
        .unwrap();
        assert!(request.extra.contains_key("pythonver"));
    }
}
