// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Credential Source Service Interface
//!
//! Turns one subdirectory of the credentials root into a `Project`. The
//! watcher walks the root and calls `load` per subdirectory; a failure for
//! one subdirectory never halts the scan - that project is simply omitted
//! from the emitted set and retried on the next tick.

use std::path::Path;

use async_trait::async_trait;

use crate::entities::Project;
use crate::error::RunnerError;
use crate::value_objects::QueueTransport;

/// Parses project credentials out of a directory
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Which broker family the produced projects belong to
    fn transport(&self) -> QueueTransport;

    /// Parses and validates one project subdirectory.
    ///
    /// Returns `CredentialError` when the directory layout or content is
    /// unusable; the caller logs and skips.
    async fn load(&self, project_dir: &Path) -> Result<Project, RunnerError>;
}
