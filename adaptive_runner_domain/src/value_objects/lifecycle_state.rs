// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Lifecycle State Value Object
//!
//! The externally-driven permission level dictating whether the daemon
//! accepts new work. Transitions arrive through the lifecycle controller;
//! the domain only defines the states and their admission semantics:
//!
//! - `Running` / `Unknown` - new work admitted
//! - `DrainAndSuspend` - no new work; existing work continues
//! - `DrainAndTerminate` - no new work; existing work cancelled

use std::fmt;

use serde::{Deserialize, Serialize};

/// Host lifecycle state, latest value wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    /// No update seen yet; treated like `Running`
    Unknown,
    /// Normal operation
    #[default]
    Running,
    /// Stop pulling new work and cancel work already in flight
    DrainAndTerminate,
    /// Stop pulling new work but let in-flight work finish
    DrainAndSuspend,
}

impl LifecycleState {
    /// Whether supervisors may pull new messages in this state
    pub fn admits_new_work(&self) -> bool {
        matches!(self, LifecycleState::Running | LifecycleState::Unknown)
    }

    /// Whether in-flight executors must be cancelled in this state
    pub fn forces_cancellation(&self) -> bool {
        matches!(self, LifecycleState::DrainAndTerminate)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Unknown => "Unknown",
            LifecycleState::Running => "Running",
            LifecycleState::DrainAndTerminate => "DrainAndTerminate",
            LifecycleState::DrainAndSuspend => "DrainAndSuspend",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission() {
        assert!(LifecycleState::Running.admits_new_work());
        assert!(LifecycleState::Unknown.admits_new_work());
        assert!(!LifecycleState::DrainAndSuspend.admits_new_work());
        assert!(!LifecycleState::DrainAndTerminate.admits_new_work());
    }

    #[test]
    fn test_forced_cancellation() {
        assert!(LifecycleState::DrainAndTerminate.forces_cancellation());
        assert!(!LifecycleState::DrainAndSuspend.forces_cancellation());
        assert!(!LifecycleState::Running.forces_cancellation());
    }

    #[test]
    fn test_default_is_running() {
        assert_eq!(LifecycleState::default(), LifecycleState::Running);
    }
}
