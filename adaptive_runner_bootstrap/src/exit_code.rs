// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Management
//!
//! Standardised Unix exit codes following BSD `sysexits.h` conventions.
//!
//! The daemon exits `0` on a clean drain and non-zero only for startup
//! validation failures; runtime errors surface as log events and never
//! terminate the process.
//!
//! ## Conventions
//!
//! - **0**: success / clean shutdown
//! - **1**: general error
//! - **64-78**: specific conditions (BSD sysexits.h), the subset the
//!   runner actually produces is enumerated below

use std::fmt;

/// Exit codes following Unix conventions (BSD sysexits.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful termination (0)
    #[default]
    Success = 0,

    /// General error (1)
    Error = 1,

    /// Command line usage error (64): invalid, missing or conflicting
    /// flags
    UsageError = 64,

    /// Data format error (65): malformed configuration or regex flags
    DataError = 65,

    /// Cannot open input (66): unreadable credentials root or working
    /// directory
    NoInput = 66,

    /// Service unavailable (69): no usable work source configured
    Unavailable = 69,

    /// Internal software error (70)
    Software = 70,

    /// System error (71)
    OsError = 71,

    /// I/O error (74)
    IoError = 74,
}

impl ExitCode {
    /// Raw process exit status
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Maps a domain error category tag to an exit code.
    ///
    /// Only categories that can occur during startup validation matter
    /// here; anything else collapses to `Software`.
    pub fn from_category(category: &str) -> Self {
        match category {
            "configuration" | "validation" => ExitCode::DataError,
            "credentials" => ExitCode::NoInput,
            "queue" => ExitCode::Unavailable,
            "io" => ExitCode::IoError,
            _ => ExitCode::Software,
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.as_i32(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_follow_sysexits() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::UsageError.as_i32(), 64);
        assert_eq!(ExitCode::DataError.as_i32(), 65);
        assert_eq!(ExitCode::NoInput.as_i32(), 66);
        assert_eq!(ExitCode::Unavailable.as_i32(), 69);
        assert_eq!(ExitCode::IoError.as_i32(), 74);
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(ExitCode::from_category("configuration"), ExitCode::DataError);
        assert_eq!(ExitCode::from_category("validation"), ExitCode::DataError);
        assert_eq!(ExitCode::from_category("credentials"), ExitCode::NoInput);
        assert_eq!(ExitCode::from_category("queue"), ExitCode::Unavailable);
        assert_eq!(ExitCode::from_category("gpu"), ExitCode::Software);
    }

    #[test]
    fn test_default_is_success() {
        assert_eq!(ExitCode::default(), ExitCode::Success);
    }
}
