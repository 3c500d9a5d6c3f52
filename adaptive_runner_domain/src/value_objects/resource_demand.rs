// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Demand Value Object
//!
//! The resources an experiment asks for, normalised to machine units:
//! CPU cores, RAM and disk in bytes, GPU slots, per-device GPU memory in
//! bytes, and the minimum number of GPU devices to spread the slots over.
//!
//! Wire payloads carry humanised sizes (`"2gb"`, `"512 MiB"`); this module
//! accepts both those strings and plain byte counts.

use byte_unit::Byte;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::error::RunnerError;

/// Parses a humanised byte size (`"16gib"`, `"512mb"`, `"1024"`) into bytes.
///
/// Empty strings and `"0"` both mean zero, matching the CLI convention
/// where zero selects the autodetected default.
pub fn parse_byte_size(text: &str) -> Result<u64, RunnerError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    Byte::parse_str(trimmed, true)
        .map(|b| b.as_u64())
        .map_err(|e| RunnerError::ValidationError(format!("invalid byte size {:?}: {}", text, e)))
}

fn de_byte_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Count(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Count(n) => Ok(n),
        Raw::Text(s) => parse_byte_size(&s).map_err(de::Error::custom),
    }
}

/// Resources demanded by a single experiment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDemand {
    /// CPU cores to reserve
    #[serde(default)]
    pub cpus: u32,

    /// RAM in bytes
    #[serde(default, deserialize_with = "de_byte_size")]
    pub ram: u64,

    /// Local disk in bytes
    #[serde(default, deserialize_with = "de_byte_size")]
    pub hdd: u64,

    /// Total GPU slots wanted across all participating devices
    #[serde(default)]
    pub gpus: u32,

    /// GPU memory in bytes assigned to each participating device
    #[serde(default, deserialize_with = "de_byte_size")]
    pub gpu_mem: u64,

    /// Minimum number of devices the slots must span; zero or one leaves
    /// the allocator free to concentrate on a single card
    #[serde(default)]
    pub gpu_count: u32,
}

impl ResourceDemand {
    /// Whether the demand asks for any GPU capacity at all
    pub fn wants_gpu(&self) -> bool {
        self.gpus > 0 || self.gpu_mem > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_byte_size_forms() {
        assert_eq!(parse_byte_size("0").unwrap(), 0);
        assert_eq!(parse_byte_size("").unwrap(), 0);
        assert_eq!(parse_byte_size("1024").unwrap(), 1024);
        assert_eq!(parse_byte_size("1kb").unwrap(), 1000);
        assert_eq!(parse_byte_size("1kib").unwrap(), 1024);
        assert_eq!(parse_byte_size("2gb").unwrap(), 2_000_000_000);
        assert!(parse_byte_size("two gigs").is_err());
    }

    #[test]
    fn test_deserialize_mixed_forms() {
        let demand: ResourceDemand = serde_json::from_str(
            r#"{"cpus": 2, "ram": "512mb", "hdd": 1048576, "gpus": 4, "gpu_mem": "1gib", "gpu_count": 2}"#,
        )
        .unwrap();
        assert_eq!(demand.cpus, 2);
        assert_eq!(demand.ram, 512_000_000);
        assert_eq!(demand.hdd, 1_048_576);
        assert_eq!(demand.gpus, 4);
        assert_eq!(demand.gpu_mem, 1_073_741_824);
        assert_eq!(demand.gpu_count, 2);
        assert!(demand.wants_gpu());
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let demand: ResourceDemand = serde_json::from_str(r#"{"cpus": 1}"#).unwrap();
        assert_eq!(demand.ram, 0);
        assert_eq!(demand.gpus, 0);
        assert!(!demand.wants_gpu());
    }
}
