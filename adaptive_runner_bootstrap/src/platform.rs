// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Platform Probes
//!
//! Host capacity discovery used to fill in resource budgets the operator
//! left at their zero defaults.
//!
//! ## Platform APIs Used
//!
//! - **Hostname**: `/proc/sys/kernel/hostname`, `HOSTNAME` env fallback
//! - **CPU count**: `std::thread::available_parallelism`
//! - **Memory**: `/proc/meminfo` parsing (`MemTotal`, `MemAvailable`)
//! - **Disk**: `libc::statvfs` on the working directory

use std::path::Path;

/// Hostname of this machine, used in events and metrics labels
pub fn hostname() -> String {
    if let Ok(name) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Number of cores the runtime may schedule onto
pub fn available_cores() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

/// Total and available memory in bytes, parsed from `/proc/meminfo`
pub fn memory_info() -> Option<(u64, u64)> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo(&meminfo)
}

fn parse_meminfo(meminfo: &str) -> Option<(u64, u64)> {
    let mut total = None;
    let mut available = None;

    for line in meminfo.lines() {
        if let Some(value) = line.strip_prefix("MemTotal:") {
            total = parse_meminfo_kb(value);
        } else if let Some(value) = line.strip_prefix("MemAvailable:") {
            available = parse_meminfo_kb(value);
        }
        if total.is_some() && available.is_some() {
            break;
        }
    }

    match (total, available) {
        (Some(t), Some(a)) => Some((t, a)),
        _ => None,
    }
}

fn parse_meminfo_kb(value: &str) -> Option<u64> {
    value
        .trim()
        .split_whitespace()
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Free bytes on the filesystem holding `path`
pub fn available_disk_space(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    // SAFETY: statvfs writes into the zeroed struct we hand it and reads
    // only the NUL-terminated path.
    unsafe {
        let mut stats: libc::statvfs = std::mem::zeroed();
        if libc::statvfs(c_path.as_ptr(), &mut stats) != 0 {
            return None;
        }
        Some(stats.f_bavail as u64 * stats.f_frsize as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_is_nonempty() {
        assert!(!hostname().is_empty());
    }

    #[test]
    fn test_available_cores_at_least_one() {
        assert!(available_cores() >= 1);
    }

    #[test]
    fn test_parse_meminfo() {
        let sample = "MemTotal:       16316412 kB\nMemFree:         1099004 kB\nMemAvailable:    8122992 kB\n";
        let (total, available) = parse_meminfo(sample).unwrap();
        assert_eq!(total, 16_316_412 * 1024);
        assert_eq!(available, 8_122_992 * 1024);
    }

    #[test]
    fn test_parse_meminfo_missing_fields() {
        assert!(parse_meminfo("MemFree: 12 kB\n").is_none());
    }

    #[test]
    fn test_disk_space_on_tmp() {
        let space = available_disk_space(Path::new("/tmp"));
        assert!(space.is_some());
    }
}
