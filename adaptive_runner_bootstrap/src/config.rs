// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Runner Configuration
//!
//! Bootstrap-phase configuration structure.
//!
//! ## Design Philosophy
//!
//! `RunnerConfig` holds **validated** configuration after command-line
//! parsing, environment resolution and default application. It is
//! immutable once built, which makes it safe to share by reference across
//! every task in the daemon without synchronisation.
//!
//! Zero is the sentinel for "autodetect" on the resource limits, matching
//! the CLI convention: `--max-cores 0` means all cores, `--max-mem 0`
//! means available RAM, `--max-disk 0` means 85% of free disk.

use std::path::PathBuf;
use std::time::Duration;

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Info, warnings, and errors (default)
    #[default]
    Info,
    /// All messages including debug
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    /// Convert to a tracing Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Immutable, validated daemon configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    log_level: LogLevel,
    amqp_url: Option<String>,
    mgmt_port: u16,
    sqs_certs_dir: Option<PathBuf>,
    queue_match: String,
    queue_mismatch: String,
    working_dir: PathBuf,
    max_cores: u32,
    max_mem: u64,
    max_disk: u64,
    visible_devices: String,
    cpu_only: bool,
    prom_port: u16,
    test_mode: bool,
}

impl RunnerConfig {
    /// Create a new configuration builder
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::default()
    }

    /// Log level
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// AMQP broker URL, when the AMQP transport is configured
    pub fn amqp_url(&self) -> Option<&str> {
        self.amqp_url.as_deref()
    }

    /// Admin port of the broker management interface
    pub fn mgmt_port(&self) -> u16 {
        self.mgmt_port
    }

    /// Credentials root for the cloud transport
    pub fn sqs_certs_dir(&self) -> Option<&PathBuf> {
        self.sqs_certs_dir.as_ref()
    }

    /// Queue name must match this expression to be considered
    pub fn queue_match(&self) -> &str {
        &self.queue_match
    }

    /// Queue name must not match this expression; empty disables the
    /// negative filter
    pub fn queue_mismatch(&self) -> &str {
        &self.queue_mismatch
    }

    /// Local working directory for task storage
    pub fn working_dir(&self) -> &PathBuf {
        &self.working_dir
    }

    /// CPU core budget; zero means every available core
    pub fn max_cores(&self) -> u32 {
        self.max_cores
    }

    /// RAM budget in bytes; zero means autodetect
    pub fn max_mem(&self) -> u64 {
        self.max_mem
    }

    /// Disk budget in bytes; zero means 85% of free space
    pub fn max_disk(&self) -> u64 {
        self.max_disk
    }

    /// Visible GPU filter: comma-separated UUIDs or indexes, or `all`
    pub fn visible_devices(&self) -> &str {
        &self.visible_devices
    }

    /// Continue without GPUs even when none are usable
    pub fn cpu_only(&self) -> bool {
        self.cpu_only
    }

    /// Prometheus endpoint port
    pub fn prom_port(&self) -> u16 {
        self.prom_port
    }

    /// Shortened intervals for test deployments
    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    /// Baseline interval between queue scans
    pub fn service_interval(&self) -> Duration {
        if self.test_mode {
            Duration::from_secs(5)
        } else {
            Duration::from_secs(15)
        }
    }

    /// Deadline applied to every broker call
    pub fn broker_deadline(&self) -> Duration {
        Duration::from_secs(15)
    }

    /// Upper bound for exponential backoff
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_secs(180)
    }
}

/// Builder for RunnerConfig
#[derive(Debug, Default)]
pub struct RunnerConfigBuilder {
    log_level: Option<LogLevel>,
    amqp_url: Option<String>,
    mgmt_port: Option<u16>,
    sqs_certs_dir: Option<PathBuf>,
    queue_match: Option<String>,
    queue_mismatch: Option<String>,
    working_dir: Option<PathBuf>,
    max_cores: u32,
    max_mem: u64,
    max_disk: u64,
    visible_devices: Option<String>,
    cpu_only: bool,
    prom_port: Option<u16>,
    test_mode: bool,
}

impl RunnerConfigBuilder {
    /// Set the log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Set the AMQP broker URL
    pub fn amqp_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !url.is_empty() {
            self.amqp_url = Some(url);
        }
        self
    }

    /// Set the management interface port
    pub fn mgmt_port(mut self, port: u16) -> Self {
        self.mgmt_port = Some(port);
        self
    }

    /// Set the cloud credentials root directory
    pub fn sqs_certs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sqs_certs_dir = Some(dir.into());
        self
    }

    /// Set the queue match expression
    pub fn queue_match(mut self, expr: impl Into<String>) -> Self {
        self.queue_match = Some(expr.into());
        self
    }

    /// Set the queue mismatch expression
    pub fn queue_mismatch(mut self, expr: impl Into<String>) -> Self {
        self.queue_mismatch = Some(expr.into());
        self
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the CPU core budget
    pub fn max_cores(mut self, cores: u32) -> Self {
        self.max_cores = cores;
        self
    }

    /// Set the RAM budget in bytes
    pub fn max_mem(mut self, bytes: u64) -> Self {
        self.max_mem = bytes;
        self
    }

    /// Set the disk budget in bytes
    pub fn max_disk(mut self, bytes: u64) -> Self {
        self.max_disk = bytes;
        self
    }

    /// Set the visible device filter
    pub fn visible_devices(mut self, filter: impl Into<String>) -> Self {
        self.visible_devices = Some(filter.into());
        self
    }

    /// Allow running without usable GPUs
    pub fn cpu_only(mut self, enabled: bool) -> Self {
        self.cpu_only = enabled;
        self
    }

    /// Set the Prometheus endpoint port
    pub fn prom_port(mut self, port: u16) -> Self {
        self.prom_port = Some(port);
        self
    }

    /// Enable test-mode intervals
    pub fn test_mode(mut self, enabled: bool) -> Self {
        self.test_mode = enabled;
        self
    }

    /// Build the configuration.
    ///
    /// Fails when no working directory was provided.
    pub fn build(self) -> Result<RunnerConfig, String> {
        let working_dir = self
            .working_dir
            .ok_or_else(|| "working directory must be configured".to_string())?;

        Ok(RunnerConfig {
            log_level: self.log_level.unwrap_or_default(),
            amqp_url: self.amqp_url,
            mgmt_port: self.mgmt_port.unwrap_or(15672),
            sqs_certs_dir: self.sqs_certs_dir,
            queue_match: self
                .queue_match
                .unwrap_or_else(|| "^(rmq|sqs)_.*$".to_string()),
            queue_mismatch: self.queue_mismatch.unwrap_or_default(),
            working_dir,
            max_cores: self.max_cores,
            max_mem: self.max_mem,
            max_disk: self.max_disk,
            visible_devices: self.visible_devices.unwrap_or_else(|| "all".to_string()),
            cpu_only: self.cpu_only,
            prom_port: self.prom_port.unwrap_or(9090),
            test_mode: self.test_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = RunnerConfig::builder().working_dir("/tmp").build().unwrap();
        assert_eq!(config.queue_match(), "^(rmq|sqs)_.*$");
        assert_eq!(config.queue_mismatch(), "");
        assert_eq!(config.visible_devices(), "all");
        assert_eq!(config.mgmt_port(), 15672);
        assert!(config.amqp_url().is_none());
        assert_eq!(config.service_interval(), Duration::from_secs(15));
    }

    #[test]
    fn test_missing_working_dir_fails() {
        assert!(RunnerConfig::builder().build().is_err());
    }

    #[test]
    fn test_test_mode_shortens_interval() {
        let config = RunnerConfig::builder()
            .working_dir("/tmp")
            .test_mode(true)
            .build()
            .unwrap();
        assert_eq!(config.service_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_empty_amqp_url_stays_unset() {
        let config = RunnerConfig::builder()
            .working_dir("/tmp")
            .amqp_url("")
            .build()
            .unwrap();
        assert!(config.amqp_url().is_none());
    }
}
