//! Centralized configuration for dbscan.
//!
//! This module provides configuration constants for the external scanner,
//! the serving engine, and the rescan loop.

use std::time::Duration;

/// External scanner configuration.
pub struct ScannerConfig;

impl ScannerConfig {
    /// Executable name looked up on `PATH`.
    pub const BINARY_NAME: &'static str = "sqlite-scanner";
    /// Environment variable that overrides the executable location.
    pub const BINARY_ENV_VAR: &'static str = "DBSCAN_SCANNER_BIN";
    /// Flag requesting one JSON record per output line.
    pub const JSONL_FLAG: &'static str = "--jsonl";
}

/// Serving engine defaults.
pub struct ServeConfig;

impl ServeConfig {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 8001;
    /// Largest response body `--get` will buffer.
    pub const GET_BODY_LIMIT: usize = 16 * 1024 * 1024;
    /// Prefix of the stdout line announcing the bound port.
    pub const PORT_ANNOUNCE_PREFIX: &'static str = "DBSCAN_PORT=";
}

/// Rescan loop configuration.
pub struct LoopConfig;

impl LoopConfig {
    /// Intervals below this are rounded up.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(100);
    /// Longest tick period the timer is armed with; longer intervals idle.
    pub const MAX_TICK: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);
}
