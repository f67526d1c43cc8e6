//! External scanner invocation.
//!
//! File-format detection lives in the `sqlite-scanner` executable. It is run
//! with `--jsonl` and the directories to walk, and prints one JSON record per
//! discovered database. Only the `path` field is used.

use crate::cancel::CancellationToken;
use crate::config::ScannerConfig;
use crate::{Result, ScanError};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Source of candidate database paths.
#[async_trait]
pub trait DatabaseScanner: Send + Sync {
    /// Return the database files found under `directories`, in scanner order.
    async fn scan(&self, directories: &[PathBuf]) -> Result<Vec<String>>;
}

/// One line of scanner output.
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerRecord {
    pub path: String,
}

/// Runs the `sqlite-scanner` executable as a subprocess.
#[derive(Debug, Clone)]
pub struct SqliteScanner {
    binary: PathBuf,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl SqliteScanner {
    /// Use a specific scanner executable.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
            cancel: None,
        }
    }

    /// Find the scanner: `DBSCAN_SCANNER_BIN` first, then `PATH`.
    pub fn locate() -> Result<Self> {
        if let Some(binary) = std::env::var_os(ScannerConfig::BINARY_ENV_VAR) {
            let binary = PathBuf::from(binary);
            debug!("Using scanner from {}: {}", ScannerConfig::BINARY_ENV_VAR, binary.display());
            return Ok(Self::with_binary(binary));
        }

        which::which(ScannerConfig::BINARY_NAME)
            .map(Self::with_binary)
            .map_err(|_| ScanError::ScannerUnavailable {
                binary: PathBuf::from(ScannerConfig::BINARY_NAME),
            })
    }

    /// Kill the scanner and fail with `ScanTimeout` if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort an in-flight scan when `token` is cancelled.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, directories: &[PathBuf]) -> Result<std::process::Output> {
        if !self.binary.exists() {
            return Err(ScanError::ScannerUnavailable {
                binary: self.binary.clone(),
            });
        }

        let child = Command::new(&self.binary)
            .arg(ScannerConfig::JSONL_FLAG)
            .args(directories)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ScanError::ScannerUnavailable {
                    binary: self.binary.clone(),
                },
                _ => ScanError::io_with_path(e, &self.binary),
            })?;

        // Dropping the wait future kills the child (kill_on_drop).
        let wait = child.wait_with_output();
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        let output = match self.timeout {
            Some(limit) => tokio::select! {
                res = tokio::time::timeout(limit, wait) => {
                    res.map_err(|_| ScanError::ScanTimeout(limit))?
                }
                _ = cancelled => return Err(ScanError::ScanCancelled),
            },
            None => tokio::select! {
                res = wait => res,
                _ = cancelled => return Err(ScanError::ScanCancelled),
            },
        };

        output.map_err(|e| ScanError::io_with_path(e, &self.binary))
    }
}

#[async_trait]
impl DatabaseScanner for SqliteScanner {
    async fn scan(&self, directories: &[PathBuf]) -> Result<Vec<String>> {
        if let Some(token) = &self.cancel {
            token.check()?;
        }

        debug!(
            "Running {} over {} directories",
            self.binary.display(),
            directories.len()
        );
        let output = self.run(directories).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ScanError::ScannerFailed {
                status: output.status.code(),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let paths = parse_scanner_output(&stdout)?;
        info!("Scanner found {} databases", paths.len());
        Ok(paths)
    }
}

/// Parse line-delimited scanner records into paths, keeping output order.
pub fn parse_scanner_output(stdout: &str) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: ScannerRecord =
            serde_json::from_str(line).map_err(|e| ScanError::ScannerOutput {
                line: line.to_string(),
                message: e.to_string(),
            })?;
        paths.push(record.path);
    }
    Ok(paths)
}
