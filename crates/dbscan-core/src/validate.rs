//! Structural validation of candidate database files.
//!
//! Every candidate is opened read-only without locking and its
//! `sqlite_master` catalog is read to the end. Checking the extension or the
//! magic header is not enough: truncated and corrupted files carry a valid
//! header but fail here.

use crate::inspect::{open_read_only, ReadOptions};
use crate::{Result, ScanError};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// A candidate that failed validation, with the reason reported by SQLite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDatabase {
    pub path: String,
    pub reason: String,
}

/// Partition of a candidate list into accepted and skipped paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Accepted paths, in input order.
    pub valid: Vec<String>,
    /// Skipped paths, in input order.
    pub skipped: Vec<SkippedDatabase>,
}

/// Probe a single file.
///
/// Returns `ScanError::ValidationSkip` carrying the SQLite error message
/// verbatim. The connection is dropped before returning on every path.
pub fn validate_database(path: &str) -> Result<()> {
    probe(Path::new(path)).map_err(|e| ScanError::ValidationSkip {
        path: path.to_string(),
        reason: match e {
            ScanError::Database {
                source: Some(source),
                ..
            } => source.to_string(),
            other => other.to_string(),
        },
    })
}

fn probe(path: &Path) -> Result<()> {
    let conn = open_read_only(path, ReadOptions::probe())?;
    let mut stmt = conn.prepare("SELECT * FROM sqlite_master")?;
    let mut rows = stmt.query([])?;
    while rows.next()?.is_some() {}
    Ok(())
}

/// Validate every path independently; one failure never stops the rest.
pub fn validate_databases<S: AsRef<str>>(paths: &[S]) -> ValidationReport {
    let mut report = ValidationReport::default();

    for path in paths {
        let path = path.as_ref();
        match validate_database(path) {
            Ok(()) => report.valid.push(path.to_string()),
            Err(ScanError::ValidationSkip { path, reason }) => {
                debug!("Rejected {}: {}", path, reason);
                report.skipped.push(SkippedDatabase { path, reason });
            }
            Err(other) => report.skipped.push(SkippedDatabase {
                path: path.to_string(),
                reason: other.to_string(),
            }),
        }
    }

    report
}

/// Run [`validate_databases`] on the blocking thread pool.
pub async fn validate_databases_blocking(paths: Vec<String>) -> Result<ValidationReport> {
    tokio::task::spawn_blocking(move || validate_databases(&paths))
        .await
        .map_err(|e| ScanError::Other(format!("Validation task failed: {}", e)))
}
