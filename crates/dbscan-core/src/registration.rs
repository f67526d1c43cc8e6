//! One scan cycle: scan, diff against the known set, validate, register.
//!
//! Admission is additive. A path enters the known set only once it has been
//! registered, so paths that were skipped or hit a name conflict are tried
//! again on the next cycle, and a known path is never registered twice.

use crate::registry::DatabaseRegistry;
use crate::scanner::DatabaseScanner;
use crate::validate::{validate_databases_blocking, SkippedDatabase};
use crate::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Paths already registered by this process. Compared by string equality.
pub type KnownPaths = HashSet<String>;

/// A path that validated but could not be registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationFailure {
    pub path: String,
    pub error: String,
}

/// Outcome of one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Number of paths the scanner returned.
    pub found: usize,
    /// Newly registered paths, in scanner order.
    pub registered: Vec<String>,
    pub skipped: Vec<SkippedDatabase>,
    pub failed: Vec<RegistrationFailure>,
}

impl CycleReport {
    /// Report skips and failures on the log (stderr), successes at info.
    pub fn log(&self) {
        for skipped in &self.skipped {
            warn!("Skipping {}: {}", skipped.path, skipped.reason);
        }
        for failure in &self.failed {
            warn!("Could not serve {}: {}", failure.path, failure.error);
        }
        for path in &self.registered {
            info!("Serving {}", path);
        }
    }
}

/// Paths in `found` that are not in `known`, in `found` order, without repeats.
pub fn new_paths(found: &[String], known: &KnownPaths) -> Vec<String> {
    let mut seen = HashSet::new();
    found
        .iter()
        .filter(|path| !known.contains(*path) && seen.insert(path.as_str()))
        .cloned()
        .collect()
}

/// Register `paths` as mutable databases, recording each success in `known`.
///
/// Every path is attempted; a failure is returned in the list and the path
/// stays out of `known`.
pub fn register_paths(
    registry: &DatabaseRegistry,
    paths: &[String],
    known: &mut KnownPaths,
) -> (Vec<String>, Vec<RegistrationFailure>) {
    let mut registered = Vec::new();
    let mut failed = Vec::new();

    for path in paths {
        match registry.add_database(path, true) {
            Ok(entry) => {
                debug!("Added {} as {}", path, entry.name);
                known.insert(path.clone());
                registered.push(path.clone());
            }
            Err(e) => failed.push(RegistrationFailure {
                path: path.clone(),
                error: e.to_string(),
            }),
        }
    }

    (registered, failed)
}

/// Run one full cycle over `directories`.
///
/// Scanner errors are returned and leave `known` untouched; per-path problems
/// end up in the report.
pub async fn rescan_and_register(
    scanner: &dyn DatabaseScanner,
    registry: &DatabaseRegistry,
    directories: &[PathBuf],
    known: &mut KnownPaths,
) -> Result<CycleReport> {
    let found = scanner.scan(directories).await?;
    let candidates = new_paths(&found, known);
    debug!(
        "Scan returned {} paths, {} not yet known",
        found.len(),
        candidates.len()
    );

    let mut report = CycleReport {
        found: found.len(),
        ..Default::default()
    };
    if candidates.is_empty() {
        return Ok(report);
    }

    let validation = validate_databases_blocking(candidates).await?;
    report.skipped = validation.skipped;

    let (registered, failed) = register_paths(registry, &validation.valid, known);
    report.registered = registered;
    report.failed = failed;

    Ok(report)
}
