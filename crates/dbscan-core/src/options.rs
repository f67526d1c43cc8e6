//! Startup configuration of the serving engine and classification of the
//! command's path arguments.

use crate::config::ServeConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Options the serving engine starts with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServeOptions {
    pub host: String,
    pub port: u16,
    /// Files served read-only with `immutable=1`.
    pub immutable: Vec<PathBuf>,
    /// Open databases without SQLite file locking.
    pub nolock: bool,
    pub cors: bool,
    /// Run a single request against the app, print the body and exit.
    pub get: Option<String>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            host: ServeConfig::DEFAULT_HOST.to_string(),
            port: ServeConfig::DEFAULT_PORT,
            immutable: Vec::new(),
            nolock: false,
            cors: false,
            get: None,
        }
    }
}

/// Path arguments split into directories to scan and explicit files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanTargets {
    pub directories: Vec<PathBuf>,
    /// Explicit files, served as given without validation.
    pub files: Vec<PathBuf>,
}

impl ScanTargets {
    /// Classify `paths`; an empty list means the current directory.
    pub fn classify<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut targets = Self::default();
        if paths.is_empty() {
            targets.directories.push(PathBuf::from("."));
            return targets;
        }

        for path in paths {
            let path = path.as_ref();
            if path.is_dir() {
                targets.directories.push(path.to_path_buf());
            } else {
                targets.files.push(path.to_path_buf());
            }
        }
        targets
    }

    pub fn has_directories(&self) -> bool {
        !self.directories.is_empty()
    }
}
