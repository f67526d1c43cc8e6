//! Live table of served databases, keyed by logical name.
//!
//! The registry is internally synchronized: the rescan loop inserts while
//! request handlers read. Callers never add their own locking around it.

use crate::inspect::logical_name;
use crate::{Result, ScanError};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// A database currently served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredDatabase {
    pub name: String,
    pub path: PathBuf,
    pub is_mutable: bool,
    pub registered_at: String,
}

/// Cloneable handle to the shared registry.
#[derive(Debug, Clone, Default)]
pub struct DatabaseRegistry {
    databases: Arc<RwLock<BTreeMap<String, RegisteredDatabase>>>,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, RegisteredDatabase>>> {
        self.databases
            .read()
            .map_err(|_| ScanError::Other("Failed to acquire registry read lock".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, RegisteredDatabase>>> {
        self.databases
            .write()
            .map_err(|_| ScanError::Other("Failed to acquire registry write lock".to_string()))
    }

    /// Add a database under the basename of `path` (extension stripped).
    ///
    /// Re-adding the same path is a no-op that returns the existing entry.
    /// A name already held by a different path fails with
    /// `RegistrationConflict` and leaves the registry unchanged.
    pub fn add_database(&self, path: impl AsRef<Path>, is_mutable: bool) -> Result<RegisteredDatabase> {
        let path = path.as_ref();
        let name = logical_name(path)?;

        let metadata = std::fs::metadata(path).map_err(|e| ScanError::io_with_path(e, path))?;
        if !metadata.is_file() {
            return Err(ScanError::Io {
                message: "not a regular file".to_string(),
                path: Some(path.to_path_buf()),
                source: None,
            });
        }

        let mut databases = self.write()?;
        if let Some(existing) = databases.get(&name) {
            if existing.path == path {
                return Ok(existing.clone());
            }
            return Err(ScanError::RegistrationConflict {
                name,
                existing: existing.path.display().to_string(),
                path: path.display().to_string(),
            });
        }

        let entry = RegisteredDatabase {
            name: name.clone(),
            path: path.to_path_buf(),
            is_mutable,
            registered_at: Utc::now().to_rfc3339(),
        };
        databases.insert(name, entry.clone());
        debug!("Registered database {} at {}", entry.name, entry.path.display());

        Ok(entry)
    }

    /// Look up a database by logical name.
    pub fn get(&self, name: &str) -> Result<RegisteredDatabase> {
        self.read()?
            .get(name)
            .cloned()
            .ok_or_else(|| ScanError::DatabaseNotFound {
                name: name.to_string(),
            })
    }

    /// All databases, ordered by name.
    pub fn list(&self) -> Result<Vec<RegisteredDatabase>> {
        Ok(self.read()?.values().cloned().collect())
    }

    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    pub fn contains_path(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        Ok(self.read()?.values().any(|db| db.path == path))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, relative: &str) -> PathBuf {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_add_database_uses_basename() {
        let temp_dir = TempDir::new().unwrap();
        let path = touch(temp_dir.path(), "subdir/two.db");
        let registry = DatabaseRegistry::new();

        let entry = registry.add_database(&path, true).unwrap();

        assert_eq!(entry.name, "two");
        assert_eq!(entry.path, path);
        assert!(entry.is_mutable);
        assert_eq!(registry.len().unwrap(), 1);
        assert_eq!(registry.get("two").unwrap(), entry);
    }

    #[test]
    fn test_add_same_path_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = touch(temp_dir.path(), "one.db");
        let registry = DatabaseRegistry::new();

        let first = registry.add_database(&path, true).unwrap();
        let second = registry.add_database(&path, true).unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn test_name_collision_is_conflict() {
        let temp_dir = TempDir::new().unwrap();
        let a = touch(temp_dir.path(), "a/data.db");
        let b = touch(temp_dir.path(), "b/data.sqlite");
        let registry = DatabaseRegistry::new();

        registry.add_database(&a, true).unwrap();
        let err = registry.add_database(&b, true).unwrap_err();

        match err {
            ScanError::RegistrationConflict { name, existing, path } => {
                assert_eq!(name, "data");
                assert_eq!(existing, a.display().to_string());
                assert_eq!(path, b.display().to_string());
            }
            other => panic!("expected RegistrationConflict, got {:?}", other),
        }
        assert_eq!(registry.len().unwrap(), 1);
        assert_eq!(registry.get("data").unwrap().path, a);
    }

    #[test]
    fn test_missing_file_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let registry = DatabaseRegistry::new();

        let err = registry
            .add_database(temp_dir.path().join("ghost.db"), true)
            .unwrap_err();

        assert!(matches!(err, ScanError::Io { .. }));
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_directory_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("folder.db");
        std::fs::create_dir_all(&dir).unwrap();
        let registry = DatabaseRegistry::new();

        assert!(registry.add_database(&dir, true).is_err());
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_list_is_sorted_and_lookup_misses() {
        let temp_dir = TempDir::new().unwrap();
        let registry = DatabaseRegistry::new();
        registry.add_database(touch(temp_dir.path(), "zeta.db"), true).unwrap();
        registry.add_database(touch(temp_dir.path(), "alpha.db"), false).unwrap();

        let names: Vec<String> = registry.list().unwrap().into_iter().map(|db| db.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(registry.names().unwrap(), names);
        assert!(!registry.get("alpha").unwrap().is_mutable);
        assert!(registry
            .contains_path(temp_dir.path().join("zeta.db"))
            .unwrap());
        assert!(matches!(
            registry.get("missing"),
            Err(ScanError::DatabaseNotFound { .. })
        ));
    }

    #[test]
    fn test_clones_share_state_across_threads() {
        let temp_dir = TempDir::new().unwrap();
        let registry = DatabaseRegistry::new();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                let path = touch(temp_dir.path(), &format!("db{}.db", i));
                std::thread::spawn(move || registry.add_database(path, true).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len().unwrap(), 8);
    }

    #[test]
    fn test_poisoned_lock_is_an_error() {
        let registry = DatabaseRegistry::new();
        let clone = registry.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.databases.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(registry.len().is_err());
        assert!(registry.is_empty().is_err());
        assert!(registry.list().is_err());
    }
}
