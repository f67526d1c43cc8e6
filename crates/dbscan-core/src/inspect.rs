//! Read-only SQLite access shared by the validator and the serving engine.

use crate::{Result, ScanError};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// How a database file should be opened for reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Skip SQLite file locking (`nolock=1`).
    pub nolock: bool,
    /// Treat the file as unchangeable (`immutable=1`).
    pub immutable: bool,
}

impl ReadOptions {
    /// Options used when probing a freshly discovered file.
    pub fn probe() -> Self {
        Self {
            nolock: true,
            immutable: false,
        }
    }
}

/// Build a read-only SQLite URI filename for `path`.
///
/// Each path segment is percent-encoded so `?`, `#` and `%` in file names
/// cannot be mistaken for URI syntax.
pub fn sqlite_uri(path: &Path, options: ReadOptions) -> String {
    let raw = path.to_string_lossy();
    let encoded = raw
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");

    let mut uri = format!("file:{}?mode=ro", encoded);
    if options.nolock {
        uri.push_str("&nolock=1");
    }
    if options.immutable {
        uri.push_str("&immutable=1");
    }
    uri
}

/// Open `path` read-only without creating it.
pub fn open_read_only(path: &Path, options: ReadOptions) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        sqlite_uri(path, options),
        OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// List user tables of the database at `path`, sorted by name.
pub fn list_tables(path: &Path, options: ReadOptions) -> Result<Vec<String>> {
    let conn = open_read_only(path, options)?;
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;

    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut tables = Vec::new();
    for row in rows {
        tables.push(row?);
    }

    Ok(tables)
}

/// Derive the logical name of a database file: its basename without extension.
pub fn logical_name(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| ScanError::Config {
            message: format!("Cannot derive a database name from {}", path.display()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_db(path: &Path, tables: &[&str]) {
        let conn = Connection::open(path).unwrap();
        for table in tables {
            conn.execute(&format!("CREATE TABLE {} (id INTEGER PRIMARY KEY)", table), [])
                .unwrap();
        }
    }

    #[test]
    fn test_sqlite_uri_flags() {
        let path = Path::new("/data/one.db");
        assert_eq!(
            sqlite_uri(path, ReadOptions::default()),
            "file:/data/one.db?mode=ro"
        );
        assert_eq!(
            sqlite_uri(path, ReadOptions::probe()),
            "file:/data/one.db?mode=ro&nolock=1"
        );
        assert_eq!(
            sqlite_uri(
                path,
                ReadOptions {
                    nolock: true,
                    immutable: true
                }
            ),
            "file:/data/one.db?mode=ro&nolock=1&immutable=1"
        );
    }

    #[test]
    fn test_sqlite_uri_escapes_special_characters() {
        let uri = sqlite_uri(Path::new("/data/what?#%.db"), ReadOptions::default());
        assert_eq!(uri, "file:/data/what%3F%23%25.db?mode=ro");
    }

    #[test]
    fn test_list_tables_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tables.db");
        create_db(&path, &["zebra", "apple"]);

        let tables = list_tables(&path, ReadOptions::probe()).unwrap();
        assert_eq!(tables, vec!["apple".to_string(), "zebra".to_string()]);
    }

    #[test]
    fn test_open_read_only_does_not_create_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.db");

        assert!(list_tables(&path, ReadOptions::probe()).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_special_characters_in_file_name_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("odd #name?.db");
        create_db(&path, &["t"]);

        let tables = list_tables(&path, ReadOptions::probe()).unwrap();
        assert_eq!(tables, vec!["t".to_string()]);
    }

    #[test]
    fn test_logical_name_strips_extension() {
        assert_eq!(logical_name(Path::new("/a/b/one.db")).unwrap(), "one");
        assert_eq!(logical_name(Path::new("/a/b/two.sqlite3")).unwrap(), "two");
        assert_eq!(logical_name(Path::new("noext")).unwrap(), "noext");
        assert!(logical_name(Path::new("/")).is_err());
    }
}
