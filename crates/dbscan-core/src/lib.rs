//! dbscan core - discover, validate and register SQLite databases.
//!
//! This crate holds everything except the HTTP layer: running the external
//! `sqlite-scanner`, probing candidate files, the live registry of served
//! databases, and the background loop that admits databases appearing after
//! startup.
//!
//! # Example
//!
//! ```rust,ignore
//! use dbscan_core::{rescan_and_register, DatabaseRegistry, KnownPaths, SqliteScanner};
//!
//! #[tokio::main]
//! async fn main() -> dbscan_core::Result<()> {
//!     let scanner = SqliteScanner::locate()?;
//!     let registry = DatabaseRegistry::new();
//!     let mut known = KnownPaths::new();
//!
//!     let report = rescan_and_register(&scanner, &registry, &["/data".into()], &mut known).await?;
//!     println!("Serving {} databases", report.registered.len());
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod inspect;
pub mod options;
pub mod registration;
pub mod registry;
pub mod scan_loop;
pub mod scanner;
pub mod validate;

pub use cancel::{CancellationToken, CancelledError};
pub use error::{Result, ScanError};
pub use inspect::ReadOptions;
pub use options::{ScanTargets, ServeOptions};
pub use registration::{rescan_and_register, CycleReport, KnownPaths, RegistrationFailure};
pub use registry::{DatabaseRegistry, RegisteredDatabase};
pub use scan_loop::{interval_from_secs, ScanLoop, ScanStatus, ScanStatusHandle};
pub use scanner::{DatabaseScanner, SqliteScanner};
pub use validate::{validate_databases, SkippedDatabase, ValidationReport};
