//! Background task that periodically rescans and admits new databases.
//!
//! The loop owns the known set. It starts idle, waits one interval, runs a
//! cycle, and repeats. A cycle error is logged and the loop keeps ticking.
//! Cycles never overlap: when a cycle outlasts the interval the next one
//! starts right after it completes.

use crate::cancel::CancellationToken;
use crate::config::LoopConfig;
use crate::registration::{rescan_and_register, CycleReport, KnownPaths};
use crate::registry::DatabaseRegistry;
use crate::scanner::DatabaseScanner;
use crate::{Result, ScanError};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Convert a `--scan-interval` value in seconds into a tick period.
pub fn interval_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ScanError::Config {
            message: format!("Scan interval must be a positive number of seconds, got {}", secs),
        });
    }
    let interval = Duration::try_from_secs_f64(secs).map_err(|e| ScanError::Config {
        message: format!("Invalid scan interval {}: {}", secs, e),
    })?;
    if interval < LoopConfig::MIN_INTERVAL {
        warn!(
            "Scan interval {:?} too short, using {:?}",
            interval,
            LoopConfig::MIN_INTERVAL
        );
        return Ok(LoopConfig::MIN_INTERVAL);
    }
    Ok(interval)
}

/// Deadline of the first tick, one period from now.
///
/// Saturates instead of overflowing `Instant` for huge periods.
fn first_tick(period: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(period)
        .or_else(|| now.checked_add(LoopConfig::MAX_TICK))
        .unwrap_or(now)
}

/// Snapshot of the loop's progress, served at `/-/scan.json`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStatus {
    pub directories: Vec<String>,
    pub interval_secs: f64,
    pub cycles: u64,
    pub known: usize,
    pub last_completed_at: Option<String>,
    pub last_cycle: Option<CycleReport>,
    pub last_error: Option<String>,
}

/// Shared read handle to the loop status.
#[derive(Debug, Clone, Default)]
pub struct ScanStatusHandle {
    inner: Arc<RwLock<ScanStatus>>,
}

impl ScanStatusHandle {
    pub fn snapshot(&self) -> ScanStatus {
        self.inner.read().map(|s| s.clone()).unwrap_or_default()
    }

    fn update(&self, f: impl FnOnce(&mut ScanStatus)) {
        if let Ok(mut status) = self.inner.write() {
            f(&mut status);
        }
    }
}

/// Periodic incremental registration loop.
pub struct ScanLoop {
    scanner: Arc<dyn DatabaseScanner>,
    registry: DatabaseRegistry,
    directories: Vec<PathBuf>,
    interval: Duration,
    known: KnownPaths,
    cancel: CancellationToken,
    status: ScanStatusHandle,
}

impl ScanLoop {
    pub fn new(
        scanner: Arc<dyn DatabaseScanner>,
        registry: DatabaseRegistry,
        directories: Vec<PathBuf>,
        interval: Duration,
    ) -> Self {
        let status = ScanStatusHandle::default();
        status.update(|s| {
            s.directories = directories
                .iter()
                .map(|d| d.display().to_string())
                .collect();
            s.interval_secs = interval.as_secs_f64();
        });

        Self {
            scanner,
            registry,
            directories,
            interval,
            known: KnownPaths::new(),
            cancel: CancellationToken::new(),
            status,
        }
    }

    /// Seed the known set with paths registered before the loop starts.
    pub fn with_known(mut self, known: KnownPaths) -> Self {
        self.status.update(|s| s.known = known.len());
        self.known = known;
        self
    }

    /// Stop the loop at its next suspension point when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn status(&self) -> ScanStatusHandle {
        self.status.clone()
    }

    /// Spawn the loop. The handle may be dropped: the task is never joined
    /// by the server and dies with the runtime. It resolves to the final
    /// known set after cancellation.
    pub fn start(self) -> tokio::task::JoinHandle<KnownPaths> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> KnownPaths {
        info!(
            "Starting rescan loop over {} directories every {:?}",
            self.directories.len(),
            self.interval
        );

        let period = self.interval.min(LoopConfig::MAX_TICK);
        let mut ticker = time::interval_at(first_tick(period), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.cancel.cancelled() => break,
            }

            match self.cycle().await {
                Ok(()) => {}
                Err(ScanError::ScanCancelled) => break,
                Err(e) => {
                    error!("Scan error: {}", e);
                    let message = e.to_string();
                    self.status.update(|s| {
                        s.cycles += 1;
                        s.last_error = Some(message);
                        s.last_completed_at = Some(Utc::now().to_rfc3339());
                    });
                }
            }
        }

        info!("Rescan loop stopped with {} known databases", self.known.len());
        self.known
    }

    async fn cycle(&mut self) -> Result<()> {
        debug!("Rescan tick");
        let report = rescan_and_register(
            self.scanner.as_ref(),
            &self.registry,
            &self.directories,
            &mut self.known,
        )
        .await?;
        report.log();

        let known = self.known.len();
        self.status.update(|s| {
            s.cycles += 1;
            s.known = known;
            s.last_error = None;
            s.last_cycle = Some(report);
            s.last_completed_at = Some(Utc::now().to_rfc3339());
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::tests::{create_db, ScriptedScanner};
    use tempfile::TempDir;

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while std::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[test]
    fn test_interval_from_secs() {
        assert_eq!(interval_from_secs(2.5).unwrap(), Duration::from_millis(2500));
        assert_eq!(interval_from_secs(0.001).unwrap(), LoopConfig::MIN_INTERVAL);
        assert!(interval_from_secs(0.0).is_err());
        assert!(interval_from_secs(-1.0).is_err());
        assert!(interval_from_secs(f64::NAN).is_err());
        assert!(interval_from_secs(f64::INFINITY).is_err());
        assert_eq!(
            interval_from_secs(1e19).unwrap(),
            Duration::from_secs(10_000_000_000_000_000_000)
        );
    }

    #[tokio::test]
    async fn test_loop_with_huge_interval_stays_idle() {
        let temp_dir = TempDir::new().unwrap();
        let registry = DatabaseRegistry::new();
        let scanner = Arc::new(ScriptedScanner::new(vec![Ok(Vec::new())]));
        let token = CancellationToken::new();
        let scan_loop = ScanLoop::new(
            scanner,
            registry.clone(),
            vec![temp_dir.path().to_path_buf()],
            interval_from_secs(1e19).unwrap(),
        )
        .with_cancellation(token.clone());
        let status = scan_loop.status();
        let handle = scan_loop.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());
        assert_eq!(status.snapshot().cycles, 0);
        assert_eq!(status.snapshot().interval_secs, 1e19);

        token.cancel();
        let known = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
        assert!(known.is_empty());
    }

    #[tokio::test]
    async fn test_loop_admits_databases_that_appear_later() {
        let temp_dir = TempDir::new().unwrap();
        let one = create_db(&temp_dir.path().join("one.db"));
        let two = create_db(&temp_dir.path().join("two.db"));

        let registry = DatabaseRegistry::new();
        registry.add_database(&one, true).unwrap();

        let scanner = Arc::new(ScriptedScanner::new(vec![
            Ok(vec![one.clone()]),
            Ok(vec![one.clone(), two.clone()]),
        ]));
        let token = CancellationToken::new();
        let scan_loop = ScanLoop::new(
            scanner,
            registry.clone(),
            vec![temp_dir.path().to_path_buf()],
            LoopConfig::MIN_INTERVAL,
        )
        .with_known([one.clone()].into_iter().collect())
        .with_cancellation(token.clone());
        let status = scan_loop.status();
        let handle = scan_loop.start();

        assert!(wait_for(|| registry.len().unwrap() == 2).await);
        assert!(wait_for(|| status.snapshot().known == 2).await);

        token.cancel();
        let known = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
        assert!(known.contains(&one));
        assert!(known.contains(&two));
        assert_eq!(registry.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_loop_survives_scan_errors() {
        let temp_dir = TempDir::new().unwrap();
        let one = create_db(&temp_dir.path().join("one.db"));

        let registry = DatabaseRegistry::new();
        let scanner = Arc::new(ScriptedScanner::new(vec![
            Err("first failure".into()),
            Err("second failure".into()),
            Ok(vec![one.clone()]),
        ]));
        let token = CancellationToken::new();
        let scan_loop = ScanLoop::new(
            scanner,
            registry.clone(),
            vec![temp_dir.path().to_path_buf()],
            LoopConfig::MIN_INTERVAL,
        )
        .with_cancellation(token.clone());
        let status = scan_loop.status();
        let _handle = scan_loop.start();

        assert!(wait_for(|| status.snapshot().last_cycle.is_some()).await);
        let snapshot = status.snapshot();
        assert!(snapshot.cycles >= 3);
        assert!(snapshot.last_error.is_none());
        assert_eq!(registry.len().unwrap(), 1);
        token.cancel();
    }

    #[tokio::test]
    async fn test_loop_is_idle_until_first_tick() {
        let temp_dir = TempDir::new().unwrap();
        let one = create_db(&temp_dir.path().join("one.db"));

        let registry = DatabaseRegistry::new();
        let scanner = Arc::new(ScriptedScanner::new(vec![Ok(vec![one])]));
        let token = CancellationToken::new();
        let scan_loop = ScanLoop::new(
            scanner,
            registry.clone(),
            vec![temp_dir.path().to_path_buf()],
            Duration::from_secs(3600),
        )
        .with_cancellation(token.clone());
        let status = scan_loop.status();
        let handle = scan_loop.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.is_empty().unwrap());
        assert_eq!(status.snapshot().cycles, 0);
        assert_eq!(status.snapshot().interval_secs, 3600.0);

        token.cancel();
        let known = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("cancel should interrupt the idle wait")
            .unwrap();
        assert!(known.is_empty());
    }
}
