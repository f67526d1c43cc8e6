//! dbscan - scan directories for SQLite databases and serve them over HTTP.
//!
//! Directories given on the command line are walked by the external
//! `sqlite-scanner`, every discovered file is validated, and the valid ones
//! are served. With `--scan-interval` the directories are rescanned in the
//! background and new databases join the running server.

mod handler;
mod server;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use clap::{Args as ClapArgs, Parser};
use dbscan_core::config::ServeConfig;
use dbscan_core::{
    interval_from_secs, rescan_and_register, CancellationToken, DatabaseRegistry, KnownPaths,
    ScanLoop, ScanTargets, ServeOptions, SqliteScanner,
};
use server::AppState;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Options of the serving engine. `--nolock` is not among them: discovered
/// files are always opened without locking.
#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Host to bind to
    #[arg(long, default_value = ServeConfig::DEFAULT_HOST)]
    host: String,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value_t = ServeConfig::DEFAULT_PORT)]
    port: u16,

    /// Database files to serve as immutable
    #[arg(short, long, value_name = "FILE")]
    immutable: Vec<PathBuf>,

    /// Enable CORS by serving Access-Control-Allow-Origin: *
    #[arg(long)]
    cors: bool,

    /// Run an HTTP GET request against this path, print results and exit
    #[arg(long, value_name = "PATH")]
    get: Option<String>,
}

impl ServeArgs {
    fn into_options(self) -> ServeOptions {
        ServeOptions {
            host: self.host,
            port: self.port,
            immutable: self.immutable,
            nolock: true,
            cors: self.cors,
            get: self.get,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "dbscan")]
#[command(about = "Scan directories for SQLite files and serve them")]
struct Args {
    /// Directories to scan and database files to serve (default: .)
    paths: Vec<PathBuf>,

    /// Re-scan directories for new databases every N seconds (minimum 0.1)
    #[arg(long, value_name = "SECONDS")]
    scan_interval: Option<f64>,

    /// Path to the sqlite-scanner executable
    #[arg(long, value_name = "PATH")]
    scanner_bin: Option<PathBuf>,

    /// Kill a scan that runs longer than N seconds
    #[arg(long, value_name = "SECONDS")]
    scan_timeout: Option<f64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(flatten)]
    serve: ServeArgs,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stderr keeps stdout clean for --get output and the port announcement
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn build_scanner(args: &Args, cancel: &CancellationToken) -> Result<SqliteScanner> {
    let mut scanner = match &args.scanner_bin {
        Some(binary) => SqliteScanner::with_binary(binary),
        None => SqliteScanner::locate()?,
    };
    if let Some(secs) = args.scan_timeout {
        let timeout = Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|t| !t.is_zero())
            .with_context(|| format!("Invalid --scan-timeout: {}", secs))?;
        scanner = scanner.timeout(timeout);
    }
    Ok(scanner.cancel_on(cancel.clone()))
}

/// Register explicit files; any failure is a usage error.
fn register_explicit(
    registry: &DatabaseRegistry,
    targets: &ScanTargets,
    options: &ServeOptions,
    known: &mut KnownPaths,
) -> Result<()> {
    for file in &targets.files {
        let is_mutable = !options.immutable.contains(file);
        registry
            .add_database(file, is_mutable)
            .with_context(|| format!("Cannot serve {}", file.display()))?;
        known.insert(file.to_string_lossy().into_owned());
    }
    for file in &options.immutable {
        if registry.contains_path(file)? {
            continue;
        }
        registry
            .add_database(file, false)
            .with_context(|| format!("Cannot serve {}", file.display()))?;
        known.insert(file.to_string_lossy().into_owned());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let targets = ScanTargets::classify(&args.paths);
    let options = args.serve.clone().into_options();
    let registry = DatabaseRegistry::new();
    let cancel = CancellationToken::new();
    let mut known = KnownPaths::new();

    register_explicit(&registry, &targets, &options, &mut known)?;

    let mut scan_loop = None;
    if targets.has_directories() {
        let scanner = build_scanner(&args, &cancel)?;
        let report =
            rescan_and_register(&scanner, &registry, &targets.directories, &mut known).await?;
        report.log();

        if let Some(secs) = args.scan_interval {
            let interval = interval_from_secs(secs)?;
            scan_loop = Some(
                ScanLoop::new(
                    Arc::new(scanner),
                    registry.clone(),
                    targets.directories.clone(),
                    interval,
                )
                .with_known(known)
                .with_cancellation(cancel.clone()),
            );
        }
    }

    let state = Arc::new(AppState {
        registry,
        options: options.clone(),
        scan_status: scan_loop.as_ref().map(ScanLoop::status),
    });
    let app = server::build_router(state);

    if let Some(path) = &options.get {
        if let Some(scan_loop) = scan_loop {
            scan_loop.start();
        }
        let (status, body) = server::get_once(app, path).await?;
        println!("{}", body);
        std::process::exit(if status == StatusCode::OK { 0 } else { 1 });
    }

    let addr = server::start_server(app, &options.host, options.port).await?;

    // Announce the port for callers that bind to port 0
    println!("{}{}", ServeConfig::PORT_ANNOUNCE_PREFIX, addr.port());
    info!("Serving on http://{}", addr);

    // The loop task is detached and abandoned at exit.
    if let Some(scan_loop) = scan_loop {
        scan_loop.start();
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    cancel.cancel();

    Ok(())
}
