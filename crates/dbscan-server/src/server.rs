//! HTTP server implementation using Axum.

use crate::handler::{handle_database, handle_databases, handle_health, handle_scan_status};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use dbscan_core::config::ServeConfig;
use dbscan_core::{DatabaseRegistry, ScanStatusHandle, ServeOptions};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    /// Live table of served databases, also written by the rescan loop
    pub registry: DatabaseRegistry,
    pub options: ServeOptions,
    /// Present only in continuous mode
    pub scan_status: Option<ScanStatusHandle>,
}

/// Build the router serving the registry.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = state.options.cors;

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/.json", get(handle_databases))
        .route("/-/scan.json", get(handle_scan_status))
        .route("/:db", get(handle_database))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors {
        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        app
    }
}

/// Bind and serve `app` in the background.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(app: Router, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    // host may be a name such as localhost or a bare IPv6 literal
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}

/// Run a single in-process request and return its status and body.
pub async fn get_once(app: Router, path: &str) -> anyhow::Result<(StatusCode, String)> {
    let request = Request::builder().uri(path).body(Body::empty())?;
    let response = app.oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), ServeConfig::GET_BODY_LIMIT).await?;
    Ok((status, String::from_utf8_lossy(&bytes).into_owned()))
}
