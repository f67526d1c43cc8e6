//! HTTP request handlers.

use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dbscan_core::inspect::list_tables;
use dbscan_core::{ReadOptions, RegisteredDatabase, ScanError};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Error wrapper mapping library errors onto HTTP responses.
pub struct ApiError(ScanError);

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "ok": false,
            "status": status.as_u16(),
            "error": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// A served database as exposed to clients.
#[derive(Debug, Serialize)]
pub struct DatabaseView {
    pub name: String,
    pub path: String,
    pub is_mutable: bool,
    pub registered_at: String,
    pub tables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn describe(db: RegisteredDatabase, nolock: bool) -> DatabaseView {
    let options = ReadOptions {
        nolock,
        immutable: !db.is_mutable,
    };
    let path = db.path.clone();
    let tables = tokio::task::spawn_blocking(move || list_tables(&path, options))
        .await
        .map_err(|e| ScanError::Other(format!("Table listing task failed: {}", e)))
        .and_then(|res| res);

    let (tables, error) = match tables {
        Ok(tables) => (tables, None),
        Err(e) => {
            warn!("Could not read tables of {}: {}", db.path.display(), e);
            (Vec::new(), Some(e.to_string()))
        }
    };

    DatabaseView {
        name: db.name,
        path: db.path.display().to_string(),
        is_mutable: db.is_mutable,
        registered_at: db.registered_at,
        tables,
        error,
    }
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// `GET /.json`: every served database keyed by logical name.
pub async fn handle_databases(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let databases = state.registry.list()?;
    debug!("Listing {} databases", databases.len());

    let views = futures::future::join_all(
        databases
            .into_iter()
            .map(|db| describe(db, state.options.nolock)),
    )
    .await;

    let mut body = Map::new();
    for view in views {
        body.insert(view.name.clone(), serde_json::to_value(view).map_err(ScanError::from)?);
    }
    Ok(Json(Value::Object(body)))
}

/// `GET /<name>.json`: a single database.
pub async fn handle_database(
    State(state): State<Arc<AppState>>,
    Path(segment): Path<String>,
) -> Result<Json<DatabaseView>, ApiError> {
    let name = segment
        .strip_suffix(".json")
        .ok_or_else(|| ScanError::DatabaseNotFound {
            name: segment.clone(),
        })?;
    let db = state.registry.get(name)?;
    Ok(Json(describe(db, state.options.nolock).await))
}

/// `GET /-/scan.json`: progress of the rescan loop, if one is running.
pub async fn handle_scan_status(State(state): State<Arc<AppState>>) -> Response {
    match &state.scan_status {
        Some(status) => Json(status.snapshot()).into_response(),
        None => Json(json!({"continuous": false})).into_response(),
    }
}
