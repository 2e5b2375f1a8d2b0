// 🌐 HTTP surface - webhook trigger and read-only snapshot
//
// POST /api/webhooks/provider-data-updates   bearer-authenticated sync trigger
// GET  /api/sync                              all brands, cards and links
// GET  /api/health

use crate::db::get_snapshot;
use crate::orchestrator::SyncOrchestrator;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Webhook bearer token; `None` rejects every trigger
    pub secret: Option<String>,
    /// Held for the duration of a triggered run
    pub run_guard: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    pub fn new(conn: Connection, orchestrator: SyncOrchestrator, secret: Option<String>) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
            orchestrator: Arc::new(orchestrator),
            secret,
            run_guard: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

// ============================================================================
// AUTH
// ============================================================================

/// Compare the bearer token against the configured secret.
///
/// Digests are compared so the comparison time does not depend on where the
/// two strings first differ.
fn is_authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return false;
    };
    let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    else {
        return false;
    };

    let expected = Sha256::digest(secret.as_bytes());
    let provided = Sha256::digest(token.as_bytes());
    expected
        .iter()
        .zip(provided.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(json!({ "status": "OK", "version": crate::VERSION })))
}

/// GET /api/sync - Snapshot of all three collections
async fn get_sync_snapshot(State(state): State<AppState>) -> Response {
    let conn = state.db.lock();

    match get_snapshot(&conn) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to read snapshot");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to read data", "details": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// POST /api/webhooks/provider-data-updates - Run one sync
async fn provider_data_updates(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !is_authorized(&headers, state.secret.as_deref()) {
        warn!("rejected unauthorized sync trigger");
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response();
    }

    let Ok(_running) = state.run_guard.try_lock() else {
        warn!("sync trigger rejected: a run is already in progress");
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "Sync already in progress" })),
        )
            .into_response();
    };

    info!("sync triggered by webhook");
    let gathered = state.orchestrator.gather().await;

    let orchestrator = state.orchestrator.clone();
    let db = state.db.clone();
    let applied = tokio::task::spawn_blocking(move || {
        let conn = db.lock();
        orchestrator.apply(&conn, gathered)
    })
    .await;

    match applied {
        Ok(outcome) if outcome.is_success() => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": outcome.summary() })),
        )
            .into_response(),
        Ok(outcome) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Sync failed", "details": outcome.error_message() })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "reconciliation task panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Sync failed", "details": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/sync", get(get_sync_snapshot))
        .route("/webhooks/provider-data-updates", post(provider_data_updates))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
