use crate::observability::metrics;
use crate::pipeline::storage::{ResultStore, SnapshotHandle};
use axum::{
    extract::Path,
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Shared state for the results API.
#[derive(Clone)]
pub struct AppState {
    pub snapshot: Arc<SnapshotHandle>,
    pub store: Arc<dyn ResultStore>,
}

impl AppState {
    /// State over `store`, preloaded with its current generation when there is one.
    pub async fn load(store: Arc<dyn ResultStore>) -> crate::error::Result<Self> {
        let snapshot = Arc::new(SnapshotHandle::new());
        match store.load_current().await? {
            Some(current) => {
                info!("Serving generation {}", current.generation());
                snapshot.swap(current);
            }
            None => warn!("No generation published yet; POST /admin/reload after the first run"),
        }
        Ok(Self { snapshot, store })
    }
}

#[derive(Debug)]
pub enum ApiError {
    /// Nothing has been published yet
    NoGeneration,
    UnknownTable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NoGeneration => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no generation has been published".to_string(),
            ),
            ApiError::UnknownTable(name) => {
                (StatusCode::NOT_FOUND, format!("unknown table '{}'", name))
            }
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Serialize)]
struct TableInfo {
    name: String,
    rows: usize,
    columns: Vec<String>,
}

/// Health check endpoint
async fn health(Extension(state): Extension<AppState>) -> impl IntoResponse {
    metrics::server::request("/health");
    Json(serde_json::json!({
        "status": "healthy",
        "service": "retail-analytics-results",
        "version": env!("CARGO_PKG_VERSION"),
        "generation": state.snapshot.current().map(|s| s.generation().to_string()),
    }))
}

async fn generation(Extension(state): Extension<AppState>) -> Result<impl IntoResponse, ApiError> {
    metrics::server::request("/api/generation");
    let snap = state.snapshot.current().ok_or(ApiError::NoGeneration)?;
    Ok(Json(serde_json::json!({
        "generation": snap.generation(),
        "created_at": snap.created_at(),
        "tables": snap.row_counts(),
    })))
}

async fn summary(Extension(state): Extension<AppState>) -> Result<impl IntoResponse, ApiError> {
    metrics::server::request("/api/summary");
    let snap = state.snapshot.current().ok_or(ApiError::NoGeneration)?;
    Ok(Json(snap.summary().clone()))
}

async fn list_tables(Extension(state): Extension<AppState>) -> Result<impl IntoResponse, ApiError> {
    metrics::server::request("/api/tables");
    let snap = state.snapshot.current().ok_or(ApiError::NoGeneration)?;
    let tables: Vec<TableInfo> = snap
        .table_names()
        .into_iter()
        .filter_map(|name| snap.table(name))
        .map(|t| TableInfo {
            name: t.name.clone(),
            rows: t.len(),
            columns: t.columns.clone(),
        })
        .collect();
    Ok(Json(tables))
}

async fn get_table(
    Extension(state): Extension<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    metrics::server::request("/api/tables/:name");
    let snap = state.snapshot.current().ok_or(ApiError::NoGeneration)?;
    let table = snap.table(&name).ok_or(ApiError::UnknownTable(name))?;
    Ok(Json(table.as_ref().clone()))
}

/// Re-read the store's current generation and swap it in.
async fn reload(Extension(state): Extension<AppState>) -> Result<impl IntoResponse, ApiError> {
    metrics::server::request("/admin/reload");
    let loaded = state.store.load_current().await.map_err(|e| {
        error!("Reload failed: {}", e);
        metrics::server::snapshot_reloaded(false);
        ApiError::Internal(e.to_string())
    })?;
    let snap = loaded.ok_or(ApiError::NoGeneration)?;
    let generation = snap.generation().to_string();
    let previous = state.snapshot.swap(snap);
    metrics::server::snapshot_reloaded(true);
    info!("Reloaded generation {}", generation);
    Ok(Json(serde_json::json!({
        "generation": generation,
        "previous": previous.map(|p| p.generation().to_string()),
    })))
}

async fn prometheus() -> impl IntoResponse {
    metrics::render().unwrap_or_default()
}

/// Create the HTTP router with all routes
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/generation", get(generation))
        .route("/api/summary", get(summary))
        .route("/api/tables", get(list_tables))
        .route("/api/tables/:name", get(get_table))
        .route("/admin/reload", post(reload))
        .route("/metrics", get(prometheus))
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(state: AppState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    println!("🚀 Results API running on http://localhost:{port}");
    println!("💚 Health check: http://localhost:{port}/health");
    println!("📊 Summary:      http://localhost:{port}/api/summary");
    println!("📈 Metrics:      http://localhost:{port}/metrics");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
