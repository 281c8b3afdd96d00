use crate::analyzer::Analyzer;
use crate::cache::CitationCountCache;
use crate::config::Config;
use crate::error::{PathfinderError, Result};
use crate::query::QueryClient;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Check if a port is available by attempting to bind to it
async fn check_port_available(port: u16) -> bool {
    tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .is_ok()
}

/// HTTP front-end for path queries
///
/// Every request gets a fresh [`Analyzer`]; the query client (and with it the
/// global in-flight limit) and the citation-count cache are shared.
pub struct PathServer {
    client: Arc<QueryClient>,
    citation_counts: Arc<CitationCountCache>,
    api_key: String,
    config: Config,
}

impl PathServer {
    /// Create a new path server
    pub fn new(client: Arc<QueryClient>, config: Config) -> Result<Self> {
        // API key is optional if authless mode is enabled
        let api_key = if config.http_server.authless {
            String::new()
        } else {
            std::env::var(&config.http_server.api_key_env).map_err(|_| {
                PathfinderError::Config(format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable, or enable authless mode.",
                    config.http_server.api_key_env
                ))
            })?
        };
        Ok(Self::with_api_key(client, config, api_key))
    }

    fn with_api_key(client: Arc<QueryClient>, config: Config, api_key: String) -> Self {
        let citation_counts = Arc::new(CitationCountCache::new(
            config.exploration.citation_cache_capacity,
        ));
        Self {
            client,
            citation_counts,
            api_key,
            config,
        }
    }

    /// Run the HTTP server
    pub async fn run(&self) -> Result<()> {
        let port = self.config.http_server.port;
        let app = self.create_router();

        let addr = format!("127.0.0.1:{}", port);
        log::info!("Starting path server on http://{}", addr);
        log::info!("Path endpoint: http://{}/paths?id1=<id>&id2=<id>", addr);

        if !check_port_available(port).await {
            return Err(PathfinderError::Config(format!(
                "Port {} is already in use. Stop the other process or set http_server.port in config.toml",
                port
            )));
        }

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            PathfinderError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;

        axum::serve(listener, app).await.map_err(|e| {
            PathfinderError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            ))
        })?;

        Ok(())
    }

    /// Create the axum router
    fn create_router(&self) -> Router {
        let allowed_origins = self.config.http_server.allowed_origins.clone();

        // Explicit origins make preflight answers match the per-request check.
        let cors = if allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        let state = AppState {
            client: Arc::clone(&self.client),
            citation_counts: Arc::clone(&self.citation_counts),
            config: Arc::new(self.config.clone()),
            api_key: Arc::from(self.api_key.as_str()),
            served: Arc::new(AtomicU64::new(0)),
            started: Instant::now(),
        };

        Router::new()
            .route("/paths", get(handle_paths))
            .route("/stats", get(handle_stats))
            .route("/health", get(handle_health))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(state)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    client: Arc<QueryClient>,
    citation_counts: Arc<CitationCountCache>,
    config: Arc<Config>,
    api_key: Arc<str>,
    served: Arc<AtomicU64>,
    started: Instant,
}

impl AppState {
    fn authorize(&self, headers: &HeaderMap) -> std::result::Result<(), Response> {
        if self.config.http_server.authless {
            return Ok(());
        }
        validate_auth(headers, &self.api_key)?;
        validate_origin(headers, &self.config.http_server.allowed_origins)
    }
}

#[derive(Debug, Deserialize)]
struct PathParams {
    id1: i64,
    id2: i64,
}

/// `GET /paths?id1=..&id2=..` -> `[[id, ..], ..]`
async fn handle_paths(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PathParams>,
) -> Response {
    if let Err(response) = state.authorize(&headers) {
        return response;
    }

    let analyzer = Analyzer::from_config(
        Arc::clone(&state.client),
        Arc::clone(&state.citation_counts),
        &state.config,
    );
    let result = analyzer.find_path_ids(params.id1, params.id2).await;
    state.served.fetch_add(1, Ordering::Relaxed);

    match result {
        Ok(paths) => (StatusCode::OK, Json(paths)).into_response(),
        Err(e) => error_response(&params, e),
    }
}

async fn handle_stats(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = state.authorize(&headers) {
        return response;
    }
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "queries": state.client.stats(),
            "path_requests": state.served.load(Ordering::Relaxed),
            "cached_citation_counts": state.citation_counts.len(),
            "uptime_secs": state.started.elapsed().as_secs(),
        })),
    )
        .into_response()
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "pathfinder",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

fn error_response(params: &PathParams, error: PathfinderError) -> Response {
    let status = match &error {
        PathfinderError::UnknownEntity(_) => StatusCode::NOT_FOUND,
        PathfinderError::InvalidExpression { .. } => StatusCode::BAD_REQUEST,
        PathfinderError::RemoteQuery(_)
        | PathfinderError::RemoteService { .. }
        | PathfinderError::QueryAborted(_)
        | PathfinderError::FetchFailed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::NOT_FOUND {
        log::info!("Path query {} -> {}: {}", params.id1, params.id2, error);
    } else {
        log::error!("Path query {} -> {} failed: {}", params.id1, params.id2, error);
    }
    (
        status,
        Json(serde_json::json!({
            "error": error.to_string()
        })),
    )
        .into_response()
}

/// Validate Authorization header
fn validate_auth(headers: &HeaderMap, expected_key: &str) -> std::result::Result<(), Response> {
    let auth_header = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": "Missing Authorization header",
                    "message": "Use 'Authorization: Bearer <api-key>' header"
                })),
            )
                .into_response()
        })?;

    let provided_key = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Invalid Authorization header format",
                "message": "Use 'Authorization: Bearer <api-key>' header"
            })),
        )
            .into_response()
    })?;

    if provided_key != expected_key {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Invalid API key"
            })),
        )
            .into_response());
    }

    Ok(())
}

/// Validate Origin header (prevents DNS rebinding attacks)
fn validate_origin(headers: &HeaderMap, allowed_origins: &[String]) -> std::result::Result<(), Response> {
    // No configured origins: allow all
    if allowed_origins.is_empty() {
        return Ok(());
    }

    // Requests without an Origin are not from a browser
    let origin = match headers.get("origin").and_then(|h| h.to_str().ok()) {
        Some(o) => o,
        None => return Ok(()),
    };

    if allowed_origins.iter().any(|allowed| origin == allowed) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "error": "Origin not allowed",
                "message": format!("Origin '{}' is not in the allowed origins list", origin)
            })),
        )
            .into_response())
    }
}
