//! HTTP router and handlers

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
};
use tracing::{debug, error};

use super::middleware::{CachePolicy, cors_layer, request_logger, response_headers};
use super::response::{ApiError, ApiResponse};
use crate::cache::TtlCache;
use crate::config::Config;
use crate::data::Loader;
use crate::{Error, Result};

/// Cache of serialized API payloads, shared across handlers
pub type DocumentCache = TtlCache<Arc<Value>>;

/// Shared application state
pub struct AppState {
    /// Data tree reader
    pub loader: Loader,
    /// Payload cache in front of the loader
    pub cache: Arc<DocumentCache>,
    /// Version reported to clients
    pub version: String,
    /// Process start, for uptime
    pub started_at: Instant,
    /// Favicon location on disk
    pub favicon_path: PathBuf,
    /// CORS origins
    cors_origins: Vec<String>,
    /// Per-request timeout
    request_timeout: Duration,
}

impl AppState {
    /// Build state from configuration, starting the cache.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &Config) -> Result<Self> {
        let cache = match config.cache.sweep_interval {
            Some(interval) => TtlCache::with_sweep_interval(config.cache.ttl, interval)?,
            None => TtlCache::new(config.cache.ttl)?,
        };

        Ok(Self {
            loader: Loader::new(&config.app.data_dir),
            cache: Arc::new(cache),
            version: config.app.version.clone(),
            started_at: Instant::now(),
            favicon_path: config.server.favicon_path.clone(),
            cors_origins: config.server.cors_origins.clone(),
            request_timeout: config.server.request_timeout,
        })
    }
}

/// Entity families served under `/api/{base}/{kind}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Buildings (army, defensive, resource, traps)
    Buildings,
    /// Troops (elixir, dark elixir, super)
    Troops,
}

impl EntityKind {
    /// Path segment and cache-key prefix
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buildings => "buildings",
            Self::Troops => "troops",
        }
    }

    /// Noun used in error messages
    pub fn singular(self) -> &'static str {
        match self {
            Self::Buildings => "building",
            Self::Troops => "troop",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ApiError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "buildings" => Ok(Self::Buildings),
            "troops" => Ok(Self::Troops),
            _ => Err(ApiError::not_found("endpoint not found")),
        }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cache_policy = CachePolicy::new(state.cache.ttl());
    let cors = cors_layer(&state.cors_origins);
    let timeout = timeout_layer(state.request_timeout);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/favicon.ico", get(favicon_handler))
        .route("/api/{base}/{kind}", get(list_categories))
        .route("/api/{base}/{kind}/{category}", get(list_items))
        .route("/api/{base}/{kind}/{category}/{name}", get(get_item))
        .fallback(not_found_handler)
        .method_not_allowed_fallback(method_not_allowed_handler)
        .layer(middleware::from_fn(request_logger))
        .layer(middleware::from_fn_with_state(cache_policy, response_headers))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(timeout)
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// `kind:scope:seg1:seg2...`, or `None` when a segment contains the separator
fn cache_key(kind: EntityKind, scope: &str, segments: &[&str]) -> Option<String> {
    if segments.iter().any(|segment| segment.contains(':')) {
        return None;
    }
    let mut key = format!("{kind}:{scope}");
    for segment in segments {
        key.push(':');
        key.push_str(segment);
    }
    Some(key)
}

/// Look `key` up in the cache, loading and storing it on a miss
async fn cached<T, F>(state: &AppState, key: String, load: F) -> std::result::Result<Response, ApiError>
where
    T: Serialize,
    F: Future<Output = std::result::Result<T, ApiError>>,
{
    if let Some(hit) = state.cache.get(&key) {
        debug!(key = %key, "Cache hit");
        return Ok(ApiResponse::with_cache(hit, true).into_response());
    }

    let value = Arc::new(serde_json::to_value(load.await?).map_err(Error::from)?);
    state.cache.set(key, Arc::clone(&value));
    Ok(ApiResponse::with_cache(value, false).into_response())
}

/// Map a loader error, reporting missing or unusable documents as `not_found`
fn document_error(err: Error, not_found: impl FnOnce() -> ApiError) -> ApiError {
    match err {
        Error::NotFound(_) | Error::InvalidPath(_) | Error::InvalidJson(_) => {
            debug!(error = %err, "Document lookup failed");
            not_found()
        }
        other => ApiError::from(other),
    }
}

/// GET /api/{base}/{kind} - categories with item counts
async fn list_categories(
    State(state): State<Arc<AppState>>,
    Path((base, kind)): Path<(String, String)>,
) -> std::result::Result<Response, ApiError> {
    let kind: EntityKind = kind.parse()?;
    let key = cache_key(kind, "categories", &[&base])
        .ok_or_else(|| ApiError::not_found("endpoint not found"))?;

    cached(&state, key, async {
        state
            .loader
            .list_categories(&format!("{base}/{kind}"))
            .await
            .map_err(|e| {
                error!(error = %e, base = %base, kind = %kind, "Failed to list categories");
                ApiError::internal(format!("failed to load {} categories", kind.singular()))
            })
    })
    .await
}

/// GET /api/{base}/{kind}/{category} - items in one category
async fn list_items(
    State(state): State<Arc<AppState>>,
    Path((base, kind, category)): Path<(String, String, String)>,
) -> std::result::Result<Response, ApiError> {
    let kind: EntityKind = kind.parse()?;
    let not_found =
        || ApiError::not_found(format!("{} category not found: {category}", kind.singular()));
    let key = cache_key(kind, "list", &[&base, &category]).ok_or_else(not_found)?;

    cached(&state, key, async {
        state
            .loader
            .list_items(&format!("{base}/{kind}/{category}"))
            .await
            .map_err(|e| document_error(e, not_found))
    })
    .await
}

/// GET /api/{base}/{kind}/{category}/{name} - one entity document
async fn get_item(
    State(state): State<Arc<AppState>>,
    Path((base, kind, category, name)): Path<(String, String, String, String)>,
) -> std::result::Result<Response, ApiError> {
    let kind: EntityKind = kind.parse()?;
    let not_found = || ApiError::not_found(format!("{} not found: {name}", kind.singular()));
    let key = cache_key(kind, "item", &[&base, &category, &name]).ok_or_else(not_found)?;

    cached(&state, key, async {
        state
            .loader
            .get_item(&format!("{base}/{kind}/{category}/{name}"))
            .await
            .map_err(|e| document_error(e, not_found))
    })
    .await
}

/// GET / - service description
async fn root_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "name": "CoCDB API",
        "description": "Clash of Clans Database REST API",
        "version": state.version,
        "endpoints": {
            "health": "/health",
            "buildings": "/api/{base}/buildings",
            "troops": "/api/{base}/troops"
        }
    }))
}

/// GET /health - liveness, uptime and cache statistics
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": state.version,
        "uptime": format_uptime(state.started_at.elapsed()),
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        "cache": state.cache.stats(),
    }))
}

/// GET /favicon.ico - file contents, or 204 when none is installed
async fn favicon_handler(State(state): State<Arc<AppState>>) -> Response {
    match tokio::fs::read(&state.favicon_path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/x-icon")], bytes).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NO_CONTENT.into_response(),
        Err(e) => ApiError::internal(format!("failed to read favicon: {e}")).into_response(),
    }
}

async fn not_found_handler() -> ApiError {
    ApiError::not_found("endpoint not found")
}

async fn method_not_allowed_handler() -> ApiError {
    ApiError::method_not_allowed()
}

/// Render an uptime as `1h2m3s`, dropping leading zero units
fn format_uptime(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
