//! End-to-end HTTP tests
//!
//! Drives the router in-process against a temporary data tree.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use cocdb::api::{AppState, create_router};
use cocdb::config::Config;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn data_tree() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "data/home/buildings/army/barracks.json", r#"{"name":"Barracks","levels":18}"#);
    write(root, "data/home/buildings/army/template.json", "{}");
    write(root, "data/home/buildings/defensive/cannon.json", r#"{"name":"Cannon"}"#);
    write(root, "data/home/buildings/defensive/mortar.json", r#"{"name":"Mortar"}"#);
    write(root, "data/home/troops/elixir/barbarian.json", r#"{"name":"Barbarian"}"#);
    write(root, "data/home/troops/elixir/corrupt.json", "{\"name\":");
    write(root, "static/favicon.ico", "ICO");
    dir
}

fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.app.data_dir = root.join("data");
    config.server.favicon_path = root.join("static/favicon.ico");
    config.cache.ttl = Duration::from_secs(60);
    config
}

fn test_app(config: &Config) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config).unwrap());
    (create_router(Arc::clone(&state)), state)
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, headers, body)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(app, Method::GET, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_root() {
    let dir = data_tree();
    let (app, _) = test_app(&test_config(dir.path()));

    let (status, body) = get_json(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "CoCDB API");
    assert_eq!(body["endpoints"]["health"], "/health");
}

#[tokio::test]
async fn test_health_reports_cache() {
    let dir = data_tree();
    let (app, _) = test_app(&test_config(dir.path()));

    get_json(&app, "/api/home/buildings").await;
    let (status, body) = get_json(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["uptime"].as_str().unwrap().ends_with('s'));
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    assert_eq!(body["cache"]["size"], 1);
    assert_eq!(body["cache"]["misses"], 1);
}

#[tokio::test]
async fn test_list_categories() {
    let dir = data_tree();
    let (app, _) = test_app(&test_config(dir.path()));

    let (status, body) = get_json(&app, "/api/home/buildings").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status": "success",
            "data": [
                {"name": "army", "count": 1, "path": "home/buildings/army"},
                {"name": "defensive", "count": 2, "path": "home/buildings/defensive"}
            ],
            "meta": {"cached": false}
        })
    );
}

#[tokio::test]
async fn test_list_items() {
    let dir = data_tree();
    let (app, _) = test_app(&test_config(dir.path()));

    let (status, body) = get_json(&app, "/api/home/buildings/defensive").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!([
            {"name": "cannon", "path": "home/buildings/defensive/cannon"},
            {"name": "mortar", "path": "home/buildings/defensive/mortar"}
        ])
    );
}

#[tokio::test]
async fn test_get_item_then_cached() {
    let dir = data_tree();
    let (app, state) = test_app(&test_config(dir.path()));

    let (status, first) = get_json(&app, "/api/home/buildings/army/barracks").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"], json!({"name": "Barracks", "levels": 18}));
    assert_eq!(first["meta"]["cached"], false);

    // Served from memory even after the file disappears
    std::fs::remove_file(dir.path().join("data/home/buildings/army/barracks.json")).unwrap();
    let (status, second) = get_json(&app, "/api/home/buildings/army/barracks").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["data"], first["data"]);
    assert_eq!(second["meta"]["cached"], true);

    assert!(state.cache.get("buildings:item:home:army:barracks").is_some());
}

#[tokio::test]
async fn test_cache_expiry_reloads_from_disk() {
    let dir = data_tree();
    let mut config = test_config(dir.path());
    config.cache.ttl = Duration::from_millis(50);
    let (app, _) = test_app(&config);

    let (_, first) = get_json(&app, "/api/home/troops/elixir/barbarian").await;
    assert_eq!(first["data"]["name"], "Barbarian");

    write(
        dir.path(),
        "data/home/troops/elixir/barbarian.json",
        r#"{"name":"Barbarian","housing":1}"#,
    );
    tokio::time::sleep(Duration::from_millis(80)).await;

    let (_, second) = get_json(&app, "/api/home/troops/elixir/barbarian").await;
    assert_eq!(second["meta"]["cached"], false);
    assert_eq!(second["data"]["housing"], 1);
}

#[tokio::test]
async fn test_not_found_messages() {
    let dir = data_tree();
    let (app, _) = test_app(&test_config(dir.path()));

    let (status, body) = get_json(&app, "/api/home/troops/elixir/golem").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({"status": "error", "error": {"code": 404, "message": "troop not found: golem"}})
    );

    let (status, body) = get_json(&app, "/api/home/buildings/walls").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "building category not found: walls");

    let (status, body) = get_json(&app, "/api/home/spells").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "endpoint not found");

    let (status, body) = get_json(&app, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "endpoint not found");
}

#[tokio::test]
async fn test_missing_base_is_internal_error() {
    let dir = data_tree();
    let (app, _) = test_app(&test_config(dir.path()));

    let (status, body) = get_json(&app, "/api/builder/troops").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["message"], "failed to load troop categories");
}

#[tokio::test]
async fn test_corrupt_document_is_not_found() {
    let dir = data_tree();
    let (app, state) = test_app(&test_config(dir.path()));

    let (status, body) = get_json(&app, "/api/home/troops/elixir/corrupt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "troop not found: corrupt");
    // Failures are never cached
    assert_eq!(state.cache.len(), 0);
}

#[tokio::test]
async fn test_traversal_blocked() {
    let dir = data_tree();
    write(dir.path(), "secret.json", r#"{"token":"hunter2"}"#);
    let (app, _) = test_app(&test_config(dir.path()));

    for uri in [
        "/api/home/buildings/army/%2E%2E",
        "/api/%2E%2E/buildings/army/barracks",
        "/api/home/buildings/%2E%2E%2F%2E%2E%2F%2E%2E/secret",
    ] {
        let (status, body) = get_json(&app, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert!(body.get("data").is_none(), "{uri} leaked data");
    }
}

#[tokio::test]
async fn test_key_separator_in_segment_rejected() {
    let dir = data_tree();
    write(dir.path(), "data/a:b/buildings/c/n.json", r#"{"name":"first"}"#);
    write(dir.path(), "data/a/buildings/b:c/n.json", r#"{"name":"second"}"#);
    let (app, state) = test_app(&test_config(dir.path()));

    let (status, body) = get_json(&app, "/api/a:b/buildings/c/n").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "building not found: n");

    let (status, _) = get_json(&app, "/api/a/buildings/b:c/n").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get_json(&app, "/api/home/troops/elixir:x").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "troop category not found: elixir:x");

    let (status, _) = get_json(&app, "/api/home:x/troops").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(state.cache.len(), 0);
}

#[tokio::test]
async fn test_method_not_allowed() {
    let dir = data_tree();
    let (app, _) = test_app(&test_config(dir.path()));

    let (status, _, body) = send(&app, Method::POST, "/health").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], 405);
    assert_eq!(body["error"]["message"], "method not allowed");
}

#[tokio::test]
async fn test_response_headers() {
    let dir = data_tree();
    let (app, _) = test_app(&test_config(dir.path()));

    let (_, headers, _) = send(&app, Method::GET, "/health").await;
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(headers[header::X_XSS_PROTECTION], "1; mode=block");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=60");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_favicon() {
    let dir = data_tree();
    let (app, _) = test_app(&test_config(dir.path()));

    let (status, headers, body) = send(&app, Method::GET, "/favicon.ico").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/x-icon");
    assert_eq!(body, b"ICO");

    let mut config = test_config(dir.path());
    config.server.favicon_path = dir.path().join("static/missing.ico");
    let (app, _) = test_app(&config);
    let (status, _, body) = send(&app, Method::GET, "/favicon.ico").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_cache() {
    let dir = data_tree();
    let (app, state) = test_app(&test_config(dir.path()));

    let mut handles = Vec::new();
    for i in 0..32 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let uri = if i % 2 == 0 {
                "/api/home/buildings/defensive/cannon"
            } else {
                "/api/home/troops/elixir/barbarian"
            };
            get_json(&app, uri).await
        }));
    }

    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["name"].is_string());
    }

    assert_eq!(state.cache.len(), 2);
    let stats = state.cache.stats();
    assert_eq!(stats.hits + stats.misses, 32);
}
