//! HTTP middleware: response headers and request logging

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Method, Request, header},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

/// `Cache-Control` directive advertised on GET responses
#[derive(Debug, Clone)]
pub struct CachePolicy {
    directive: HeaderValue,
}

impl CachePolicy {
    /// Public caching for `max_age`, truncated to whole seconds
    pub fn new(max_age: Duration) -> Self {
        let directive = HeaderValue::from_str(&format!("public, max-age={}", max_age.as_secs()))
            .unwrap_or_else(|_| HeaderValue::from_static("no-cache"));
        Self { directive }
    }
}

/// Adds security headers to every response and `Cache-Control` to GETs
pub async fn response_headers(
    State(policy): State<CachePolicy>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let is_get = request.method() == Method::GET;
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("1; mode=block"),
    );
    if is_get {
        headers.insert(header::CACHE_CONTROL, policy.directive);
    }

    response
}

/// Logs one structured line per request
pub async fn request_logger(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    let user_agent = header_str(request.headers(), header::USER_AGENT.as_str());
    let request_id = header_str(request.headers(), "x-request-id");
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let remote_addr = client_addr(request.headers(), peer);

    let response = next.run(request).await;

    let bytes = body_size(&response);
    info!(
        method = %method,
        path = %path,
        query = %query,
        status = response.status().as_u16(),
        duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        bytes = bytes,
        remote_addr = %remote_addr,
        user_agent = %user_agent,
        request_id = %request_id,
        "http request"
    );

    response
}

/// Client address as seen through proxies.
///
/// `True-Client-IP`, then `X-Real-IP`, then the first `X-Forwarded-For` hop;
/// values that are not IP addresses are ignored. Falls back to the peer.
fn client_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("true-client-ip")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
        })
        .and_then(|v| v.trim().parse::<IpAddr>().ok());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.to_string(),
        (None, None) => String::new(),
    }
}

/// Body length when known up front (buffered bodies such as `Json`)
fn body_size(response: &Response) -> Option<u64> {
    response.body().size_hint().exact()
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// CORS for read-only access from the configured origins
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
        .allow_credentials(false)
        .max_age(Duration::from_secs(300))
}
