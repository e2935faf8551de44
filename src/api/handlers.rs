//! API Handlers
//!
//! Admin endpoints and the reverse-proxy fallback that cache misses reach.

use axum::{
    body::{self, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName},
    response::Response,
    Json,
};
use tracing::debug;

use crate::api::CacheState;
use crate::error::{CacheError, Result};
use crate::models::{HealthResponse, StatsResponse};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Cache shared with the caching middleware
    pub cache: CacheState,
    /// Client used to reach the origin
    pub client: reqwest::Client,
    /// Origin base URL, without trailing slash
    pub upstream: String,
}

impl AppState {
    pub fn new(cache: CacheState, upstream: impl Into<String>) -> Self {
        Self {
            cache,
            client: reqwest::Client::new(),
            upstream: upstream.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Removes headers that describe a single connection.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let hop_by_hop: [HeaderName; 7] = [
        header::CONNECTION,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ];
    for name in hop_by_hop {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Handler for every path not claimed by an admin route.
///
/// Forwards the request to the origin and relays its response.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", state.upstream, path_and_query);

    let body = body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| CacheError::Upstream(format!("failed to read request body: {}", e)))?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    debug!(method = %parts.method, url = %url, "Forwarding request upstream");
    let upstream = state
        .client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| CacheError::Upstream(e.to_string()))?;

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| CacheError::Upstream(e.to_string()))?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Handler for GET /_cache/stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.store.stats()))
}

/// Handler for GET /_cache/health
///
/// Re-checks that the cache root is still a directory.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let root = state.cache.store.root();
    let available = tokio::fs::metadata(root)
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false);
    Json(HealthResponse::new(root, available))
}
