//! API Routes
//!
//! Configures the Axum router: admin endpoints plus a cached reverse proxy.

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{health_handler, proxy_handler, stats_handler, AppState};
use super::middleware::with_cache;

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /_cache/health` - Health check endpoint
/// - `GET /_cache/stats` - Cache statistics
/// - fallback - Reverse proxy to the origin, wrapped by the cache
///
/// # Middleware
/// - CORS: Allows any origin on the admin endpoints
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let proxy = with_cache(
        Router::new()
            .fallback(proxy_handler)
            .with_state(state.clone()),
        state.cache.clone(),
    );

    let admin = Router::new()
        .route("/_cache/stats", get(stats_handler))
        .route("/_cache/health", get(health_handler))
        .layer(cors)
        .with_state(state);

    admin
        .fallback_service(proxy)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CacheState;
    use crate::cache::{CacheControlEvaluator, CacheabilityPolicy, DiskStore, CACHE_STATUS_HEADER};
    use axum::{
        body::{self, Body},
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    async fn app_for(dir: &TempDir) -> Router {
        let store = DiskStore::open(dir.path()).await.unwrap();
        let policy =
            CacheabilityPolicy::new(Arc::new(CacheControlEvaluator::new()), Duration::from_secs(60));
        // Nothing listens on the discard port, so proxied requests fail fast
        create_router(AppState::new(
            CacheState::new(store, policy),
            "http://127.0.0.1:9",
        ))
    }

    async fn send(app: Router, method: Method, uri: &str) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_admin_routes_bypass_cache() {
        let dir = TempDir::new().unwrap();
        let app = app_for(&dir).await;

        let health = send(app.clone(), Method::GET, "/_cache/health").await;
        assert_eq!(health.status(), StatusCode::OK);
        assert!(health.headers().get(CACHE_STATUS_HEADER).is_none());
        assert_eq!(json_body(health).await["status"], "healthy");

        let stats = send(app, Method::GET, "/_cache/stats").await;
        assert_eq!(stats.status(), StatusCode::OK);
        assert!(stats.headers().get(CACHE_STATUS_HEADER).is_none());
        assert_eq!(json_body(stats).await["misses"], 0);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let dir = TempDir::new().unwrap();
        let app = app_for(&dir).await;

        let response = send(app.clone(), Method::GET, "/some/page").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers().get(CACHE_STATUS_HEADER).unwrap(),
            "miss"
        );

        // The failed exchange went through the store lookup
        let stats = send(app, Method::GET, "/_cache/stats").await;
        assert_eq!(json_body(stats).await["misses"], 1);
    }

    #[tokio::test]
    async fn test_admin_routes_are_get_only() {
        let dir = TempDir::new().unwrap();
        let app = app_for(&dir).await;

        let response = send(app, Method::POST, "/_cache/stats").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
