//! Caching Middleware
//!
//! Wraps any axum service: replays stored responses on a hit, otherwise runs
//! the inner service and stores the result when the policy allows it. Cache
//! failures are logged and degrade to an uncached exchange; they never fail
//! the request.

use std::future::Future;
use std::time::Duration;

use axum::{
    body::{self, Body},
    extract::{Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tracing::{debug, warn};

use crate::cache::{
    decode, encode, CacheDecision, CacheabilityPolicy, DiskStore, RequestMeta, ResponseEnvelope,
    CACHE_STATUS_HEADER,
};
use crate::config::Config;
use crate::error::{CacheError, Result};

/// Disposition reported in the `Cache-Status` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Error,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Error => "error",
        }
    }
}

/// State shared by every invocation of the middleware.
#[derive(Clone)]
pub struct CacheState {
    pub store: DiskStore,
    pub policy: CacheabilityPolicy,
    pub add_status_header: bool,
    pub store_timeout: Duration,
}

impl CacheState {
    pub fn new(store: DiskStore, policy: CacheabilityPolicy) -> Self {
        Self {
            store,
            policy,
            add_status_header: true,
            store_timeout: Duration::from_secs(5),
        }
    }

    /// Applies `addStatusHeader` and `storeTimeout` from the configuration.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.add_status_header = config.add_status_header;
        self.store_timeout = config.store_timeout();
        self
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.store_timeout, operation)
            .await
            .map_err(|_| CacheError::Timeout)?
    }

    fn tag(&self, response: &mut Response, status: CacheStatus) {
        if self.add_status_header {
            response.headers_mut().insert(
                CACHE_STATUS_HEADER,
                HeaderValue::from_static(status.as_str()),
            );
        }
    }

    async fn lookup(&self, key: &str) -> Result<Option<Response>> {
        let replay = self.store.get_decoded(key, |bytes| {
            decode(&bytes).and_then(|envelope| envelope.to_response())
        });
        self.bounded(replay).await
    }

    async fn store_envelope(
        &self,
        key: &str,
        envelope: &ResponseEnvelope,
        ttl: Duration,
    ) -> Result<()> {
        let payload = encode(envelope)?;
        self.bounded(self.store.set(key, &payload, ttl)).await
    }
}

/// Layers the caching middleware onto `router`.
pub fn with_cache(router: Router, cache: CacheState) -> Router {
    router.layer(middleware::from_fn_with_state(cache, cache_response))
}

/// Middleware function; see [`with_cache`].
pub async fn cache_response(
    State(cache): State<CacheState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let meta = RequestMeta::from_parts(&parts);
    let key = meta.cache_key();
    let mut disposition = CacheStatus::Miss;

    match cache.lookup(&key).await {
        Ok(Some(mut response)) => {
            debug!(key = %key, "Cache hit");
            cache.tag(&mut response, CacheStatus::Hit);
            return response;
        }
        Ok(None) => debug!(key = %key, "Cache miss"),
        Err(err) => {
            warn!(key = %key, error = %err, "Error reading cache entry");
            disposition = CacheStatus::Error;
        }
    }

    let response = next.run(Request::from_parts(parts, body)).await;
    let (mut head, body) = response.into_parts();
    head.headers.remove(CACHE_STATUS_HEADER);

    // Non-cacheable bodies stream through untouched
    let CacheDecision::Store { ttl } = cache.policy.decide(&meta, head.status, &head.headers)
    else {
        let mut response = Response::from_parts(head, body);
        cache.tag(&mut response, disposition);
        return response;
    };

    let body = match body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(key = %key, error = %err, "Failed to read upstream response body");
            return CacheError::Upstream(err.to_string()).into_response();
        }
    };

    let envelope = ResponseEnvelope::from_parts(head.status, &head.headers, body.to_vec());
    match cache.store_envelope(&key, &envelope, ttl).await {
        Ok(()) => debug!(key = %key, ttl_secs = ttl.as_secs(), "Stored response"),
        Err(err) => warn!(key = %key, error = %err, "Error setting cache item"),
    }

    let mut response = Response::from_parts(head, Body::from(body));
    cache.tag(&mut response, disposition);
    response
}
