//! API Module
//!
//! HTTP surface of the cache: the caching middleware, admin endpoints and
//! the reverse proxy.
//!
//! # Endpoints
//! - `GET /_cache/health` - Health check endpoint
//! - `GET /_cache/stats` - Cache statistics
//! - anything else - Forwarded to the origin through the cache

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use handlers::*;
pub use middleware::{cache_response, with_cache, CacheState, CacheStatus};
pub use routes::create_router;
