//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::path::Path;

use serde::Serialize;

use crate::cache::CacheStats;

/// Response body for the stats endpoint (GET /_cache/stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Reads that returned a live entry
    pub hits: u64,
    /// Reads that found no live entry
    pub misses: u64,
    /// Failed reads and writes
    pub errors: u64,
    /// Stored entries that could not be decoded
    pub decode_errors: u64,
    /// Responses written to the store
    pub stores: u64,
    /// Entries removed by cleanup
    pub swept: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            errors: stats.errors,
            decode_errors: stats.decode_errors,
            stores: stats.stores,
            swept: stats.swept,
        }
    }
}

/// Response body for the health endpoint (GET /_cache/health)
///
/// `status` is `"degraded"` when the cache root is no longer a directory;
/// the proxy keeps serving uncached in that state.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Cache root directory
    pub cache_path: String,
    /// RFC 3339 time of the check
    pub checked_at: String,
}

impl HealthResponse {
    pub fn new(cache_path: &Path, store_available: bool) -> Self {
        Self {
            status: if store_available { "healthy" } else { "degraded" },
            cache_path: cache_path.display().to_string(),
            checked_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
