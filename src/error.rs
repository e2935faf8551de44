//! Error types for the response cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the response cache.
///
/// A missing or expired entry is not an error: `DiskStore::get` reports it
/// as `Ok(None)`.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Bad `path`, `maxExpiry`, `cleanup` or timeout at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Filesystem failure while reading or writing an entry
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes could not be decoded
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// `set` was called with a zero TTL
    #[error("TTL must be greater than zero")]
    InvalidTtl,

    /// The freshness evaluator could not reach a verdict
    #[error("Cacheability could not be determined: {0}")]
    PolicyIndeterminate(String),

    /// A store operation exceeded its deadline
    #[error("Cache operation timed out")]
    Timeout,

    /// The upstream origin could not be reached
    #[error("Upstream error: {0}")]
    Upstream(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidConfiguration(_) | CacheError::InvalidTtl => StatusCode::BAD_REQUEST,
            CacheError::Upstream(_) => StatusCode::BAD_GATEWAY,
            CacheError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            CacheError::Io(_) | CacheError::Decoding(_) | CacheError::PolicyIndeterminate(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the response cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_maps_to_bad_gateway() {
        let response = CacheError::Upstream("connection refused".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_io_error_conversion() {
        let err: CacheError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, CacheError::Io(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
