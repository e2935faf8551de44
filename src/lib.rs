//! Simplecache - A disk-backed HTTP response cache
//!
//! Stores cacheable responses on disk under a canonical request key, clamps
//! their lifetime to a configured ceiling and sweeps expired entries in the
//! background.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::{with_cache, AppState, CacheState};
pub use cache::{CacheabilityPolicy, DiskStore, ResponseEnvelope};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::CleanupScheduler;
