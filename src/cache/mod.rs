//! Cache Module
//!
//! Disk-backed response caching: key derivation, envelope codec, the store,
//! and the cacheability policy that decides what enters it.

pub mod envelope;
pub mod entry;
pub mod freshness;
pub mod key;
pub mod policy;
mod request;
mod stats;
mod store;


// Re-export public types
pub use envelope::{decode, encode, HeaderList, ResponseEnvelope};
pub use entry::CacheEntry;
pub use freshness::CacheControlEvaluator;
pub use key::build_key;
pub use policy::{CacheDecision, CacheabilityPolicy, Freshness, FreshnessEvaluator, SkipReason};
pub use request::RequestMeta;
pub use stats::{CacheStats, StatsRecorder};
pub use store::{DiskStore, SweepStats};

// == Public Constants ==
/// Response header carrying the cache disposition
pub const CACHE_STATUS_HEADER: &str = "cache-status";
