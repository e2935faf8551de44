//! Response models for the admin API
//!
//! DTOs serialized into the bodies of the `/_cache/*` endpoints.

pub mod responses;

// Re-export commonly used types
pub use responses::{HealthResponse, StatsResponse};
