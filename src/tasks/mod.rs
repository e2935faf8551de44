//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Cache cleanup: deletes expired entries from the disk store

mod cleanup;

pub use cleanup::CleanupScheduler;
