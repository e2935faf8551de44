//! Configuration Module
//!
//! Handles loading, validating and managing cache configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CacheError, Result};

/// Smallest accepted value, in seconds, for `maxExpiry` and `cleanup`.
pub const MIN_INTERVAL_SECS: u64 = 2;

/// Cache configuration parameters.
///
/// Field names follow the camelCase keys of the middleware configuration
/// document (`path`, `maxExpiry`, `cleanup`, `addStatusHeader`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Existing, writable directory holding cache entries
    pub path: PathBuf,
    /// Ceiling in seconds applied to every computed TTL
    pub max_expiry: u64,
    /// Interval in seconds between cleanup sweeps
    pub cleanup: u64,
    /// Emit the `Cache-Status` response header
    pub add_status_header: bool,
    /// Deadline in seconds for a single store read or write
    pub store_timeout: u64,
    /// HTTP server port
    pub listen_port: u16,
    /// Origin that cache misses are forwarded to
    pub upstream: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_PATH` - Cache directory (default: empty, must be set)
    /// - `CACHE_MAX_EXPIRY` - TTL ceiling in seconds (default: 300)
    /// - `CACHE_CLEANUP` - Cleanup interval in seconds (default: 300)
    /// - `CACHE_ADD_STATUS_HEADER` - Emit `Cache-Status` (default: true)
    /// - `CACHE_STORE_TIMEOUT` - Store operation deadline in seconds (default: 5)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `UPSTREAM_URL` - Origin base URL (default: http://127.0.0.1:8080)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from an arbitrary variable source; unparseable values
    /// fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            path: lookup("CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            max_expiry: lookup("CACHE_MAX_EXPIRY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_expiry),
            cleanup: lookup("CACHE_CLEANUP")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cleanup),
            add_status_header: lookup("CACHE_ADD_STATUS_HEADER")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.add_status_header),
            store_timeout: lookup("CACHE_STORE_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.store_timeout),
            listen_port: lookup("SERVER_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.listen_port),
            upstream: lookup("UPSTREAM_URL").unwrap_or(defaults.upstream),
        }
    }

    /// Parses a JSON configuration document; missing keys take defaults.
    pub fn from_json(document: &str) -> Result<Self> {
        serde_json::from_str(document)
            .map_err(|e| CacheError::InvalidConfiguration(format!("malformed config: {}", e)))
    }

    /// Rejects values the cache cannot run with.
    ///
    /// Directory existence and writability are checked when the store is
    /// opened.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(CacheError::InvalidConfiguration(
                "path must be set".to_string(),
            ));
        }
        if self.max_expiry < MIN_INTERVAL_SECS {
            return Err(CacheError::InvalidConfiguration(format!(
                "maxExpiry must be at least {} seconds",
                MIN_INTERVAL_SECS
            )));
        }
        if self.cleanup < MIN_INTERVAL_SECS {
            return Err(CacheError::InvalidConfiguration(format!(
                "cleanup must be at least {} seconds",
                MIN_INTERVAL_SECS
            )));
        }
        if self.store_timeout == 0 {
            return Err(CacheError::InvalidConfiguration(
                "storeTimeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn max_expiry(&self) -> Duration {
        Duration::from_secs(self.max_expiry)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            max_expiry: 300,
            cleanup: 300,
            add_status_header: true,
            store_timeout: 5,
            listen_port: 3000,
            upstream: "http://127.0.0.1:8080".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_config() -> Config {
        Config {
            path: PathBuf::from("/tmp/cache"),
            ..Config::default()
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_expiry, 300);
        assert_eq!(config.cleanup, 300);
        assert!(config.add_status_header);
        assert_eq!(config.store_timeout, 5);
        assert_eq!(config.listen_port, 3000);
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("CACHE_PATH", "/var/cache/simplecache"),
            ("CACHE_MAX_EXPIRY", "60"),
            ("CACHE_CLEANUP", "not-a-number"),
            ("CACHE_ADD_STATUS_HEADER", "false"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.path, PathBuf::from("/var/cache/simplecache"));
        assert_eq!(config.max_expiry, 60);
        assert_eq!(config.cleanup, 300);
        assert!(!config.add_status_header);
    }

    #[test]
    fn test_config_from_json_camel_case() {
        let config = Config::from_json(
            r#"{"path": "/data", "maxExpiry": 10, "cleanup": 20, "addStatusHeader": false}"#,
        )
        .unwrap();
        assert_eq!(config.path, PathBuf::from("/data"));
        assert_eq!(config.max_expiry, 10);
        assert_eq!(config.cleanup, 20);
        assert!(!config.add_status_header);
        assert_eq!(config.store_timeout, 5);
    }

    #[test]
    fn test_config_from_json_malformed() {
        let result = Config::from_json("{not json");
        assert!(matches!(result, Err(CacheError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_validate_accepts_minimums() {
        let config = Config {
            max_expiry: 2,
            cleanup: 2,
            ..valid_config()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_small_max_expiry() {
        for max_expiry in [0, 1] {
            let config = Config {
                max_expiry,
                ..valid_config()
            };
            assert!(matches!(
                config.validate(),
                Err(CacheError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_validate_rejects_small_cleanup() {
        let config = Config {
            cleanup: 1,
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_missing_path() {
        assert!(Config::default().validate().is_err());
    }
}
