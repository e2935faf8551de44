//! Cache Entry Module
//!
//! Defines a persisted cache entry and its self-describing on-disk framing.
//!
//! Layout: magic `SCE1`, expiry as big-endian `u64` Unix milliseconds, key
//! length as big-endian `u32`, key bytes, payload.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{CacheError, Result};

const MAGIC: &[u8; 4] = b"SCE1";

/// Bytes needed to read the expiry without touching key or payload.
pub const EXPIRY_HEADER_LEN: usize = MAGIC.len() + 8;

const FIXED_HEADER_LEN: usize = EXPIRY_HEADER_LEN + 4;

// == Cache Entry ==
/// A single persisted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The full cache key, kept to detect file-name hash collisions
    pub key: String,
    /// Opaque stored bytes (an encoded envelope)
    pub payload: Vec<u8>,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry expiring `ttl` from now.
    pub fn new(key: String, payload: Vec<u8>, ttl: Duration) -> Self {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        Self {
            key,
            payload,
            expires_at: current_timestamp_ms().saturating_add(ttl_ms),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches `expires_at`.
    pub fn is_expired(&self) -> bool {
        is_expired_at(self.expires_at, current_timestamp_ms())
    }

    /// Returns remaining TTL in milliseconds, `0` once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.expires_at.saturating_sub(current_timestamp_ms())
    }

    // == Serialization ==
    /// Frames the entry for writing to disk.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let key_len = u32::try_from(self.key.len())
            .map_err(|_| CacheError::Decoding("cache key too long".to_string()))?;

        let mut out = Vec::with_capacity(FIXED_HEADER_LEN + self.key.len() + self.payload.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.expires_at.to_be_bytes());
        out.extend_from_slice(&key_len.to_be_bytes());
        out.extend_from_slice(self.key.as_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Parses a framed entry read from disk.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let expires_at = parse_expiry(bytes)?;
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(CacheError::Decoding("entry header truncated".to_string()));
        }

        let mut len_buf = [0u8; 4];
        len_buf.copy_from_slice(&bytes[EXPIRY_HEADER_LEN..FIXED_HEADER_LEN]);
        let key_len = u32::from_be_bytes(len_buf) as usize;

        let rest = &bytes[FIXED_HEADER_LEN..];
        if key_len > rest.len() {
            return Err(CacheError::Decoding("entry key truncated".to_string()));
        }
        let (key_bytes, payload) = rest.split_at(key_len);
        let key = String::from_utf8(key_bytes.to_vec())
            .map_err(|_| CacheError::Decoding("entry key is not UTF-8".to_string()))?;

        Ok(Self {
            key,
            payload: payload.to_vec(),
            expires_at,
        })
    }
}

/// Reads the expiry from the leading bytes of a framed entry.
pub fn parse_expiry(bytes: &[u8]) -> Result<u64> {
    if bytes.len() < EXPIRY_HEADER_LEN {
        return Err(CacheError::Decoding("entry header truncated".to_string()));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(CacheError::Decoding("bad entry magic".to_string()));
    }
    let mut expiry_buf = [0u8; 8];
    expiry_buf.copy_from_slice(&bytes[MAGIC.len()..EXPIRY_HEADER_LEN]);
    Ok(u64::from_be_bytes(expiry_buf))
}

pub fn is_expired_at(expires_at: u64, now_ms: u64) -> bool {
    now_ms >= expires_at
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new("key".to_string(), b"value".to_vec(), Duration::from_secs(60));

        assert!(!entry.is_expired());
        let remaining = entry.ttl_remaining_ms();
        assert!(remaining <= 60_000);
        assert!(remaining >= 59_000);
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new("key".to_string(), Vec::new(), Duration::from_millis(200));
        assert!(!entry.is_expired());

        sleep(Duration::from_millis(300));

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining_ms(), 0);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = current_timestamp_ms();
        let entry = CacheEntry {
            key: "k".to_string(),
            payload: Vec::new(),
            expires_at: now,
        };

        assert!(entry.is_expired(), "Entry should be expired at boundary");
        assert!(!is_expired_at(now + 1, now));
    }

    #[test]
    fn test_framing_roundtrip() {
        let entry = CacheEntry::new(
            "GETexample.com/a?x=1".to_string(),
            vec![0, 1, 2, 255],
            Duration::from_secs(5),
        );
        let bytes = entry.to_bytes().unwrap();
        assert_eq!(parse_expiry(&bytes).unwrap(), entry.expires_at);
        assert_eq!(CacheEntry::from_bytes(&bytes).unwrap(), entry);
    }

    #[test]
    fn test_from_bytes_rejects_bad_magic() {
        let mut bytes = CacheEntry::new("k".to_string(), Vec::new(), Duration::from_secs(5))
            .to_bytes()
            .unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            CacheEntry::from_bytes(&bytes),
            Err(CacheError::Decoding(_))
        ));
    }

    #[test]
    fn test_from_bytes_rejects_truncated_key() {
        let bytes = CacheEntry::new("long-key".to_string(), Vec::new(), Duration::from_secs(5))
            .to_bytes()
            .unwrap();
        assert!(CacheEntry::from_bytes(&bytes[..FIXED_HEADER_LEN + 2]).is_err());
        assert!(CacheEntry::from_bytes(&bytes[..6]).is_err());
    }
}
