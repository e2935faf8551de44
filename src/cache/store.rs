//! Cache Store Module
//!
//! Disk-backed key/value engine with per-entry expiry. The filesystem is the
//! index: each key maps to `<root>/<h[0..2]>/<h>.entry`, where `h` is the hex
//! SHA-256 of the key. Writes land in a `tmp_` file and are renamed into
//! place, so readers see either the previous or the new entry, never a mix.
//! Concurrent writers to one key race on the rename and the last one wins.
//!
//! SHA-256 collisions between two keys would make them share a file. The
//! stored key is compared on read so a collision degrades to a miss instead
//! of serving another request's response.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

use crate::cache::entry::{self, CacheEntry, EXPIRY_HEADER_LEN};
use crate::cache::{CacheStats, StatsRecorder};
use crate::error::{CacheError, Result};
use crate::tasks::CleanupScheduler;

const ENTRY_EXTENSION: &str = "entry";
const TEMP_PREFIX: &str = "tmp_";
const DEFAULT_TEMP_GRACE: Duration = Duration::from_secs(300);

// == Sweep Stats ==
/// Outcome of one cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Entry files examined
    pub inspected: usize,
    /// Expired or corrupt entries deleted
    pub removed: usize,
    /// Deletions that failed and were skipped
    pub failed: usize,
    /// Abandoned temp files deleted
    pub temp_removed: usize,
}

#[derive(Debug)]
struct StoreInner {
    root: PathBuf,
    temp_grace: Duration,
    stats: StatsRecorder,
}

// == Disk Store ==
/// Disk-backed cache store. Cheap to clone; clones share the directory and
/// counters.
#[derive(Debug, Clone)]
pub struct DiskStore {
    inner: Arc<StoreInner>,
}

impl DiskStore {
    // == Constructor ==
    /// Opens the store at `path` and starts its cleanup scheduler.
    ///
    /// The returned scheduler sweeps every `cleanup_interval` until it is
    /// stopped or dropped.
    pub async fn new(
        path: impl Into<PathBuf>,
        cleanup_interval: Duration,
    ) -> Result<(Self, CleanupScheduler)> {
        let store = Self::open_with_grace(path.into(), cleanup_interval).await?;
        let scheduler = CleanupScheduler::start(store.clone(), cleanup_interval);
        Ok((store, scheduler))
    }

    /// Opens the store without background cleanup.
    ///
    /// Fails with `InvalidConfiguration` unless `path` is an existing,
    /// writable directory. Temp files left by an earlier crash are removed
    /// once they are older than the temp grace period.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_grace(path.into(), DEFAULT_TEMP_GRACE).await
    }

    async fn open_with_grace(root: PathBuf, temp_grace: Duration) -> Result<Self> {
        let metadata = fs::metadata(&root).await.map_err(|e| {
            CacheError::InvalidConfiguration(format!(
                "cache path {} is not accessible: {}",
                root.display(),
                e
            ))
        })?;
        if !metadata.is_dir() {
            return Err(CacheError::InvalidConfiguration(format!(
                "cache path {} is not a directory",
                root.display()
            )));
        }

        let store = Self {
            inner: Arc::new(StoreInner {
                root,
                temp_grace,
                stats: StatsRecorder::new(),
            }),
        };
        store.probe_writable().await?;
        // Younger temp files may be another process's in-flight writes
        store.remove_temp_files(store.inner.temp_grace).await?;

        info!(path = %store.root().display(), "Opened disk cache store");
        Ok(store)
    }

    async fn probe_writable(&self) -> Result<()> {
        let probe = self.temp_path();
        let written = fs::write(&probe, b"probe").await;
        let _ = fs::remove_file(&probe).await;
        written.map_err(|e| {
            CacheError::InvalidConfiguration(format!(
                "cache path {} is not writable: {}",
                self.root().display(),
                e
            ))
        })
    }

    // == Paths ==
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Returns the file an entry for `key` lives in.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(key.as_bytes()));
        self.inner
            .root
            .join(&name[..2])
            .join(format!("{}.{}", name, ENTRY_EXTENSION))
    }

    fn temp_path(&self) -> PathBuf {
        self.inner
            .root
            .join(format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4()))
    }

    // == Get ==
    /// Retrieves the payload for `key`.
    ///
    /// Returns `Ok(None)` when there is no entry or the entry has expired,
    /// whether or not a sweep has removed it yet. Errors only on I/O failure
    /// or a corrupt entry.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_decoded(key, Ok).await
    }

    /// Retrieves the payload for `key` and runs `decode` over it.
    ///
    /// A hit is only counted once `decode` succeeds; a payload it rejects
    /// is counted as a decode error and its error is returned.
    pub async fn get_decoded<T, F>(&self, key: &str, decode: F) -> Result<Option<T>>
    where
        F: FnOnce(Vec<u8>) -> Result<T>,
    {
        let payload = match self.read_live(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                self.inner.stats.record_miss();
                return Ok(None);
            }
            Err(err) => {
                self.inner.stats.record_error();
                return Err(err);
            }
        };
        match decode(payload) {
            Ok(value) => {
                self.inner.stats.record_hit();
                Ok(Some(value))
            }
            Err(err) => {
                self.inner.stats.record_decode_error();
                Err(err)
            }
        }
    }

    async fn read_live(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        // Expired entries are misses even if the rest of the frame is damaged
        let expires_at = entry::parse_expiry(&bytes)?;
        if entry::is_expired_at(expires_at, entry::current_timestamp_ms()) {
            trace!(key, "Cache entry expired");
            return Ok(None);
        }

        let entry = CacheEntry::from_bytes(&bytes)?;
        if entry.key != key {
            debug!(key, stored = %entry.key, "Cache file holds a different key");
            return Ok(None);
        }
        Ok(Some(entry.payload))
    }

    // == Set ==
    /// Stores `payload` for `key`, live for `ttl`.
    ///
    /// A zero TTL is rejected without writing. An existing entry for the key
    /// is replaced atomically.
    pub async fn set(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }

        let bytes = CacheEntry::new(key.to_string(), payload.to_vec(), ttl).to_bytes()?;
        let result = self.write_atomic(&self.entry_path(key), &bytes).await;
        match &result {
            Ok(()) => self.inner.stats.record_store(),
            Err(_) => self.inner.stats.record_error(),
        }
        result
    }

    async fn write_atomic(&self, final_path: &Path, bytes: &[u8]) -> Result<()> {
        let temp = TempFile::new(self.temp_path());

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(temp.path())
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_data().await?;
        drop(file);

        // A sweep may prune the shard between creating it and renaming into
        // it, so the rename is retried once after recreating the directory.
        let mut attempts = 0;
        loop {
            if let Some(shard) = final_path.parent() {
                fs::create_dir_all(shard).await?;
            }
            match fs::rename(temp.path(), final_path).await {
                Ok(()) => break,
                Err(err) if err.kind() == ErrorKind::NotFound && attempts == 0 => attempts += 1,
                Err(err) => return Err(err.into()),
            }
        }
        temp.persist();
        Ok(())
    }

    // == Remove ==
    /// Deletes the entry for `key`. Returns whether a file was removed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    // == Sweep Expired ==
    /// Deletes every entry whose expiry has passed at the start of the sweep.
    ///
    /// A failed deletion is logged and counted; the sweep moves on to the
    /// next file. Only failing to list the root aborts the sweep.
    ///
    /// A `set` that replaces an entry between the expiry check and the
    /// deletion loses its write; readers then see a miss.
    pub async fn sweep_expired(&self) -> Result<SweepStats> {
        let now = entry::current_timestamp_ms();
        let mut stats = SweepStats {
            temp_removed: self.remove_temp_files(self.inner.temp_grace).await?,
            ..SweepStats::default()
        };

        let mut shards = fs::read_dir(self.root()).await?;
        while let Some(shard) = shards.next_entry().await? {
            match shard.file_type().await {
                Ok(file_type) if file_type.is_dir() => {}
                _ => continue,
            }
            let mut entries = match fs::read_dir(shard.path()).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => {
                    warn!(path = %shard.path().display(), error = %err, "Failed to list cache shard");
                    stats.failed += 1;
                    continue;
                }
            };

            loop {
                let file = match entries.next_entry().await {
                    Ok(Some(file)) => file,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(path = %shard.path().display(), error = %err, "Failed to read cache shard");
                        stats.failed += 1;
                        break;
                    }
                };
                let path = file.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                    continue;
                }
                stats.inspected += 1;

                let expired = match read_expiry(&path).await {
                    Ok(Some(expires_at)) => entry::is_expired_at(expires_at, now),
                    Ok(None) => continue,
                    Err(CacheError::Decoding(reason)) => {
                        warn!(path = %path.display(), reason = %reason, "Removing corrupt cache entry");
                        true
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "Failed to read cache entry header");
                        stats.failed += 1;
                        continue;
                    }
                };
                if !expired {
                    continue;
                }

                match fs::remove_file(&path).await {
                    Ok(()) => stats.removed += 1,
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "Failed to delete expired cache entry");
                        stats.failed += 1;
                    }
                }
            }

            // Fails harmlessly when the shard still has entries
            let _ = fs::remove_dir(shard.path()).await;
        }

        self.inner.stats.record_swept(stats.removed as u64);
        Ok(stats)
    }

    /// Removes `tmp_` files in the root older than `min_age`.
    async fn remove_temp_files(&self, min_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut entries = fs::read_dir(self.root()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let is_temp = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(TEMP_PREFIX))
                .unwrap_or(false);
            if !is_temp {
                continue;
            }
            if !min_age.is_zero() {
                let age = entry
                    .metadata()
                    .await
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok());
                match age {
                    Some(age) if age >= min_age => {}
                    _ => continue,
                }
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %entry.path().display(), error = %err, "Failed to delete temp file");
                }
            }
        }
        Ok(removed)
    }
}

/// Reads only the expiry header of an entry file. `Ok(None)` if the file
/// vanished.
async fn read_expiry(path: &Path) -> Result<Option<u64>> {
    let mut file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut header = [0u8; EXPIRY_HEADER_LEN];
    match file.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
            return Err(CacheError::Decoding("entry header truncated".to_string()));
        }
        Err(err) => return Err(err.into()),
    }
    entry::parse_expiry(&header).map(Some)
}

// == Temp File Guard ==
/// Deletes its file on drop unless persisted. Covers both error returns and
/// a `set` future dropped mid-write.
struct TempFile {
    path: PathBuf,
    persisted: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            persisted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persist(mut self) {
        self.persisted = true;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        let path = self.path.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = fs::remove_file(path).await;
            });
        } else {
            let _ = std::fs::remove_file(&path);
        }
    }
}
