//! Expired Entry Cleanup
//!
//! Background task that periodically deletes expired entries from the disk
//! store. Reads already ignore expired entries, so the sweep only reclaims
//! space; its failures never affect what is served.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::DiskStore;

/// Owned handle to the cleanup task.
///
/// Dropping the handle stops the task as well.
#[derive(Debug)]
pub struct CleanupScheduler {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupScheduler {
    /// Spawns a task that sweeps `store` every `interval`.
    ///
    /// The first sweep runs one full interval after start. Must be called
    /// from within a tokio runtime.
    pub fn start(store: DiskStore, interval: Duration) -> Self {
        let (shutdown, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!(
                "Starting cache cleanup task with interval of {} seconds",
                interval.as_secs()
            );

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {}
                }
                if *stopped.borrow() {
                    break;
                }

                match store.sweep_expired().await {
                    Ok(stats) if stats.removed > 0 || stats.failed > 0 => {
                        info!(
                            inspected = stats.inspected,
                            removed = stats.removed,
                            failed = stats.failed,
                            "Cache cleanup: removed {} expired entries",
                            stats.removed
                        );
                    }
                    Ok(stats) => {
                        debug!(inspected = stats.inspected, "Cache cleanup: no expired entries found");
                    }
                    Err(err) => {
                        warn!(error = %err, "Cache cleanup sweep failed");
                    }
                }
            }

            debug!("Cache cleanup task stopped");
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Stops the task and waits for it to exit.
    ///
    /// A sweep already in progress finishes first; no new sweep starts after
    /// this returns. Safe to call more than once.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "Cache cleanup task ended abnormally");
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let dir = TempDir::new().unwrap();
        let (store, mut scheduler) = DiskStore::new(dir.path(), Duration::from_secs(2))
            .await
            .unwrap();

        for i in 0..5 {
            store
                .set(&format!("short{}", i), b"value", Duration::from_secs(1))
                .await
                .unwrap();
        }
        for i in 0..3 {
            store
                .set(&format!("long{}", i), b"value", Duration::from_secs(3600))
                .await
                .unwrap();
        }

        // Wait past one cleanup interval
        tokio::time::sleep(Duration::from_millis(2600)).await;

        for i in 0..5 {
            assert!(
                !store.entry_path(&format!("short{}", i)).exists(),
                "Expired entry should have been cleaned up"
            );
        }
        for i in 0..3 {
            let value = store.get(&format!("long{}", i)).await.unwrap();
            assert_eq!(value, Some(b"value".to_vec()), "Valid entry should not be removed");
        }

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_cleanup_task_stops() {
        let dir = TempDir::new().unwrap();
        let (_store, mut scheduler) = DiskStore::new(dir.path(), Duration::from_secs(2))
            .await
            .unwrap();

        assert!(scheduler.is_running());
        scheduler.stop().await;
        assert!(!scheduler.is_running());

        // Second stop is a no-op
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_no_sweep_after_stop() {
        let dir = TempDir::new().unwrap();
        let (store, mut scheduler) = DiskStore::new(dir.path(), Duration::from_secs(2))
            .await
            .unwrap();
        scheduler.stop().await;

        store.set("short", b"value", Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        // Expired and unreadable, but nothing removed the file
        assert!(store.entry_path("short").exists());
        assert_eq!(store.get("short").await.unwrap(), None);
    }
}
