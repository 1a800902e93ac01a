use crate::adapters::memory::{InMemoryCatalog, InMemoryLedger};
use crate::domain::model::{Course, UserEnrollment};
use crate::domain::ports::Storage;
use crate::utils::error::{EnrollError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SNAPSHOT_VERSION: u32 = 1;
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);
/// A lock file older than this is assumed to belong to a crashed process.
const STALE_LOCK_SECS: i64 = 30;

/// Catalog and ledger contents written between CLI runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    /// Bumped on every save; a writer whose loaded revision no longer
    /// matches the file must not overwrite it.
    #[serde(default)]
    pub revision: u64,
    pub saved_at: DateTime<Utc>,
    pub courses: Vec<Course>,
    pub enrollments: Vec<UserEnrollment>,
}

impl StateSnapshot {
    pub fn capture(catalog: &InMemoryCatalog, ledger: &InMemoryLedger, revision: u64) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            revision,
            saved_at: Utc::now(),
            courses: catalog.snapshot(),
            enrollments: ledger.snapshot(),
        }
    }

    pub fn restore(self) -> (InMemoryCatalog, InMemoryLedger) {
        (
            InMemoryCatalog::from_snapshot(self.courses),
            InMemoryLedger::from_snapshot(self.enrollments),
        )
    }
}

/// Exclusive hold on the state file across processes, backed by a lock file
/// created next to it. Hand it back with [`SnapshotStore::unlock`].
#[must_use = "the state file stays locked until the lock is handed back"]
#[derive(Debug)]
pub struct StateLock {
    path: String,
}

pub struct SnapshotStore<S: Storage> {
    storage: S,
    file_name: String,
}

impl<S: Storage> SnapshotStore<S> {
    pub fn new(storage: S, file_name: impl Into<String>) -> Self {
        Self {
            storage,
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    fn lock_path(&self) -> String {
        format!("{}.lock", self.file_name)
    }

    /// Waits up to `timeout` for the lock file, breaking it if its holder
    /// has been gone for longer than `STALE_LOCK_SECS`.
    pub async fn lock(&self, timeout: Duration) -> Result<StateLock> {
        let path = self.lock_path();
        let started = tokio::time::Instant::now();

        loop {
            let stamp = Utc::now().to_rfc3339();
            if self.storage.create_new(&path, stamp.as_bytes()).await? {
                tracing::trace!("Locked {}", self.file_name);
                return Ok(StateLock { path });
            }
            if self.break_stale_lock(&path).await {
                continue;
            }
            if started.elapsed() >= timeout {
                return Err(EnrollError::StateLocked {
                    file: self.file_name.clone(),
                });
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    pub async fn unlock(&self, lock: StateLock) {
        if let Err(e) = self.storage.remove_file(&lock.path).await {
            tracing::error!("Failed to remove lock file {}: {}", lock.path, e);
        }
    }

    async fn break_stale_lock(&self, path: &str) -> bool {
        let Ok(bytes) = self.storage.read_file(path).await else {
            return false;
        };
        // 內容尚未寫完時解析會失敗，視為仍被持有
        let held_since = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|text| DateTime::parse_from_rfc3339(text.trim()).ok())
            .map(|t| t.with_timezone(&Utc));
        let Some(held_since) = held_since else {
            return false;
        };
        if Utc::now() - held_since < chrono::Duration::seconds(STALE_LOCK_SECS) {
            return false;
        }

        tracing::warn!(
            "Breaking lock on {} held since {}",
            self.file_name,
            held_since.to_rfc3339()
        );
        self.storage.remove_file(path).await.is_ok()
    }

    /// Revision currently on disk, 0 when nothing has been saved.
    pub async fn revision(&self) -> Result<u64> {
        Ok(self.load().await?.map_or(0, |snapshot| snapshot.revision))
    }

    /// `Ok(None)` when nothing has been saved yet.
    pub async fn load(&self) -> Result<Option<StateSnapshot>> {
        if !self.storage.exists(&self.file_name).await {
            return Ok(None);
        }

        let bytes = self.storage.read_file(&self.file_name).await?;
        let snapshot: StateSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EnrollError::StorageError {
                message: format!(
                    "Unsupported snapshot version {} in {}",
                    snapshot.version, self.file_name
                ),
            });
        }

        tracing::debug!(
            "Loaded snapshot revision {} from {} saved at {}",
            snapshot.revision,
            self.file_name,
            snapshot.saved_at.to_rfc3339()
        );
        Ok(Some(snapshot))
    }

    pub async fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        self.storage.write_file(&self.file_name, &bytes).await?;
        tracing::debug!(
            "Saved {} courses and {} enrollments to {}",
            snapshot.courses.len(),
            snapshot.enrollments.len(),
            self.file_name
        );
        Ok(())
    }
}
