use crate::adapters::memory::{InMemoryCatalog, InMemoryLedger};
use crate::app::seed::catalog_from_config;
use crate::app::snapshot::{SnapshotStore, StateSnapshot};
use crate::config::toml_config::EnrollConfig;
use crate::core::coordinator::EnrollmentCoordinator;
use crate::domain::model::{Course, CourseId, DropOutcome, RegistrationOutcome, UserId};
use crate::domain::ports::Storage;
use crate::utils::error::{EnrollError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub type InMemoryCoordinator = EnrollmentCoordinator<InMemoryCatalog, InMemoryLedger, EnrollConfig>;

/// Caller-facing surface: the coordinator over in-memory stores, persisted
/// to a snapshot after every successful mutation.
///
/// Several processes may share one state file. Every mutation holds the
/// file lock from the freshness check through the save, and refuses to run
/// when the file has moved past the revision this service loaded.
pub struct EnrollmentService<S: Storage> {
    coordinator: Arc<InMemoryCoordinator>,
    snapshots: SnapshotStore<S>,
    revision: AtomicU64,
    lock_timeout: Duration,
}

impl<S: Storage> EnrollmentService<S> {
    /// Resumes from the saved snapshot, or seeds a fresh catalog.
    pub async fn open(config: EnrollConfig, storage: S) -> Result<Self> {
        let snapshots = SnapshotStore::new(storage, config.storage.state_file.clone());
        let (catalog, ledger, revision) = match snapshots.load().await? {
            Some(snapshot) => {
                tracing::info!(
                    "Resuming from {} at revision {}",
                    snapshots.file_name(),
                    snapshot.revision
                );
                let revision = snapshot.revision;
                let (catalog, ledger) = snapshot.restore();
                (catalog, ledger, revision)
            }
            None => (Self::seeded_catalog(&config)?, InMemoryLedger::new(), 0),
        };

        Ok(Self::assemble(config, catalog, ledger, snapshots, revision))
    }

    /// Discards saved state and starts from the configured seed catalog.
    pub async fn reseed(config: EnrollConfig, storage: S) -> Result<Self> {
        let snapshots = SnapshotStore::new(storage, config.storage.state_file.clone());
        let catalog = Self::seeded_catalog(&config)?;
        let service = Self::assemble(config, catalog, InMemoryLedger::new(), snapshots, 0);

        let lock = service.snapshots.lock(service.lock_timeout).await?;
        let result = service.overwrite_locked().await;
        service.snapshots.unlock(lock).await;
        result?;

        Ok(service)
    }

    fn seeded_catalog(config: &EnrollConfig) -> Result<InMemoryCatalog> {
        let specs = catalog_from_config(&config.catalog)?;
        tracing::info!("Seeding catalog with {} courses", specs.len());
        Ok(InMemoryCatalog::from_specs(specs))
    }

    fn assemble(
        config: EnrollConfig,
        catalog: InMemoryCatalog,
        ledger: InMemoryLedger,
        snapshots: SnapshotStore<S>,
        revision: u64,
    ) -> Self {
        let lock_timeout = Duration::from_millis(config.storage.lock_timeout_ms);
        Self {
            coordinator: Arc::new(EnrollmentCoordinator::new(
                Arc::new(catalog),
                Arc::new(ledger),
                config,
            )),
            snapshots,
            revision: AtomicU64::new(revision),
            lock_timeout,
        }
    }

    pub fn coordinator(&self) -> Arc<InMemoryCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Revision of the state file this service's memory reflects.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Saves the in-memory state, unless another writer saved since it was loaded.
    pub async fn persist(&self) -> Result<()> {
        let lock = self.snapshots.lock(self.lock_timeout).await?;
        let result = match self.ensure_current().await {
            Ok(()) => self.save_next().await,
            Err(e) => Err(e),
        };
        self.snapshots.unlock(lock).await;
        result
    }

    pub async fn register(&self, user: &UserId, courses: &[CourseId]) -> Result<RegistrationOutcome> {
        let lock = self.snapshots.lock(self.lock_timeout).await?;
        let result = self.register_locked(user, courses).await;
        self.snapshots.unlock(lock).await;
        result
    }

    pub async fn drop_course(&self, user: &UserId, course: &CourseId) -> Result<DropOutcome> {
        let lock = self.snapshots.lock(self.lock_timeout).await?;
        let result = self.drop_locked(user, course).await;
        self.snapshots.unlock(lock).await;
        result
    }

    pub async fn list_my_courses(&self, user: &UserId) -> Result<Vec<Course>> {
        self.coordinator.list_my_courses(user).await
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>> {
        self.coordinator.list_courses().await
    }

    async fn register_locked(&self, user: &UserId, courses: &[CourseId]) -> Result<RegistrationOutcome> {
        self.ensure_current().await?;
        let outcome = self.coordinator.register(user, courses).await?;
        if outcome.applied.is_empty() {
            return Ok(outcome);
        }

        if let Err(e) = self.save_next().await {
            tracing::error!("Saving registration of {} failed, undoing it: {}", user, e);
            for course in &outcome.applied {
                if let Err(undo) = self.coordinator.drop_course(user, &course.id).await {
                    tracing::error!("Could not undo {} for {}: {}", course.id, user, undo);
                }
            }
            return Err(e);
        }
        Ok(outcome)
    }

    async fn drop_locked(&self, user: &UserId, course: &CourseId) -> Result<DropOutcome> {
        self.ensure_current().await?;
        let outcome = self.coordinator.drop_course(user, course).await?;

        if let Err(e) = self.save_next().await {
            tracing::error!("Saving drop of {} by {} failed, undoing it: {}", course, user, e);
            if let Err(undo) = self.coordinator.register(user, &[course.clone()]).await {
                tracing::error!("Could not restore {} for {}: {}", course, user, undo);
            }
            return Err(e);
        }
        Ok(outcome)
    }

    async fn ensure_current(&self) -> Result<()> {
        let expected = self.revision();
        let found = self.snapshots.revision().await?;
        if found != expected {
            tracing::warn!(
                "{} moved from revision {} to {} under this process",
                self.snapshots.file_name(),
                expected,
                found
            );
            return Err(EnrollError::StaleState {
                file: self.snapshots.file_name().to_string(),
                expected,
                found,
            });
        }
        Ok(())
    }

    // Caller holds the lock and has checked the revision.
    async fn save_next(&self) -> Result<()> {
        let next = self.revision() + 1;
        let snapshot = StateSnapshot::capture(self.coordinator.catalog(), self.coordinator.ledger(), next);
        self.snapshots.save(&snapshot).await?;
        self.revision.store(next, Ordering::Release);
        Ok(())
    }

    async fn overwrite_locked(&self) -> Result<()> {
        let found = self.snapshots.revision().await?;
        self.revision.store(found, Ordering::Release);
        self.save_next().await
    }
}
