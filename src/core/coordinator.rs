use crate::core::allocator::SeatAllocator;
use crate::core::validator::{resolve_in_catalog, RegistrationValidator};
use crate::domain::model::{
    Course, CourseId, DropOutcome, RegistrationOutcome, UserEnrollment, UserId,
};
use crate::domain::ports::{CatalogStore, EnrollmentLedger, LimitsProvider};
use crate::utils::error::{EnrollError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Runs register and drop as single logical operations over the catalog and
/// ledger. Holds no per-operation state between calls.
///
/// Operations of one user are serialized so two batches of the same user
/// cannot both pass validation against the same snapshot. Across users the
/// only serialization point is each course's seat counter.
pub struct EnrollmentCoordinator<C, L, P>
where
    C: CatalogStore + 'static,
    L: EnrollmentLedger,
    P: LimitsProvider,
{
    catalog: Arc<C>,
    ledger: Arc<L>,
    allocator: SeatAllocator<C>,
    limits: P,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl<C, L, P> EnrollmentCoordinator<C, L, P>
where
    C: CatalogStore + 'static,
    L: EnrollmentLedger,
    P: LimitsProvider,
{
    pub fn new(catalog: Arc<C>, ledger: Arc<L>, limits: P) -> Self {
        Self {
            allocator: SeatAllocator::new(Arc::clone(&catalog)),
            catalog,
            ledger,
            limits,
            user_locks: DashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<C> {
        &self.catalog
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    async fn lock_user(&self, user: &UserId) -> UserGuard<'_> {
        let lock = Arc::clone(self.user_locks.entry(user.clone()).or_default().value());
        UserGuard {
            locks: &self.user_locks,
            user: user.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Registers `user` for `candidates`. Either every admissible course is
    /// applied or nothing is.
    pub async fn register(
        &self,
        user: &UserId,
        candidates: &[CourseId],
    ) -> Result<RegistrationOutcome> {
        let _guard = self.lock_user(user).await;

        let current = UserEnrollment::new(user.clone(), self.ledger.get_user_courses(user).await?);
        let snapshot = self.catalog.list_courses().await?;
        let validator = RegistrationValidator::new(self.limits.limits_for(user));

        let admitted = match validator.validate(&current, &snapshot, candidates) {
            Ok(admitted) => admitted,
            Err(e) => {
                tracing::info!("Registration for {} rejected: {}", user, e);
                return Err(e);
            }
        };

        if admitted.is_empty() {
            tracing::debug!("No known courses in request from {}", user);
            return Ok(RegistrationOutcome {
                applied: Vec::new(),
                catalog: snapshot,
            });
        }

        let reservation = match self.allocator.reserve(&admitted).await {
            Ok(reservation) => reservation,
            Err(e) => {
                tracing::info!("Seat allocation for {} lost the race: {}", user, e);
                return Err(e);
            }
        };

        let ids: Vec<CourseId> = admitted.iter().map(|c| c.id.clone()).collect();
        if let Err(e) = self.ledger.add_user_courses(user, &ids).await {
            tracing::error!("Ledger update for {} failed, returning seats: {}", user, e);
            reservation.release().await;
            return Err(e);
        }
        reservation.confirm();

        let catalog = self.refreshed_catalog(snapshot).await;
        let applied = resolve_in_catalog(&catalog, &ids);
        tracing::info!(
            "Registered {} for {} course(s): {}",
            user,
            applied.len(),
            ids.iter().map(CourseId::as_str).collect::<Vec<_>>().join(", ")
        );

        Ok(RegistrationOutcome { applied, catalog })
    }

    /// Drops `course` for `user`. The ledger entry is removed before the seat
    /// goes back, so a failure in between leaves a seat unreturned rather
    /// than a seat counted twice.
    pub async fn drop_course(&self, user: &UserId, course: &CourseId) -> Result<DropOutcome> {
        let _guard = self.lock_user(user).await;

        let held = self.ledger.get_user_courses(user).await?;
        if !held.contains(course) {
            tracing::info!("{} tried to drop {} without holding it", user, course);
            return Err(EnrollError::NotRegistered {
                course: course.clone(),
            });
        }

        self.ledger.remove_user_course(user, course).await?;

        match self.allocator.release_seat(course).await {
            Ok(()) => {}
            Err(EnrollError::NotFound { .. }) => {
                tracing::warn!("Dropped {} is no longer in the catalog; no seat returned", course);
            }
            Err(e) => {
                tracing::error!("Seat for {} was not returned after drop by {}: {}", course, user, e);
            }
        }

        let remaining = self.courses_of(user).await?;
        tracing::info!("{} dropped {}, {} course(s) remaining", user, course, remaining.len());

        Ok(DropOutcome {
            dropped: course.clone(),
            remaining,
        })
    }

    /// Registered courses of `user` in registration order. Courses missing
    /// from the catalog are left out.
    pub async fn list_my_courses(&self, user: &UserId) -> Result<Vec<Course>> {
        self.courses_of(user).await
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>> {
        self.catalog.list_courses().await
    }

    pub async fn credit_total(&self, user: &UserId) -> Result<u64> {
        let enrollment = UserEnrollment::new(user.clone(), self.ledger.get_user_courses(user).await?);
        let catalog = self.catalog.list_courses().await?;
        Ok(enrollment.credit_total(&catalog))
    }

    async fn courses_of(&self, user: &UserId) -> Result<Vec<Course>> {
        let held = self.ledger.get_user_courses(user).await?;
        let catalog = self.catalog.list_courses().await?;
        Ok(resolve_in_catalog(&catalog, &held))
    }

    // The registration is already committed here, so a failed re-read must not fail it.
    async fn refreshed_catalog(&self, fallback: Vec<Course>) -> Vec<Course> {
        match self.catalog.list_courses().await {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!("Could not refresh catalog after registration: {}", e);
                fallback
            }
        }
    }
}

/// Per-user lock held for one operation. The table entry is removed on
/// release once no other task holds or waits on it.
struct UserGuard<'a> {
    locks: &'a DashMap<UserId, Arc<Mutex<()>>>,
    user: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // 其他等待者各持有一份 Arc，計數為 1 代表只剩表內這份
        self.locks
            .remove_if(&self.user, |_, lock| Arc::strong_count(lock) == 1);
    }
}
