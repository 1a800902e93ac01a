//! Seat allocation against the catalog store.
//!
//! A batch is reserved one course at a time in course-id order using the
//! store's conditional decrement. If any course is exhausted at commit time,
//! every seat already taken by the batch is handed back before the error is
//! returned. A [`SeatReservation`] that is dropped without being confirmed or
//! released (for example because the caller's future was cancelled) returns
//! its seats from a background task.

use crate::domain::model::{Course, CourseId};
use crate::domain::ports::CatalogStore;
use crate::utils::error::{EnrollError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct SeatAllocator<C: CatalogStore + 'static> {
    catalog: Arc<C>,
}

impl<C: CatalogStore + 'static> Clone for SeatAllocator<C> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl<C: CatalogStore + 'static> SeatAllocator<C> {
    pub fn new(catalog: Arc<C>) -> Self {
        Self { catalog }
    }

    /// Takes one seat from every course in `courses`, all or nothing.
    pub async fn reserve(&self, courses: &[Course]) -> Result<SeatReservation<C>> {
        let ordered: BTreeSet<&CourseId> = courses.iter().map(|c| &c.id).collect();
        let mut reservation = SeatReservation::new(Arc::clone(&self.catalog));

        for id in ordered {
            let outcome = self.catalog.try_decrement_seat(id).await;
            match outcome {
                Ok(true) => reservation.held.push(id.clone()),
                Ok(false) => {
                    reservation.release().await;
                    return Err(EnrollError::NoSeatsAvailable { course: id.clone() });
                }
                Err(e) => {
                    reservation.release().await;
                    return Err(e);
                }
            }
        }

        tracing::trace!("Reserved {} seats", reservation.held.len());
        Ok(reservation)
    }

    /// Returns one seat to `course`. Callers must have verified the seat was held.
    pub async fn release_seat(&self, course: &CourseId) -> Result<()> {
        self.catalog.increment_seat(course).await
    }
}

/// Seats taken by one batch, pending confirmation.
#[must_use = "an unconfirmed reservation gives its seats back when dropped"]
pub struct SeatReservation<C: CatalogStore + 'static> {
    catalog: Arc<C>,
    held: Vec<CourseId>,
    settled: bool,
}

impl<C: CatalogStore + 'static> SeatReservation<C> {
    fn new(catalog: Arc<C>) -> Self {
        Self {
            catalog,
            held: Vec::new(),
            settled: false,
        }
    }

    pub fn courses(&self) -> &[CourseId] {
        &self.held
    }

    /// Makes the decrements permanent.
    pub fn confirm(mut self) -> Vec<CourseId> {
        self.settled = true;
        std::mem::take(&mut self.held)
    }

    /// Hands every held seat back, newest first. A seat leaves `held` only
    /// once it has been returned, so a cancelled release still hands the
    /// rest back on drop.
    pub async fn release(mut self) {
        while let Some(id) = self.held.last().cloned() {
            if let Err(e) = self.catalog.increment_seat(&id).await {
                tracing::error!("Failed to roll back seat for {}: {}", id, e);
            }
            self.held.pop();
        }
        self.settled = true;
    }
}

impl<C: CatalogStore + 'static> Drop for SeatReservation<C> {
    fn drop(&mut self) {
        if self.settled || self.held.is_empty() {
            return;
        }

        let held = std::mem::take(&mut self.held);
        let catalog = Arc::clone(&self.catalog);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("Releasing {} abandoned seat reservations", held.len());
                handle.spawn(async move {
                    give_back(catalog.as_ref(), held).await;
                });
            }
            Err(_) => {
                tracing::error!(
                    "Seat reservations for {:?} dropped outside a runtime; seats not returned",
                    held
                );
            }
        }
    }
}

async fn give_back<C: CatalogStore + ?Sized>(catalog: &C, held: Vec<CourseId>) {
    for id in held.iter().rev() {
        if let Err(e) = catalog.increment_seat(id).await {
            tracing::error!("Failed to roll back seat for {}: {}", id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryCatalog;
    use crate::domain::model::{CourseSpec, Slot};
    use std::collections::BTreeSet;

    fn spec(id: &str, slot: &str, seats: u32) -> CourseSpec {
        CourseSpec {
            id: CourseId::new(id),
            name: id.to_string(),
            credits: 3,
            slot: Slot::new(slot),
            seats,
            prerequisites: BTreeSet::new(),
        }
    }

    async fn seats(catalog: &InMemoryCatalog, id: &str) -> u32 {
        catalog
            .get_course(&CourseId::new(id))
            .await
            .unwrap()
            .seats_remaining
    }

    #[tokio::test]
    async fn test_reserve_and_confirm() {
        let catalog = Arc::new(InMemoryCatalog::from_specs(vec![
            spec("a", "Mon-9", 2),
            spec("b", "Tue-9", 1),
        ]));
        let allocator = SeatAllocator::new(Arc::clone(&catalog));
        let courses = catalog.list_courses().await.unwrap();

        let reservation = allocator.reserve(&courses).await.unwrap();
        let confirmed = reservation.confirm();

        assert_eq!(confirmed, vec![CourseId::new("a"), CourseId::new("b")]);
        assert_eq!(seats(&catalog, "a").await, 1);
        assert_eq!(seats(&catalog, "b").await, 0);
    }

    #[tokio::test]
    async fn test_exhausted_course_rolls_back_whole_batch() {
        let catalog = Arc::new(InMemoryCatalog::from_specs(vec![
            spec("a", "Mon-9", 3),
            spec("b", "Tue-9", 3),
            spec("c", "Wed-9", 1),
        ]));
        let allocator = SeatAllocator::new(Arc::clone(&catalog));
        let snapshot = catalog.list_courses().await.unwrap();

        // 模擬驗證後被其他請求搶走最後一個名額
        assert!(catalog.try_decrement_seat(&CourseId::new("c")).await.unwrap());

        let err = allocator.reserve(&snapshot).await.err().unwrap();
        assert!(matches!(err, EnrollError::NoSeatsAvailable { course } if course.as_str() == "c"));
        assert_eq!(seats(&catalog, "a").await, 3);
        assert_eq!(seats(&catalog, "b").await, 3);
        assert_eq!(seats(&catalog, "c").await, 0);
    }

    #[tokio::test]
    async fn test_release_returns_seats() {
        let catalog = Arc::new(InMemoryCatalog::from_specs(vec![spec("a", "Mon-9", 1)]));
        let allocator = SeatAllocator::new(Arc::clone(&catalog));
        let courses = catalog.list_courses().await.unwrap();

        let reservation = allocator.reserve(&courses).await.unwrap();
        assert_eq!(seats(&catalog, "a").await, 0);
        reservation.release().await;
        assert_eq!(seats(&catalog, "a").await, 1);
    }

    #[tokio::test]
    async fn test_dropped_reservation_is_released() {
        let catalog = Arc::new(InMemoryCatalog::from_specs(vec![spec("a", "Mon-9", 1)]));
        let allocator = SeatAllocator::new(Arc::clone(&catalog));
        let courses = catalog.list_courses().await.unwrap();

        let reservation = allocator.reserve(&courses).await.unwrap();
        drop(reservation);

        for _ in 0..100 {
            if seats(&catalog, "a").await == 1 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("abandoned reservation was never released");
    }

    struct SlowReturnCatalog {
        inner: InMemoryCatalog,
    }

    #[async_trait::async_trait]
    impl CatalogStore for SlowReturnCatalog {
        async fn get_course(&self, id: &CourseId) -> Result<Course> {
            self.inner.get_course(id).await
        }

        async fn list_courses(&self) -> Result<Vec<Course>> {
            self.inner.list_courses().await
        }

        async fn try_decrement_seat(&self, id: &CourseId) -> Result<bool> {
            self.inner.try_decrement_seat(id).await
        }

        async fn increment_seat(&self, id: &CourseId) -> Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.inner.increment_seat(id).await
        }
    }

    #[tokio::test]
    async fn test_cancelled_release_still_returns_every_seat() {
        let catalog = Arc::new(SlowReturnCatalog {
            inner: InMemoryCatalog::from_specs(vec![
                spec("a", "Mon-9", 1),
                spec("b", "Tue-9", 1),
                spec("c", "Wed-9", 1),
            ]),
        });
        let allocator = SeatAllocator::new(Arc::clone(&catalog));
        let courses = catalog.list_courses().await.unwrap();

        let reservation = allocator.reserve(&courses).await.unwrap();
        let cancelled = tokio::time::timeout(
            std::time::Duration::from_millis(5),
            reservation.release(),
        )
        .await;
        assert!(cancelled.is_err());

        for _ in 0..100 {
            let mut total = 0;
            for id in ["a", "b", "c"] {
                total += seats(&catalog.inner, id).await;
            }
            if total == 3 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("seats held by a cancelled release were lost");
    }

    #[tokio::test]
    async fn test_unknown_course_fails_without_side_effects() {
        let catalog = Arc::new(InMemoryCatalog::from_specs(vec![spec("a", "Mon-9", 1)]));
        let allocator = SeatAllocator::new(Arc::clone(&catalog));
        let mut courses = catalog.list_courses().await.unwrap();
        let mut ghost = courses[0].clone();
        ghost.id = CourseId::new("zz-removed");
        courses.push(ghost);

        let err = allocator.reserve(&courses).await.err().unwrap();
        assert!(matches!(err, EnrollError::NotFound { .. }));
        assert_eq!(seats(&catalog, "a").await, 1);
    }
}
