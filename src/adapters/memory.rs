//! In-process catalog and ledger.
//!
//! Each course owns its own atomic seat counter inside a sharded map, so
//! unrelated courses never contend and decrement-if-positive is a single
//! compare-and-swap loop per course.

use crate::domain::model::{Course, CourseId, CourseSpec, UserEnrollment, UserId};
use crate::domain::ports::{CatalogStore, EnrollmentLedger};
use crate::utils::error::{EnrollError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct CourseEntry {
    spec: CourseSpec,
    seats: AtomicU32,
}

impl CourseEntry {
    fn snapshot(&self) -> Course {
        Course {
            id: self.spec.id.clone(),
            name: self.spec.name.clone(),
            credits: self.spec.credits,
            slot: self.spec.slot.clone(),
            capacity: self.spec.seats,
            seats_remaining: self.seats.load(Ordering::Acquire),
            prerequisites: self.spec.prerequisites.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    courses: DashMap<CourseId, Arc<CourseEntry>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog with every course at full capacity.
    pub fn from_specs(specs: impl IntoIterator<Item = CourseSpec>) -> Self {
        let catalog = Self::new();
        for spec in specs {
            catalog.insert_course(spec);
        }
        catalog
    }

    /// Rebuilds a catalog from a previous snapshot, keeping remaining seats.
    pub fn from_snapshot(courses: impl IntoIterator<Item = Course>) -> Self {
        let catalog = Self::new();
        for course in courses {
            let remaining = course.seats_remaining.min(course.capacity);
            let spec = CourseSpec {
                id: course.id,
                name: course.name,
                credits: course.credits,
                slot: course.slot,
                seats: course.capacity,
                prerequisites: course.prerequisites,
            };
            catalog.courses.insert(
                spec.id.clone(),
                Arc::new(CourseEntry {
                    spec,
                    seats: AtomicU32::new(remaining),
                }),
            );
        }
        catalog
    }

    /// Inserts or replaces a course, resetting its seats to capacity.
    pub fn insert_course(&self, spec: CourseSpec) {
        let seats = AtomicU32::new(spec.seats);
        self.courses
            .insert(spec.id.clone(), Arc::new(CourseEntry { spec, seats }));
    }

    pub fn remove_course(&self, id: &CourseId) -> Result<Course> {
        self.courses
            .remove(id)
            .map(|(_, entry)| entry.snapshot())
            .ok_or_else(|| EnrollError::NotFound { course: id.clone() })
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    // Clone the Arc so no shard guard is held while touching the counter.
    fn entry(&self, id: &CourseId) -> Result<Arc<CourseEntry>> {
        self.courses
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| EnrollError::NotFound { course: id.clone() })
    }

    pub fn snapshot(&self) -> Vec<Course> {
        let mut courses: Vec<Course> = self.courses.iter().map(|e| e.value().snapshot()).collect();
        courses.sort_by(|a, b| a.id.cmp(&b.id));
        courses
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn get_course(&self, id: &CourseId) -> Result<Course> {
        Ok(self.entry(id)?.snapshot())
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        Ok(self.snapshot())
    }

    async fn try_decrement_seat(&self, id: &CourseId) -> Result<bool> {
        let entry = self.entry(id)?;
        let taken = entry
            .seats
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |seats| {
                seats.checked_sub(1)
            })
            .is_ok();
        Ok(taken)
    }

    async fn increment_seat(&self, id: &CourseId) -> Result<()> {
        let entry = self.entry(id)?;
        let capacity = entry.spec.seats;
        let returned = entry
            .seats
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |seats| {
                (seats < capacity).then(|| seats + 1)
            });
        if returned.is_err() {
            tracing::warn!("Seat counter for {} already at capacity {}", id, capacity);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    users: DashMap<UserId, Vec<CourseId>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(enrollments: impl IntoIterator<Item = UserEnrollment>) -> Self {
        let ledger = Self::new();
        for enrollment in enrollments {
            ledger.users.insert(enrollment.user, enrollment.courses);
        }
        ledger
    }

    pub fn snapshot(&self) -> Vec<UserEnrollment> {
        let mut users: Vec<UserEnrollment> = self
            .users
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| UserEnrollment::new(e.key().clone(), e.value().clone()))
            .collect();
        users.sort_by(|a, b| a.user.cmp(&b.user));
        users
    }
}

#[async_trait]
impl EnrollmentLedger for InMemoryLedger {
    async fn get_user_courses(&self, user: &UserId) -> Result<Vec<CourseId>> {
        Ok(self
            .users
            .get(user)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }

    async fn add_user_courses(&self, user: &UserId, courses: &[CourseId]) -> Result<()> {
        let mut held = self.users.entry(user.clone()).or_default();
        for course in courses {
            if !held.contains(course) {
                held.push(course.clone());
            }
        }
        Ok(())
    }

    async fn remove_user_course(&self, user: &UserId, course: &CourseId) -> Result<()> {
        if let Some(mut held) = self.users.get_mut(user) {
            held.retain(|c| c != course);
        }
        Ok(())
    }
}
