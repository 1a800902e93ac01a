use crate::domain::model::{Course, CourseId, EnrollmentLimits, UserId};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Catalog accessor. `try_decrement_seat` must be linearizable per course:
/// it returns `false` instead of going below zero.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_course(&self, id: &CourseId) -> Result<Course>;
    async fn list_courses(&self) -> Result<Vec<Course>>;
    async fn try_decrement_seat(&self, id: &CourseId) -> Result<bool>;
    async fn increment_seat(&self, id: &CourseId) -> Result<()>;
}

/// Per-user registration ledger.
#[async_trait]
pub trait EnrollmentLedger: Send + Sync {
    async fn get_user_courses(&self, user: &UserId) -> Result<Vec<CourseId>>;
    async fn add_user_courses(&self, user: &UserId, courses: &[CourseId]) -> Result<()>;
    async fn remove_user_course(&self, user: &UserId, course: &CourseId) -> Result<()>;
}

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
    /// Creates `path` with `data` only if it does not exist yet. Returns
    /// `false` when another writer already created it.
    fn create_new(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
    /// Removing a file that is already gone is not an error.
    fn remove_file(&self, path: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait LimitsProvider: Send + Sync {
    fn limits_for(&self, user: &UserId) -> EnrollmentLimits;
}

impl LimitsProvider for EnrollmentLimits {
    fn limits_for(&self, _user: &UserId) -> EnrollmentLimits {
        *self
    }
}
