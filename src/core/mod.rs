pub mod allocator;
pub mod coordinator;
pub mod validator;

pub use crate::domain::model::{Course, CourseId, RegistrationOutcome, UserId};
pub use crate::domain::ports::{CatalogStore, EnrollmentLedger, LimitsProvider, Storage};
pub use crate::utils::error::Result;
