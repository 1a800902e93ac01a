pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliConfig, Command};

pub use adapters::{
    memory::{InMemoryCatalog, InMemoryLedger},
    storage::LocalStorage,
};
pub use app::EnrollmentService;
pub use config::EnrollConfig;
pub use core::{
    allocator::SeatAllocator, coordinator::EnrollmentCoordinator,
    validator::RegistrationValidator,
};
pub use domain::model::{
    Course, CourseId, CourseSpec, DropOutcome, EnrollmentLimits, RegistrationOutcome, Slot,
    UserEnrollment, UserId,
};
pub use utils::error::{EnrollError, Result};
