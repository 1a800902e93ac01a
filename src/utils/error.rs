use crate::domain::model::{CourseId, Slot};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("Already registered for every requested course")]
    AlreadyRegistered,

    #[error("Too many courses: {requested} requested, limit is {limit}")]
    TooManyCourses { requested: usize, limit: usize },

    #[error("Credit limit exceeded: {requested} credits requested, limit is {limit}")]
    CreditLimitExceeded { requested: u64, limit: u32 },

    #[error("Schedule conflict: {course} overlaps slot {slot}")]
    ScheduleConflict { course: CourseId, slot: Slot },

    #[error("Prerequisites unmet for {course}: missing {}", join_ids(.missing))]
    PrerequisitesUnmet {
        course: CourseId,
        missing: Vec<CourseId>,
    },

    #[error("{course} has no seats left")]
    NoSeatsAvailable { course: CourseId },

    #[error("Not registered for {course}")]
    NotRegistered { course: CourseId },

    #[error("Course not found: {course}")]
    NotFound { course: CourseId },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("State in {file} changed since it was loaded (revision {expected}, now {found})")]
    StaleState {
        file: String,
        expected: u64,
        found: u64,
    },

    #[error("State file {file} is locked by another process")]
    StateLocked { file: String },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

fn join_ids(ids: &[CourseId]) -> String {
    ids.iter()
        .map(CourseId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Registration,
    Capacity,
    Configuration,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EnrollError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AlreadyRegistered
            | Self::TooManyCourses { .. }
            | Self::CreditLimitExceeded { .. }
            | Self::ScheduleConflict { .. }
            | Self::PrerequisitesUnmet { .. }
            | Self::NotRegistered { .. }
            | Self::NotFound { .. } => ErrorCategory::Registration,
            Self::NoSeatsAvailable { .. } => ErrorCategory::Capacity,
            Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::IoError(_)
            | Self::SerializationError(_)
            | Self::CsvError(_)
            | Self::StorageError { .. }
            | Self::StaleState { .. }
            | Self::StateLocked { .. } => ErrorCategory::Storage,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        if self.is_contention() {
            return ErrorSeverity::Medium;
        }
        match self.category() {
            ErrorCategory::Registration => ErrorSeverity::High,
            // 名額可能因他人退選而釋出，可重試
            ErrorCategory::Capacity => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Storage => ErrorSeverity::Critical,
        }
    }

    /// True when another writer got to the state file first; reloading and
    /// retrying is safe.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::StaleState { .. } | Self::StateLocked { .. })
    }

    /// True for the closed set of admissibility failures a caller can branch on.
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Registration | ErrorCategory::Capacity
        )
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::AlreadyRegistered => {
                "You are already registered for these courses".to_string()
            }
            Self::TooManyCourses { limit, .. } => {
                format!("Cannot register for more than {} courses", limit)
            }
            Self::CreditLimitExceeded { limit, .. } => {
                format!("Cannot select more than {} credits", limit)
            }
            Self::ScheduleConflict { course, slot } => {
                format!("{} clashes with another course at {}", course, slot)
            }
            Self::PrerequisitesUnmet { course, missing } => format!(
                "{} requires completing {} first",
                course,
                join_ids(missing)
            ),
            Self::NoSeatsAvailable { course } => format!("{} has no seats left", course),
            Self::NotRegistered { course } => format!("You are not registered for {}", course),
            Self::NotFound { course } => format!("Course {} does not exist", course),
            Self::StaleState { .. } | Self::StateLocked { .. } => {
                "Another registration was saved at the same time; nothing was changed".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::AlreadyRegistered => "Pick courses you do not already hold",
            Self::TooManyCourses { .. } => "Drop a course or submit fewer courses",
            Self::CreditLimitExceeded { .. } => "Choose courses with fewer credits",
            Self::ScheduleConflict { .. } => "Choose a course in a different time slot",
            Self::PrerequisitesUnmet { .. } => "Register for the prerequisite courses first",
            Self::NoSeatsAvailable { .. } => "Retry without this course or wait for a seat to free up",
            Self::NotRegistered { .. } => "Check your registered courses with my-courses",
            Self::NotFound { .. } => "List the catalog to find valid course ids",
            Self::IoError(_) | Self::StorageError { .. } => {
                "Check that the state directory exists and is writable"
            }
            Self::StaleState { .. } | Self::StateLocked { .. } => "Run the command again",
            Self::SerializationError(_) => "The state file may be corrupt; remove it and reseed",
            Self::CsvError(_) => "Check the catalog CSV header and column values",
            Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => "Fix the configuration file and retry",
        }
    }
}

pub type Result<T> = std::result::Result<T, EnrollError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_violations_are_recoverable() {
        let err = EnrollError::NoSeatsAvailable {
            course: CourseId::new("os"),
        };
        assert!(err.is_rule_violation());
        assert_eq!(err.category(), ErrorCategory::Capacity);
        assert_eq!(err.severity(), ErrorSeverity::Medium);

        let err = EnrollError::StorageError {
            message: "disk full".to_string(),
        };
        assert!(!err.is_rule_violation());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_state_contention_is_retryable() {
        let err = EnrollError::StaleState {
            file: "state.json".to_string(),
            expected: 3,
            found: 4,
        };
        assert!(err.is_contention());
        assert!(!err.is_rule_violation());
        assert_eq!(err.category(), ErrorCategory::Storage);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert_eq!(err.recovery_suggestion(), "Run the command again");
    }

    #[test]
    fn test_prerequisite_message_lists_missing() {
        let err = EnrollError::PrerequisitesUnmet {
            course: CourseId::new("ml"),
            missing: vec![CourseId::new("ds"), CourseId::new("algo")],
        };
        assert_eq!(err.to_string(), "Prerequisites unmet for ml: missing ds, algo");
        assert_eq!(err.user_friendly_message(), "ml requires completing ds, algo first");
    }
}
