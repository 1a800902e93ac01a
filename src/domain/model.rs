use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a course in the catalog. Ordering of ids is the global
/// lock order used when a batch touches several seat counters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Opaque schedule token. Two courses conflict iff their slots are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(pub String);

macro_rules! string_id {
    ($($ty:ident),*) => {$(
        impl $ty {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $ty {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    )*};
}

string_id!(CourseId, UserId, Slot);

/// Catalog definition of a course, as seeded or edited by catalog management.
/// `seats` is the configured capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSpec {
    pub id: CourseId,
    pub name: String,
    pub credits: u32,
    pub slot: Slot,
    pub seats: u32,
    #[serde(default)]
    pub prerequisites: BTreeSet<CourseId>,
}

/// Point-in-time view of a course, including its remaining seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub credits: u32,
    pub slot: Slot,
    pub capacity: u32,
    pub seats_remaining: u32,
    pub prerequisites: BTreeSet<CourseId>,
}

impl Course {
    pub fn is_exhausted(&self) -> bool {
        self.seats_remaining == 0
    }
}

/// Snapshot of a user's registrations, in registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEnrollment {
    pub user: UserId,
    pub courses: Vec<CourseId>,
}

impl UserEnrollment {
    pub fn new(user: UserId, courses: Vec<CourseId>) -> Self {
        Self { user, courses }
    }

    pub fn holds(&self, course: &CourseId) -> bool {
        self.courses.contains(course)
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    /// Credit total, recomputed from the catalog every time. Courses no
    /// longer present in the catalog count as zero. Summed in `u64` so no
    /// catalog weight can overflow it.
    pub fn credit_total(&self, catalog: &[Course]) -> u64 {
        self.courses
            .iter()
            .filter_map(|id| catalog.iter().find(|c| &c.id == id))
            .map(|c| u64::from(c.credits))
            .sum()
    }
}

/// Limits applied to one user's registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentLimits {
    pub max_courses: usize,
    pub max_credits: u32,
}

impl Default for EnrollmentLimits {
    fn default() -> Self {
        Self {
            max_courses: 5,
            max_credits: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationOutcome {
    pub applied: Vec<Course>,
    pub catalog: Vec<Course>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropOutcome {
    pub dropped: CourseId,
    pub remaining: Vec<Course>,
}
