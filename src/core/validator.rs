//! Registration admissibility rules.
//!
//! Rules run in a fixed order and the first violation wins, so every
//! failure names exactly one reason:
//!
//! 1. drop candidates the user already holds (`AlreadyRegistered` if none remain)
//! 2. skip candidates the catalog does not know
//! 3. course-count ceiling, then credit ceiling
//! 4. schedule conflicts, against held courses and earlier candidates
//! 5. prerequisites, against held courses only
//! 6. remaining seats
//!
//! Validation never mutates anything. The returned list is exactly what the
//! allocator must commit.

use crate::domain::model::{Course, CourseId, EnrollmentLimits, Slot, UserEnrollment};
use crate::utils::error::{EnrollError, Result};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationValidator {
    limits: EnrollmentLimits,
}

impl RegistrationValidator {
    pub fn new(limits: EnrollmentLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> EnrollmentLimits {
        self.limits
    }

    pub fn validate(
        &self,
        current: &UserEnrollment,
        catalog: &[Course],
        candidates: &[CourseId],
    ) -> Result<Vec<Course>> {
        let fresh = filter_new_candidates(current, candidates)?;
        let resolved = resolve_in_catalog(catalog, &fresh);

        check_course_count(current, &resolved, self.limits.max_courses)?;
        check_credit_ceiling(current, catalog, &resolved, self.limits.max_credits)?;
        check_schedule(current, catalog, &resolved)?;
        check_prerequisites(current, &resolved)?;
        check_capacity(&resolved)?;

        Ok(resolved)
    }
}

/// Removes held courses and in-request duplicates, keeping first occurrence order.
pub fn filter_new_candidates(
    current: &UserEnrollment,
    candidates: &[CourseId],
) -> Result<Vec<CourseId>> {
    let mut seen = HashSet::new();
    let fresh: Vec<CourseId> = candidates
        .iter()
        .filter(|id| !current.holds(id))
        .filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect();

    if fresh.is_empty() {
        return Err(EnrollError::AlreadyRegistered);
    }
    Ok(fresh)
}

/// Unknown ids are skipped, not rejected.
pub fn resolve_in_catalog(catalog: &[Course], ids: &[CourseId]) -> Vec<Course> {
    let index: HashMap<&CourseId, &Course> = catalog.iter().map(|c| (&c.id, c)).collect();
    ids.iter()
        .filter_map(|id| index.get(id).map(|c| (*c).clone()))
        .collect()
}

pub fn check_course_count(
    current: &UserEnrollment,
    resolved: &[Course],
    max_courses: usize,
) -> Result<()> {
    let requested = current.len() + resolved.len();
    if requested > max_courses {
        return Err(EnrollError::TooManyCourses {
            requested,
            limit: max_courses,
        });
    }
    Ok(())
}

pub fn check_credit_ceiling(
    current: &UserEnrollment,
    catalog: &[Course],
    resolved: &[Course],
    max_credits: u32,
) -> Result<()> {
    let requested = current.credit_total(catalog)
        + resolved.iter().map(|c| u64::from(c.credits)).sum::<u64>();
    if requested > u64::from(max_credits) {
        return Err(EnrollError::CreditLimitExceeded {
            requested,
            limit: max_credits,
        });
    }
    Ok(())
}

pub fn check_schedule(
    current: &UserEnrollment,
    catalog: &[Course],
    resolved: &[Course],
) -> Result<()> {
    let held = resolve_in_catalog(catalog, &current.courses);
    let mut taken: HashSet<&Slot> = held.iter().map(|c| &c.slot).collect();

    for course in resolved {
        // insert 回傳 false 代表同一時段已被佔用（含同批次較早的候選）
        if !taken.insert(&course.slot) {
            return Err(EnrollError::ScheduleConflict {
                course: course.id.clone(),
                slot: course.slot.clone(),
            });
        }
    }
    Ok(())
}

pub fn check_prerequisites(current: &UserEnrollment, resolved: &[Course]) -> Result<()> {
    for course in resolved {
        let missing: Vec<CourseId> = course
            .prerequisites
            .iter()
            .filter(|prereq| !current.holds(prereq))
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(EnrollError::PrerequisitesUnmet {
                course: course.id.clone(),
                missing,
            });
        }
    }
    Ok(())
}

pub fn check_capacity(resolved: &[Course]) -> Result<()> {
    match resolved.iter().find(|c| c.is_exhausted()) {
        Some(course) => Err(EnrollError::NoSeatsAvailable {
            course: course.id.clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Slot, UserId};
    use std::collections::BTreeSet;

    fn course(id: &str, slot: &str, credits: u32, seats: u32, prereqs: &[&str]) -> Course {
        Course {
            id: CourseId::new(id),
            name: id.to_uppercase(),
            credits,
            slot: Slot::new(slot),
            capacity: seats.max(1),
            seats_remaining: seats,
            prerequisites: prereqs.iter().map(|p| CourseId::new(*p)).collect::<BTreeSet<_>>(),
        }
    }

    fn enrollment(ids: &[&str]) -> UserEnrollment {
        UserEnrollment::new(
            UserId::new("alice"),
            ids.iter().map(|id| CourseId::new(*id)).collect(),
        )
    }

    fn ids(ids: &[&str]) -> Vec<CourseId> {
        ids.iter().map(|id| CourseId::new(*id)).collect()
    }

    fn catalog() -> Vec<Course> {
        vec![
            course("a", "Mon-9", 4, 1, &[]),
            course("b", "Mon-9", 3, 5, &["a"]),
            course("c", "Tue-11", 3, 0, &[]),
            course("d", "Wed-14", 3, 10, &[]),
            course("e", "Thu-9", 4, 10, &[]),
            course("f", "Fri-11", 4, 10, &[]),
            course("g", "Sat-10", 4, 10, &[]),
        ]
    }

    #[test]
    fn test_already_registered_when_nothing_new() {
        let validator = RegistrationValidator::default();
        let err = validator
            .validate(&enrollment(&["d"]), &catalog(), &ids(&["d", "d"]))
            .unwrap_err();
        assert!(matches!(err, EnrollError::AlreadyRegistered));
    }

    #[test]
    fn test_held_and_duplicate_candidates_are_filtered() {
        let validator = RegistrationValidator::default();
        let applied = validator
            .validate(&enrollment(&["d"]), &catalog(), &ids(&["d", "e", "e"]))
            .unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].id, CourseId::new("e"));
    }

    #[test]
    fn test_unknown_courses_are_skipped() {
        let validator = RegistrationValidator::default();
        let applied = validator
            .validate(&enrollment(&[]), &catalog(), &ids(&["ghost", "d"]))
            .unwrap();
        assert_eq!(applied.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["d"]);

        let applied = validator
            .validate(&enrollment(&[]), &catalog(), &ids(&["ghost"]))
            .unwrap();
        assert!(applied.is_empty());
    }

    #[test]
    fn test_too_many_courses() {
        let validator = RegistrationValidator::new(EnrollmentLimits {
            max_courses: 2,
            max_credits: 100,
        });
        let err = validator
            .validate(&enrollment(&["d"]), &catalog(), &ids(&["e", "f"]))
            .unwrap_err();
        assert!(matches!(
            err,
            EnrollError::TooManyCourses { requested: 3, limit: 2 }
        ));
    }

    #[test]
    fn test_credit_ceiling_counts_current_registrations() {
        let validator = RegistrationValidator::new(EnrollmentLimits {
            max_courses: 10,
            max_credits: 10,
        });
        let err = validator
            .validate(&enrollment(&["d", "e"]), &catalog(), &ids(&["f"]))
            .unwrap_err();
        assert!(matches!(
            err,
            EnrollError::CreditLimitExceeded { requested: 11, limit: 10 }
        ));
    }

    #[test]
    fn test_huge_credit_weights_do_not_wrap_past_ceiling() {
        let catalog = vec![
            course("x", "Mon-9", 2_147_483_648, 5, &[]),
            course("y", "Tue-9", 2_147_483_648, 5, &[]),
        ];
        let validator = RegistrationValidator::default();
        let err = validator
            .validate(&enrollment(&[]), &catalog, &ids(&["x", "y"]))
            .unwrap_err();
        assert!(matches!(
            err,
            EnrollError::CreditLimitExceeded { requested: 4_294_967_296, limit: 20 }
        ));

        let err = validator
            .validate(&enrollment(&["x"]), &catalog, &ids(&["y"]))
            .unwrap_err();
        assert!(matches!(err, EnrollError::CreditLimitExceeded { .. }));
    }

    #[test]
    fn test_batch_internal_schedule_conflict() {
        let validator = RegistrationValidator::default();
        let err = validator
            .validate(&enrollment(&[]), &catalog(), &ids(&["a", "b"]))
            .unwrap_err();
        match err {
            EnrollError::ScheduleConflict { course, slot } => {
                assert_eq!(course, CourseId::new("b"));
                assert_eq!(slot, Slot::new("Mon-9"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_conflict_with_registered_course() {
        let mut cat = catalog();
        cat.push(course("h", "Wed-14", 2, 10, &[]));
        let validator = RegistrationValidator::default();
        let err = validator
            .validate(&enrollment(&["d"]), &cat, &ids(&["h"]))
            .unwrap_err();
        assert!(matches!(err, EnrollError::ScheduleConflict { course, .. } if course.as_str() == "h"));
    }

    #[test]
    fn test_prerequisite_in_same_batch_does_not_count() {
        let mut cat = catalog();
        cat.push(course("ml", "Sun-9", 3, 10, &["d", "zzz"]));
        let validator = RegistrationValidator::default();
        let err = validator
            .validate(&enrollment(&[]), &cat, &ids(&["d", "ml"]))
            .unwrap_err();
        match err {
            EnrollError::PrerequisitesUnmet { course, missing } => {
                assert_eq!(course, CourseId::new("ml"));
                assert_eq!(missing, ids(&["d", "zzz"]));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_prerequisite_met_by_current_registration() {
        let validator = RegistrationValidator::default();
        // a 與 b 同時段，先觸發時段衝突
        let err = validator
            .validate(&enrollment(&["a"]), &catalog(), &ids(&["b"]))
            .unwrap_err();
        assert!(matches!(err, EnrollError::ScheduleConflict { .. }));

        let mut cat = catalog();
        cat.push(course("adv", "Sun-9", 3, 10, &["a"]));
        let applied = validator
            .validate(&enrollment(&["a"]), &cat, &ids(&["adv"]))
            .unwrap();
        assert_eq!(applied[0].id, CourseId::new("adv"));
    }

    #[test]
    fn test_no_seats() {
        let validator = RegistrationValidator::default();
        let err = validator
            .validate(&enrollment(&[]), &catalog(), &ids(&["d", "c"]))
            .unwrap_err();
        assert!(matches!(err, EnrollError::NoSeatsAvailable { course } if course.as_str() == "c"));
    }

    #[test]
    fn test_result_preserves_request_order() {
        let validator = RegistrationValidator::default();
        let applied = validator
            .validate(&enrollment(&[]), &catalog(), &ids(&["g", "d", "e"]))
            .unwrap();
        let order: Vec<&str> = applied.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["g", "d", "e"]);
    }
}
