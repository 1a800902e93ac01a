use crate::domain::model::CourseSpec;
use crate::utils::error::{EnrollError, Result};
use std::collections::HashSet;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(EnrollError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(EnrollError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(EnrollError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_file_extensions(
    field_name: &str,
    files: &[String],
    allowed_extensions: &[&str],
) -> Result<()> {
    let allowed_set: HashSet<&str> = allowed_extensions.iter().copied().collect();

    for file in files {
        match std::path::Path::new(file)
            .extension()
            .and_then(|ext| ext.to_str())
        {
            Some(extension) if allowed_set.contains(extension) => {}
            Some(extension) => {
                return Err(EnrollError::InvalidConfigValueError {
                    field: field_name.to_string(),
                    value: file.clone(),
                    reason: format!(
                        "Unsupported file extension: {}. Allowed extensions: {}",
                        extension,
                        allowed_extensions.join(", ")
                    ),
                });
            }
            None => {
                return Err(EnrollError::InvalidConfigValueError {
                    field: field_name.to_string(),
                    value: file.clone(),
                    reason: "File has no extension or invalid filename".to_string(),
                });
            }
        }
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EnrollError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(EnrollError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// Largest credit weight a single catalog entry may carry.
pub const MAX_COURSE_CREDITS: u32 = 200;

/// Checks a catalog entry before it is seeded. Prerequisites may name
/// courses that do not exist yet.
pub fn validate_course_spec(field_name: &str, course: &CourseSpec) -> Result<()> {
    validate_non_empty_string(&format!("{}.id", field_name), course.id.as_str())?;
    validate_non_empty_string(&format!("{}.{}.name", field_name, course.id), &course.name)?;
    validate_non_empty_string(&format!("{}.{}.slot", field_name, course.id), course.slot.as_str())?;

    validate_range(
        &format!("{}.{}.credits", field_name, course.id),
        course.credits,
        1,
        MAX_COURSE_CREDITS,
    )?;

    if course.prerequisites.contains(&course.id) {
        return Err(EnrollError::InvalidConfigValueError {
            field: format!("{}.{}.prerequisites", field_name, course.id),
            value: course.id.to_string(),
            reason: "A course cannot be its own prerequisite".to_string(),
        });
    }

    Ok(())
}
