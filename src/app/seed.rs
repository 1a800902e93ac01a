use crate::config::toml_config::CatalogConfig;
use crate::domain::model::{CourseId, CourseSpec, Slot};
use crate::utils::error::Result;
use crate::utils::validation::validate_course_spec;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

/// One row of a catalog CSV. `prerequisites` is a `;`-separated id list.
#[derive(Debug, Deserialize)]
struct CsvCourseRow {
    id: String,
    name: String,
    credits: u32,
    timeslot: String,
    seats: u32,
    #[serde(default)]
    prerequisites: Option<String>,
}

impl From<CsvCourseRow> for CourseSpec {
    fn from(row: CsvCourseRow) -> Self {
        let prerequisites = row
            .prerequisites
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(CourseId::new)
            .collect();

        CourseSpec {
            id: CourseId::new(row.id.trim()),
            name: row.name,
            credits: row.credits,
            slot: Slot::new(row.timeslot),
            seats: row.seats,
            prerequisites,
        }
    }
}

pub fn parse_csv_catalog<R: Read>(reader: R) -> Result<Vec<CourseSpec>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut courses = Vec::new();
    for row in csv_reader.deserialize::<CsvCourseRow>() {
        let course = CourseSpec::from(row?);
        validate_course_spec("catalog.seed_csv", &course)?;
        courses.push(course);
    }
    Ok(courses)
}

pub fn load_csv_catalog<P: AsRef<Path>>(path: P) -> Result<Vec<CourseSpec>> {
    let file = std::fs::File::open(path)?;
    parse_csv_catalog(file)
}

/// Builds the seed catalog: CSV rows first, inline courses override by id,
/// and the built-in catalog when neither is configured.
pub fn catalog_from_config(config: &CatalogConfig) -> Result<Vec<CourseSpec>> {
    let mut courses: BTreeMap<CourseId, CourseSpec> = BTreeMap::new();

    if let Some(path) = &config.seed_csv {
        for course in load_csv_catalog(path)? {
            courses.insert(course.id.clone(), course);
        }
        tracing::debug!("Loaded {} courses from {}", courses.len(), path);
    }

    for course in &config.courses {
        validate_course_spec("catalog.courses", course)?;
        courses.insert(course.id.clone(), course.clone());
    }

    if courses.is_empty() {
        tracing::info!("No catalog configured, using the default course list");
        return Ok(default_catalog());
    }
    Ok(courses.into_values().collect())
}

pub fn default_catalog() -> Vec<CourseSpec> {
    let course = |id: &str, name: &str, credits: u32, slot: &str, seats: u32| CourseSpec {
        id: CourseId::new(id),
        name: name.to_string(),
        credits,
        slot: Slot::new(slot),
        seats,
        prerequisites: BTreeSet::new(),
    };

    vec![
        course("ds", "Data Structures", 4, "Mon 9-11 AM", 65),
        course("algo", "Algorithms", 4, "Tue 11-1 PM", 70),
        course("os", "Operating Systems", 3, "Wed 2-4 PM", 60),
        course("db", "Database Systems", 3, "Thu 9-11 AM", 70),
        course("net", "Computer Networks", 3, "Fri 11-1 PM", 68),
        course("ml", "Machine Learning", 4, "Sat 10-12 AM", 66),
    ]
}
