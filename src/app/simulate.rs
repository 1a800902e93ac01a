use crate::core::coordinator::EnrollmentCoordinator;
use crate::domain::model::{CourseId, UserId};
use crate::domain::ports::{CatalogStore, EnrollmentLedger, LimitsProvider};
use crate::utils::error::EnrollError;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Default, Serialize)]
pub struct RaceReport {
    pub winners: Vec<UserId>,
    pub sold_out: usize,
    pub other_failures: Vec<(UserId, String)>,
    pub seats_left: u32,
}

/// Registers `users` distinct synthetic users for `course` at the same time.
pub async fn race_for_course<C, L, P>(
    coordinator: Arc<EnrollmentCoordinator<C, L, P>>,
    course: CourseId,
    users: usize,
) -> crate::utils::error::Result<RaceReport>
where
    C: CatalogStore + 'static,
    L: EnrollmentLedger + 'static,
    P: LimitsProvider + 'static,
{
    let mut tasks = JoinSet::new();
    for n in 0..users {
        let coordinator = Arc::clone(&coordinator);
        let course = course.clone();
        tasks.spawn(async move {
            let user = UserId::new(format!("sim-{:04}", n));
            let outcome = coordinator.register(&user, &[course]).await;
            (user, outcome)
        });
    }

    let mut report = RaceReport::default();
    while let Some(joined) = tasks.join_next().await {
        let (user, outcome) = joined.map_err(|e| EnrollError::StorageError {
            message: format!("simulation task failed: {}", e),
        })?;
        match outcome {
            Ok(outcome) if !outcome.applied.is_empty() => report.winners.push(user),
            Ok(_) => report.other_failures.push((user, "course not in catalog".to_string())),
            Err(EnrollError::NoSeatsAvailable { .. }) => report.sold_out += 1,
            Err(e) => report.other_failures.push((user, e.to_string())),
        }
    }

    report.winners.sort();
    report.seats_left = coordinator.catalog().get_course(&course).await?.seats_remaining;
    tracing::info!(
        "Race for {}: {} winners, {} sold out, {} other failures",
        course,
        report.winners.len(),
        report.sold_out,
        report.other_failures.len()
    );
    Ok(report)
}
