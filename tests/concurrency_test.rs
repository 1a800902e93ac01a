use course_enroll::app::simulate::race_for_course;
use course_enroll::domain::ports::{CatalogStore, EnrollmentLedger};
use course_enroll::{
    CourseId, CourseSpec, EnrollError, EnrollmentCoordinator, EnrollmentLimits, InMemoryCatalog,
    InMemoryLedger, Slot, UserId,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;

type Coordinator = EnrollmentCoordinator<InMemoryCatalog, InMemoryLedger, EnrollmentLimits>;

fn spec(id: &str, slot: &str, seats: u32) -> CourseSpec {
    CourseSpec {
        id: CourseId::new(id),
        name: format!("Course {}", id),
        credits: 3,
        slot: Slot::new(slot),
        seats,
        prerequisites: BTreeSet::new(),
    }
}

fn coordinator(specs: Vec<CourseSpec>) -> Arc<Coordinator> {
    Arc::new(EnrollmentCoordinator::new(
        Arc::new(InMemoryCatalog::from_specs(specs)),
        Arc::new(InMemoryLedger::new()),
        EnrollmentLimits::default(),
    ))
}

async fn seats(coordinator: &Coordinator, id: &str) -> u32 {
    coordinator
        .catalog()
        .get_course(&CourseId::new(id))
        .await
        .unwrap()
        .seats_remaining
}

async fn holders(coordinator: &Coordinator, users: &[UserId], id: &str) -> usize {
    let mut count = 0;
    for user in users {
        let held = coordinator.ledger().get_user_courses(user).await.unwrap();
        if held.contains(&CourseId::new(id)) {
            count += 1;
        }
    }
    count
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_last_seat_has_exactly_one_winner() {
    let coordinator = coordinator(vec![spec("os", "Wed-14", 1)]);

    let report = race_for_course(Arc::clone(&coordinator), CourseId::new("os"), 64)
        .await
        .unwrap();

    assert_eq!(report.winners.len(), 1);
    assert_eq!(report.sold_out, 63);
    assert!(report.other_failures.is_empty());
    assert_eq!(report.seats_left, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_winners_never_exceed_capacity() {
    let coordinator = coordinator(vec![spec("db", "Thu-9", 7)]);

    let report = race_for_course(Arc::clone(&coordinator), CourseId::new("db"), 100)
        .await
        .unwrap();

    assert_eq!(report.winners.len(), 7);
    assert_eq!(report.sold_out, 93);
    assert_eq!(seats(&coordinator, "db").await, 0);
    assert_eq!(holders(&coordinator, &report.winners, "db").await, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_overlapping_batches_in_opposite_order_do_not_deadlock() {
    let coordinator = coordinator(vec![spec("a", "Mon-9", 20), spec("b", "Tue-9", 20)]);

    let mut tasks = JoinSet::new();
    for n in 0..40 {
        let coordinator = Arc::clone(&coordinator);
        tasks.spawn(async move {
            let user = UserId::new(format!("user-{}", n));
            let batch = if n % 2 == 0 {
                vec![CourseId::new("a"), CourseId::new("b")]
            } else {
                vec![CourseId::new("b"), CourseId::new("a")]
            };
            (user.clone(), coordinator.register(&user, &batch).await)
        });
    }

    let joined = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        let mut results = Vec::new();
        while let Some(result) = tasks.join_next().await {
            results.push(result.unwrap());
        }
        results
    })
    .await
    .expect("registrations deadlocked");

    let winners: Vec<UserId> = joined
        .iter()
        .filter(|(_, outcome)| outcome.is_ok())
        .map(|(user, _)| user.clone())
        .collect();

    assert_eq!(winners.len(), 20);
    for (_, outcome) in &joined {
        if let Err(e) = outcome {
            assert!(matches!(e, EnrollError::NoSeatsAvailable { .. }));
        }
    }
    assert_eq!(seats(&coordinator, "a").await, 0);
    assert_eq!(seats(&coordinator, "b").await, 0);
    // 全有或全無：每位成功者同時持有兩門課
    assert_eq!(holders(&coordinator, &winners, "a").await, 20);
    assert_eq!(holders(&coordinator, &winners, "b").await, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_user_conflicting_batches_cannot_both_apply() {
    let coordinator = coordinator(vec![
        spec("morning-a", "Mon-9", 50),
        spec("morning-b", "Mon-9", 50),
    ]);
    let user = UserId::new("racer");

    let mut tasks = JoinSet::new();
    for id in ["morning-a", "morning-b"] {
        let coordinator = Arc::clone(&coordinator);
        let user = user.clone();
        tasks.spawn(async move { coordinator.register(&user, &[CourseId::new(id)]).await });
    }

    let mut successes = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert!(matches!(e, EnrollError::ScheduleConflict { .. })),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(coordinator.list_my_courses(&user).await.unwrap().len(), 1);
    assert_eq!(
        seats(&coordinator, "morning-a").await + seats(&coordinator, "morning-b").await,
        99
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_register_drop_churn_keeps_seat_accounting() {
    let coordinator = coordinator(vec![spec("net", "Fri-11", 3)]);
    let users: Vec<UserId> = (0..12).map(|n| UserId::new(format!("churn-{}", n))).collect();

    let mut tasks = JoinSet::new();
    for user in users.clone() {
        let coordinator = Arc::clone(&coordinator);
        tasks.spawn(async move {
            let net = CourseId::new("net");
            for _ in 0..25 {
                if coordinator.register(&user, &[net.clone()]).await.is_ok() {
                    tokio::task::yield_now().await;
                    coordinator.drop_course(&user, &net).await.unwrap();
                }
                // 重複退選不可讓名額膨脹
                let _ = coordinator.drop_course(&user, &net).await;
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    assert_eq!(seats(&coordinator, "net").await, 3);
    assert_eq!(holders(&coordinator, &users, "net").await, 0);
}
