use anyhow::Context;
use clap::Parser;
use course_enroll::app::simulate::race_for_course;
use course_enroll::utils::error::{EnrollError, ErrorSeverity};
use course_enroll::utils::{logger, validation::Validate};
use course_enroll::{
    CliConfig, Command, Course, CourseId, EnrollConfig, EnrollmentService, LocalStorage, UserId,
};
use serde::Serialize;
use std::path::Path;

const DEFAULT_CONFIG: &str = "enroll.toml";
/// Attempts for a write that keeps losing the state file to other processes.
const WRITE_ATTEMPTS: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    let config = load_config(&cli.config)?;

    // 初始化日誌
    logger::init_logger(
        cli.verbose,
        config.logging.level.as_deref(),
        config.logging.format,
    );
    tracing::debug!("CLI config: {:?}", cli);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(1);
    }

    let storage = LocalStorage::new(config.storage.state_dir.clone());

    if let Err(e) = run(&cli, config, storage).await {
        tracing::error!(
            "❌ Operation failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        // 規則違反與系統錯誤使用不同的退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<EnrollConfig> {
    if !Path::new(path).exists() && path == DEFAULT_CONFIG {
        return Ok(EnrollConfig::default());
    }
    EnrollConfig::from_file(path)
        .with_context(|| format!("Failed to load config file '{}'", path))
}

async fn run(
    cli: &CliConfig,
    config: EnrollConfig,
    storage: LocalStorage,
) -> Result<(), EnrollError> {
    match &cli.command {
        Command::Seed => {
            let service = EnrollmentService::reseed(config, storage).await?;
            let courses = service.list_courses().await?;
            println!("✅ Seeded {} courses", courses.len());
            print_courses(cli.json, &courses)?;
        }
        Command::Courses => {
            let service = EnrollmentService::open(config, storage).await?;
            print_courses(cli.json, &service.list_courses().await?)?;
        }
        Command::Register { user, courses } => {
            let user = UserId::new(user.as_str());
            let ids: Vec<CourseId> = courses.iter().map(|c| CourseId::new(c.trim())).collect();
            let mut attempt = 1;
            let outcome = loop {
                let service = EnrollmentService::open(config.clone(), storage.clone()).await?;
                match service.register(&user, &ids).await {
                    Err(e) if e.is_contention() && attempt < WRITE_ATTEMPTS => {
                        tracing::warn!("Attempt {} lost the state file: {}; reloading", attempt, e);
                        attempt += 1;
                    }
                    result => break result?,
                }
            };
            if outcome.applied.is_empty() {
                println!("⚠️  None of the requested courses exist; nothing registered");
            } else {
                println!("✅ Courses registered successfully");
            }
            print_courses(cli.json, &outcome.applied)?;
        }
        Command::Drop { user, course } => {
            let user = UserId::new(user.as_str());
            let course = CourseId::new(course.as_str());
            let mut attempt = 1;
            let outcome = loop {
                let service = EnrollmentService::open(config.clone(), storage.clone()).await?;
                match service.drop_course(&user, &course).await {
                    Err(e) if e.is_contention() && attempt < WRITE_ATTEMPTS => {
                        tracing::warn!("Attempt {} lost the state file: {}; reloading", attempt, e);
                        attempt += 1;
                    }
                    result => break result?,
                }
            };
            println!("✅ Dropped {}", outcome.dropped);
            print_courses(cli.json, &outcome.remaining)?;
        }
        Command::MyCourses { user } => {
            let service = EnrollmentService::open(config, storage).await?;
            let user = UserId::new(user.as_str());
            let courses = service.list_my_courses(&user).await?;
            let credits: u64 = courses.iter().map(|c| u64::from(c.credits)).sum();
            print_courses(cli.json, &courses)?;
            if !cli.json {
                println!("Total credits: {}", credits);
            }
        }
        Command::Simulate {
            course,
            users,
            persist,
        } => {
            let service = EnrollmentService::open(config, storage).await?;
            let report =
                race_for_course(service.coordinator(), CourseId::new(course.as_str()), *users)
                    .await?;
            if *persist {
                service.persist().await?;
            }
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "🏁 {} winners, {} sold out, {} other failures, {} seats left",
                    report.winners.len(),
                    report.sold_out,
                    report.other_failures.len(),
                    report.seats_left
                );
                for (user, reason) in &report.other_failures {
                    println!("  {}: {}", user, reason);
                }
            }
        }
    }
    Ok(())
}

fn print_courses(json: bool, courses: &[Course]) -> Result<(), EnrollError> {
    if json {
        return print_json(&courses);
    }

    println!(
        "{:<8} {:<24} {:>7} {:<16} {:>9}  {}",
        "ID", "NAME", "CREDITS", "SLOT", "SEATS", "PREREQS"
    );
    for course in courses {
        let prereqs: Vec<&str> = course.prerequisites.iter().map(CourseId::as_str).collect();
        println!(
            "{:<8} {:<24} {:>7} {:<16} {:>4}/{:<4}  {}",
            course.id,
            course.name,
            course.credits,
            course.slot,
            course.seats_remaining,
            course.capacity,
            prereqs.join(",")
        );
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), EnrollError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
