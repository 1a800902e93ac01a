use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "course-enroll")]
#[command(about = "Course registration with seat, credit, schedule and prerequisite checks")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "enroll.toml")]
    pub config: String,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Print results as JSON instead of tables
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List every course with remaining seats
    Courses,

    /// Register a user for one or more courses
    Register {
        #[arg(short, long)]
        user: String,

        #[arg(long, value_delimiter = ',', required = true)]
        courses: Vec<String>,
    },

    /// Drop one course for a user
    Drop {
        #[arg(short, long)]
        user: String,

        #[arg(long)]
        course: String,
    },

    /// Show a user's registered courses and credit total
    MyCourses {
        #[arg(short, long)]
        user: String,
    },

    /// Reset saved state to the configured seed catalog
    Seed,

    /// Race many users for one course and report the outcome
    Simulate {
        #[arg(long)]
        course: String,

        #[arg(long, default_value = "50")]
        users: usize,

        /// Keep the simulated registrations in the saved state
        #[arg(long)]
        persist: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_register_command() {
        let cli = CliConfig::parse_from([
            "course-enroll",
            "--config",
            "custom.toml",
            "register",
            "--user",
            "alice",
            "--courses",
            "ds,algo",
        ]);

        assert_eq!(cli.config, "custom.toml");
        match cli.command {
            Command::Register { user, courses } => {
                assert_eq!(user, "alice");
                assert_eq!(courses, vec!["ds", "algo"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_simulate_defaults() {
        let cli = CliConfig::parse_from(["course-enroll", "simulate", "--course", "os"]);
        assert!(matches!(
            cli.command,
            Command::Simulate { users: 50, persist: false, .. }
        ));
    }
}
