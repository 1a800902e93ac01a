use crate::domain::model::{CourseSpec, EnrollmentLimits, UserId};
use crate::domain::ports::LimitsProvider;
use crate::utils::error::{EnrollError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollConfig {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_courses")]
    pub max_courses_per_user: usize,
    #[serde(default = "default_max_credits")]
    pub max_credits: u32,
    /// Per-user credit ceilings overriding `max_credits`.
    #[serde(default)]
    pub user_credit_ceilings: HashMap<String, u32>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_courses_per_user: default_max_courses(),
            max_credits: default_max_credits(),
            user_credit_ceilings: HashMap::new(),
        }
    }
}

fn default_max_courses() -> usize {
    5
}

fn default_max_credits() -> u32 {
    20
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub seed_csv: Option<String>,
    #[serde(default)]
    pub courses: Vec<CourseSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// How long a write waits for another process to release the state file.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            state_file: default_state_file(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

fn default_state_dir() -> String {
    "./enroll-data".to_string()
}

fn default_state_file() -> String {
    "state.json".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    #[serde(default)]
    pub format: LogFormat,
}

impl EnrollConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EnrollError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EnrollError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${STATE_DIR})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EnrollError::ConfigValidationError {
            field: "env_substitution".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn enrollment_limits(&self) -> EnrollmentLimits {
        EnrollmentLimits {
            max_courses: self.limits.max_courses_per_user,
            max_credits: self.limits.max_credits,
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_positive_number(
            "limits.max_courses_per_user",
            self.limits.max_courses_per_user,
            1,
        )?;
        validation::validate_range("limits.max_credits", self.limits.max_credits, 1, 200)?;
        for (user, ceiling) in &self.limits.user_credit_ceilings {
            validation::validate_non_empty_string("limits.user_credit_ceilings", user)?;
            validation::validate_range(
                &format!("limits.user_credit_ceilings.{}", user),
                *ceiling,
                1,
                200,
            )?;
        }

        validation::validate_path("storage.state_dir", &self.storage.state_dir)?;
        validation::validate_path("storage.state_file", &self.storage.state_file)?;
        validation::validate_range(
            "storage.lock_timeout_ms",
            self.storage.lock_timeout_ms,
            1,
            600_000,
        )?;

        if let Some(csv) = &self.catalog.seed_csv {
            validation::validate_path("catalog.seed_csv", csv)?;
            validation::validate_file_extensions("catalog.seed_csv", &[csv.clone()], &["csv"])?;
        }
        for course in &self.catalog.courses {
            validation::validate_course_spec("catalog.courses", course)?;
        }

        Ok(())
    }
}

impl LimitsProvider for EnrollConfig {
    fn limits_for(&self, user: &UserId) -> EnrollmentLimits {
        let mut limits = self.enrollment_limits();
        if let Some(ceiling) = self.limits.user_credit_ceilings.get(user.as_str()) {
            limits.max_credits = *ceiling;
        }
        limits
    }
}

impl Validate for EnrollConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
