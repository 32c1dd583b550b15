//! Runtime configuration with documented constants
//!
//! All tunable numbers are collected here with explanations of their purpose.
//! Values come from built-in defaults, optionally overridden by a TOML file
//! and then by environment variables.

use crate::core::error::{SprintdeskError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Upper bound for every day-count setting (ten years)
pub const MAX_DAY_OFFSET: i64 = 3650;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub engine: EngineConfig,
    pub schedule: ScheduleConfig,
}

/// Remote project API connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the project API, without trailing slash
    pub base_url: String,
    /// Login name; when absent requests are sent without a bearer token
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".into(),
            username: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

/// Batch execution settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pause before re-reading a collection after a write
    ///
    /// The API does not always return the created record, so handlers wait
    /// once and then look the entity up by name. 500ms was enough for the
    /// API to settle in practice; tests set this to 0.
    pub consistency_wait_ms: u64,

    /// Overall deadline the host applies to one batch
    pub batch_timeout_secs: u64,

    /// Default project length when a create operation gives no end date
    pub project_duration_days: i64,

    /// Default sprint length when a create operation gives no end date
    pub sprint_duration_days: i64,

    /// Default task due date offset
    pub task_due_days: i64,

    /// Failure messages listed in a batch summary
    pub max_reported_failures: usize,

    /// Candidates listed when a user lookup misses
    pub max_listed_candidates: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            consistency_wait_ms: 500,
            batch_timeout_secs: 120,
            project_duration_days: 30,
            sprint_duration_days: 14,
            task_due_days: 7,
            max_reported_failures: 3,
            max_listed_candidates: 5,
        }
    }
}

impl EngineConfig {
    pub fn consistency_wait(&self) -> Duration {
        Duration::from_millis(self.consistency_wait_ms)
    }
}

/// Constants for effort based schedule inference
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    // === CAPACITY ===
    /// Productive hours per developer per day
    pub hours_per_day: f64,

    /// Working days per week
    ///
    /// Together with `hours_per_day` this gives 30 work-hours per week.
    pub days_per_week: f64,

    /// Upper bound on developers assumed to work a sprint in parallel
    pub max_parallel_workers: usize,

    // === CALENDAR ===
    /// Multiplier applied to the raw sprint length for reviews and testing
    pub buffer_factor: f64,

    /// Days left free between consecutive sprints
    pub sprint_gap_days: i64,

    /// Bucket for tasks that do not reference a sprint
    pub default_sprint_ref: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hours_per_day: 6.0,
            days_per_week: 5.0,
            max_parallel_workers: 3,
            buffer_factor: 1.2,
            sprint_gap_days: 2,
            default_sprint_ref: "sprint1".into(),
        }
    }
}

impl ScheduleConfig {
    pub fn hours_per_week(&self) -> f64 {
        self.hours_per_day * self.days_per_week
    }
}

impl Config {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TOML file and apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SprintdeskError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text; missing tables keep defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SprintdeskError::Config(format!("Invalid TOML: {}", e)))
    }

    /// Defaults plus environment overrides, for runs without a config file
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Override API settings from `SPRINTDESK_API_*` variables
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SPRINTDESK_API_URL") {
            self.api.base_url = url;
        }
        if let Ok(user) = std::env::var("SPRINTDESK_API_USER") {
            self.api.username = Some(user);
        }
        if let Ok(password) = std::env::var("SPRINTDESK_API_PASSWORD") {
            self.api.password = Some(password);
        }
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(SprintdeskError::Config("api.base_url must not be empty".into()));
        }

        if self.api.username.is_some() != self.api.password.is_some() {
            return Err(SprintdeskError::Config(
                "api.username and api.password must be set together".into(),
            ));
        }

        let schedule = &self.schedule;
        if schedule.hours_per_day <= 0.0 || schedule.days_per_week <= 0.0 {
            return Err(SprintdeskError::Config(
                "schedule capacity (hours_per_day, days_per_week) must be positive".into(),
            ));
        }

        if schedule.max_parallel_workers == 0 {
            return Err(SprintdeskError::Config(
                "schedule.max_parallel_workers must be at least 1".into(),
            ));
        }

        if schedule.buffer_factor < 1.0 {
            return Err(SprintdeskError::Config(format!(
                "schedule.buffer_factor ({}) should be >= 1.0",
                schedule.buffer_factor
            )));
        }

        let day_counts = [
            ("engine.project_duration_days", self.engine.project_duration_days, 1),
            ("engine.sprint_duration_days", self.engine.sprint_duration_days, 1),
            ("engine.task_due_days", self.engine.task_due_days, 0),
            ("schedule.sprint_gap_days", schedule.sprint_gap_days, 0),
        ];
        for (name, days, min) in day_counts {
            if !(min..=MAX_DAY_OFFSET).contains(&days) {
                return Err(SprintdeskError::Config(format!(
                    "{} ({}) must be between {} and {}",
                    name, days, min, MAX_DAY_OFFSET
                )));
            }
        }

        Ok(())
    }
}
