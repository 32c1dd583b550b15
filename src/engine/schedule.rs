//! Effort based schedule inference
//!
//! After a batch that created tasks, sprint and project dates are derived
//! from keyword effort estimates and written back to the API. The
//! computation is pure; persistence is best effort and never fails a batch.

use crate::api::ProjectApi;
use crate::core::config::ScheduleConfig;
use crate::core::types::{as_id, format_timestamp, non_empty_str, EntityKind, Record};
use crate::engine::references::{token_name, ReferenceTable};
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;

// === EFFORT KEYWORDS ===
const COMPLEX_KEYWORDS: &[&str] = &[
    "integration",
    "deploy",
    "optimization",
    "testing",
    "security",
    "performance",
    "animation",
];
const MEDIUM_KEYWORDS: &[&str] = &[
    "component", "page", "api", "endpoint", "form", "auth", "database", "model",
];
const SIMPLE_KEYWORDS: &[&str] = &["setup", "config", "install", "basic", "simple", "create", "add"];

/// Effort class of a task, from keywords in its text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effort {
    Complex,
    Medium,
    Simple,
    Default,
}

impl Effort {
    pub fn hours(&self) -> f64 {
        match self {
            Effort::Complex => 16.0,
            Effort::Medium => 12.0,
            Effort::Simple => 6.0,
            Effort::Default => 8.0,
        }
    }

    fn of_text(text: &str) -> Option<Effort> {
        let text = text.to_lowercase();
        let has = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));
        if has(COMPLEX_KEYWORDS) {
            Some(Effort::Complex)
        } else if has(MEDIUM_KEYWORDS) {
            Some(Effort::Medium)
        } else if has(SIMPLE_KEYWORDS) {
            Some(Effort::Simple)
        } else {
            None
        }
    }

    /// Title decides first; the description only when the title has no keyword
    pub fn classify(title: &str, description: &str) -> Effort {
        Effort::of_text(title)
            .or_else(|| Effort::of_text(description))
            .unwrap_or(Effort::Default)
    }
}

/// Estimated hours for a task's text
pub fn estimate_hours(title: &str, description: &str) -> f64 {
    Effort::classify(title, description).hours()
}

/// A created task as seen by the schedule computation
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTask {
    pub title: String,
    pub sprint_ref: String,
    pub estimated_hours: f64,
}

impl PlannedTask {
    /// Build from the operation data as submitted, before reference resolution
    ///
    /// The sprint bucket is the reference name of a `$name[.field]`
    /// `sprint_id`; anything else lands in `default_ref`.
    pub fn from_operation_data(data: &Record, default_ref: &str) -> Self {
        let title = non_empty_str(data, "title").unwrap_or_default();
        let description = non_empty_str(data, "description").unwrap_or_default();
        let sprint_ref = data
            .get("sprint_id")
            .and_then(token_name)
            .filter(|name| !name.is_empty())
            .unwrap_or(default_ref);
        Self {
            title: title.to_string(),
            sprint_ref: sprint_ref.to_string(),
            estimated_hours: estimate_hours(title, description),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectWindow {
    pub start_date: String,
    pub end_date: String,
    pub total_hours: f64,
    pub duration_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintWindow {
    pub start_date: String,
    pub end_date: String,
    pub estimated_hours: f64,
    pub duration_days: i64,
}

/// Derived dates for one batch, sprints in first-appearance order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleComputation {
    pub project: ProjectWindow,
    pub sprints: IndexMap<String, SprintWindow>,
}

/// Calendar days a sprint needs for `hours` of work spread over `task_count` tasks
pub fn sprint_duration_days(hours: f64, task_count: usize, config: &ScheduleConfig) -> i64 {
    let workers = task_count.min(config.max_parallel_workers).max(1) as f64;
    let weeks = (hours / workers / config.hours_per_week()).max(1.0);
    let days = (weeks * 7.0).floor();
    let buffered = (days * config.buffer_factor).floor() as i64;
    buffered.max(1)
}

/// Lay sprints out back to back from `now`
pub fn compute_schedule(
    tasks: &[PlannedTask],
    now: DateTime<Utc>,
    config: &ScheduleConfig,
) -> ScheduleComputation {
    let mut groups: IndexMap<&str, Vec<&PlannedTask>> = IndexMap::new();
    for task in tasks {
        groups.entry(task.sprint_ref.as_str()).or_default().push(task);
    }

    let gap = Duration::days(config.sprint_gap_days);
    let mut cursor = now;
    let mut total_hours = 0.0;
    let mut sprints = IndexMap::new();

    for (sprint_ref, group) in groups {
        let hours: f64 = group.iter().map(|t| t.estimated_hours).sum();
        let days = sprint_duration_days(hours, group.len(), config);
        let end = cursor + Duration::days(days);

        sprints.insert(
            sprint_ref.to_string(),
            SprintWindow {
                start_date: format_timestamp(cursor),
                end_date: format_timestamp(end),
                estimated_hours: hours,
                duration_days: days,
            },
        );

        total_hours += hours;
        cursor = end + gap;
    }

    let project_end = if sprints.is_empty() { now } else { cursor - gap };
    ScheduleComputation {
        project: ProjectWindow {
            start_date: format_timestamp(now),
            end_date: format_timestamp(project_end),
            total_hours,
            duration_days: (project_end - now).num_days(),
        },
        sprints,
    }
}

/// Merge new dates into an entity, keeping every other field
async fn write_dates(
    api: &dyn ProjectApi,
    kind: EntityKind,
    table: &ReferenceTable,
    reference: &str,
    start_date: &str,
    end_date: &str,
) -> bool {
    let Some(id) = table
        .get(reference)
        .and_then(|snapshot| snapshot.get("id"))
        .and_then(as_id)
    else {
        tracing::debug!("No usable id for '{}'; dates not persisted", reference);
        return false;
    };

    let service = api.service(kind);
    let current = match service.get_by_id(id).await {
        Ok(Some(current)) => current,
        Ok(None) => {
            tracing::warn!("{} {} vanished before its dates could be set", kind.label(), id);
            return false;
        }
        Err(e) => {
            tracing::error!("Could not load {} {} for scheduling: {}", kind.label(), id, e);
            return false;
        }
    };

    let mut merged = current;
    merged.remove("id");
    merged.insert("start_date".into(), json!(start_date));
    merged.insert("end_date".into(), json!(end_date));

    match service.update(id, merged).await {
        Ok(()) => {
            tracing::info!(
                "Scheduled {} {} ({}): {} to {}",
                kind.label().to_lowercase(),
                id,
                reference,
                start_date,
                end_date
            );
            true
        }
        Err(e) => {
            tracing::error!("Could not persist dates of {} {}: {}", kind.label(), id, e);
            false
        }
    }
}

/// Persist computed dates on the project and every referenced sprint
///
/// Errors are logged and swallowed. Returns how many entities were updated.
pub async fn apply_schedule(
    api: &dyn ProjectApi,
    table: &ReferenceTable,
    project_ref: &str,
    schedule: &ScheduleComputation,
) -> usize {
    let mut updated = 0;
    let project = &schedule.project;
    if write_dates(
        api,
        EntityKind::Project,
        table,
        project_ref,
        &project.start_date,
        &project.end_date,
    )
    .await
    {
        updated += 1;
    }

    for (sprint_ref, window) in &schedule.sprints {
        if write_dates(
            api,
            EntityKind::Sprint,
            table,
            sprint_ref,
            &window.start_date,
            &window.end_date,
        )
        .await
        {
            updated += 1;
        }
    }
    updated
}
