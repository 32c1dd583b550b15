//! Status and progress aggregation over fetched entity subtrees
//!
//! Everything here is a pure function of records already fetched from the
//! API. Nothing is cached.

use crate::core::types::{
    non_empty_str, parse_timestamp, sprint_status, task_hours, task_status, EntityKind, Record,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// `100 * part / whole` rounded to one decimal; 0 when `whole` is 0
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 0.0;
    }
    (part / whole * 1000.0).round() / 10.0
}

fn status_of(kind: EntityKind, record: &Record) -> i64 {
    record
        .get("status")
        .map(|status| kind.status_code(status))
        .unwrap_or(0)
}

/// Task counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskBuckets {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl TaskBuckets {
    pub fn of(tasks: &[Record]) -> Self {
        let mut buckets = TaskBuckets {
            total: tasks.len(),
            ..Default::default()
        };
        for task in tasks {
            match status_of(EntityKind::Task, task) {
                task_status::COMPLETED => buckets.completed += 1,
                task_status::IN_PROGRESS => buckets.in_progress += 1,
                task_status::TODO => buckets.todo += 1,
                _ => {}
            }
        }
        buckets
    }

    /// Not yet completed: todo plus in progress
    pub fn remaining(&self) -> usize {
        self.todo + self.in_progress
    }

    pub fn progress(&self) -> f64 {
        percentage(self.completed as f64, self.total as f64)
    }
}

/// Estimated and completed hours (missing estimates count as 8)
fn hour_totals(tasks: &[Record]) -> (f64, f64) {
    tasks.iter().fold((0.0, 0.0), |(total, done), task| {
        let hours = task_hours(task);
        let completed = status_of(EntityKind::Task, task) == task_status::COMPLETED;
        (total + hours, if completed { done + hours } else { done })
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectStats {
    pub name: String,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub in_progress_tasks: usize,
    pub todo_tasks: usize,
    pub progress_percentage: f64,
    pub total_hours: f64,
    pub completed_hours: f64,
    pub hours_progress: f64,
    pub total_sprints: usize,
    pub active_sprints: usize,
    pub completed_sprints: usize,
    pub team_size: usize,
}

pub fn project_stats(
    project: &Record,
    sprints: &[Record],
    tasks: &[Record],
    members: &[Record],
) -> ProjectStats {
    let buckets = TaskBuckets::of(tasks);
    let (total_hours, completed_hours) = hour_totals(tasks);
    let sprint_count = |code| {
        sprints
            .iter()
            .filter(|s| status_of(EntityKind::Sprint, s) == code)
            .count()
    };

    ProjectStats {
        name: EntityKind::Project.display_name(project),
        total_tasks: buckets.total,
        completed_tasks: buckets.completed,
        in_progress_tasks: buckets.in_progress,
        todo_tasks: buckets.todo,
        progress_percentage: buckets.progress(),
        total_hours,
        completed_hours,
        hours_progress: percentage(completed_hours, total_hours),
        total_sprints: sprints.len(),
        active_sprints: sprint_count(sprint_status::ACTIVE),
        completed_sprints: sprint_count(sprint_status::COMPLETED),
        team_size: members.len(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintStats {
    pub name: String,
    pub project_name: Option<String>,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub in_progress_tasks: usize,
    pub todo_tasks: usize,
    pub progress_percentage: f64,
    pub total_hours: f64,
    pub completed_hours: f64,
    pub is_overdue: bool,
}

/// Whether a sprint's end date has passed; unparsable or missing dates never are
pub fn is_overdue(sprint: &Record, now: DateTime<Utc>) -> bool {
    non_empty_str(sprint, "end_date")
        .and_then(parse_timestamp)
        .map(|end| end < now)
        .unwrap_or(false)
}

pub fn sprint_stats(
    sprint: &Record,
    project: Option<&Record>,
    tasks: &[Record],
    now: DateTime<Utc>,
) -> SprintStats {
    let buckets = TaskBuckets::of(tasks);
    let (total_hours, completed_hours) = hour_totals(tasks);
    SprintStats {
        name: EntityKind::Sprint.display_name(sprint),
        project_name: project.map(|p| EntityKind::Project.display_name(p)),
        total_tasks: buckets.total,
        completed_tasks: buckets.completed,
        in_progress_tasks: buckets.in_progress,
        todo_tasks: buckets.todo,
        progress_percentage: buckets.progress(),
        total_hours,
        completed_hours,
        is_overdue: is_overdue(sprint, now),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStats {
    pub title: String,
    pub status: &'static str,
    pub priority: &'static str,
    pub estimated_hours: f64,
    pub due_date: Option<String>,
    pub project_name: Option<String>,
    pub sprint_name: Option<String>,
}

fn status_label(code: i64) -> &'static str {
    match code {
        task_status::COMPLETED => "completed",
        task_status::IN_PROGRESS => "in progress",
        _ => "todo",
    }
}

fn priority_label(priority: Option<&Value>) -> &'static str {
    match priority.and_then(Value::as_i64) {
        Some(1) => "low",
        Some(3) => "high",
        Some(4) => "critical",
        _ => "medium",
    }
}

pub fn task_stats(task: &Record, project: Option<&Record>, sprint: Option<&Record>) -> TaskStats {
    TaskStats {
        title: EntityKind::Task.display_name(task),
        status: status_label(status_of(EntityKind::Task, task)),
        priority: priority_label(task.get("priority")),
        estimated_hours: task_hours(task),
        due_date: non_empty_str(task, "due_date").map(str::to_string),
        project_name: project.map(|p| EntityKind::Project.display_name(p)),
        sprint_name: sprint.map(|s| EntityKind::Sprint.display_name(s)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralStats {
    pub total_projects: usize,
    pub active_projects: usize,
    pub total_sprints: usize,
    pub active_sprints: usize,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub in_progress_tasks: usize,
    pub todo_tasks: usize,
    pub active_users: usize,
    pub overall_progress: f64,
}

pub fn general_stats(
    projects: &[Record],
    sprints: &[Record],
    tasks: &[Record],
    users: &[Record],
) -> GeneralStats {
    let buckets = TaskBuckets::of(tasks);
    let active = |kind: EntityKind, records: &[Record]| {
        records
            .iter()
            .filter(|r| status_of(kind, r) == sprint_status::ACTIVE)
            .count()
    };

    GeneralStats {
        total_projects: projects.len(),
        active_projects: active(EntityKind::Project, projects),
        total_sprints: sprints.len(),
        active_sprints: active(EntityKind::Sprint, sprints),
        total_tasks: buckets.total,
        completed_tasks: buckets.completed,
        in_progress_tasks: buckets.in_progress,
        todo_tasks: buckets.todo,
        active_users: users
            .iter()
            .filter(|u| u.get("active").and_then(Value::as_bool).unwrap_or(true))
            .count(),
        overall_progress: buckets.progress(),
    }
}

/// Read model for one query, tagged by subject
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum StatsSnapshot {
    Project(ProjectStats),
    Sprint(SprintStats),
    Task(TaskStats),
    General(GeneralStats),
}

impl StatsSnapshot {
    /// Task counts, for subjects that aggregate tasks
    pub fn buckets(&self) -> Option<TaskBuckets> {
        let bucket = |total, todo, in_progress, completed| TaskBuckets {
            total,
            todo,
            in_progress,
            completed,
        };
        match self {
            Self::Project(s) => Some(bucket(s.total_tasks, s.todo_tasks, s.in_progress_tasks, s.completed_tasks)),
            Self::Sprint(s) => Some(bucket(s.total_tasks, s.todo_tasks, s.in_progress_tasks, s.completed_tasks)),
            Self::General(s) => Some(bucket(s.total_tasks, s.todo_tasks, s.in_progress_tasks, s.completed_tasks)),
            Self::Task(_) => None,
        }
    }

    /// "project Shop", "sprint Sprint 1", "all projects"
    pub fn subject(&self) -> String {
        match self {
            Self::Project(s) => format!("project {}", s.name),
            Self::Sprint(s) => format!("sprint {}", s.name),
            Self::Task(s) => format!("task {}", s.title),
            Self::General(_) => "all projects".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn records(values: Vec<Value>) -> Vec<Record> {
        values.into_iter().filter_map(|v| v.as_object().cloned()).collect()
    }

    fn tasks(completed: usize, in_progress: usize, todo: usize) -> Vec<Record> {
        let mut out = Vec::new();
        for (count, status) in [(completed, 2), (in_progress, 1), (todo, 0)] {
            for _ in 0..count {
                out.push(json!({"title": "t", "status": status}));
            }
        }
        records(out)
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(3.0, 10.0), 30.0);
        assert_eq!(percentage(1.0, 3.0), 33.3);
        assert_eq!(percentage(2.0, 3.0), 66.7);
        assert_eq!(percentage(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_project_progress_three_of_ten() {
        let project = records(vec![json!({"id": 1, "name": "Shop"})]).remove(0);
        let stats = project_stats(&project, &[], &tasks(3, 2, 5), &[]);
        assert_eq!(stats.total_tasks, 10);
        assert_eq!(stats.completed_tasks, 3);
        assert_eq!(stats.todo_tasks, 5);
        assert_eq!(stats.progress_percentage, 30.0);
        // missing estimates count as 8h each
        assert_eq!(stats.total_hours, 80.0);
        assert_eq!(stats.completed_hours, 24.0);
        assert_eq!(stats.hours_progress, 30.0);
    }

    #[test]
    fn test_empty_project_has_zero_progress() {
        let project = Record::new();
        let stats = project_stats(&project, &[], &[], &[]);
        assert_eq!(stats.progress_percentage, 0.0);
        assert_eq!(stats.hours_progress, 0.0);
        assert!(stats.name.starts_with("Project"));
    }

    #[test]
    fn test_project_sprint_and_team_counts() {
        let project = records(vec![json!({"id": 1, "name": "Shop"})]).remove(0);
        let sprints = records(vec![
            json!({"status": 0}),
            json!({"status": "completed"}),
            json!({"status": 1}),
        ]);
        let members = records(vec![json!({"user_id": 1}), json!({"user_id": 2})]);
        let stats = project_stats(&project, &sprints, &[], &members);
        assert_eq!(stats.total_sprints, 3);
        assert_eq!(stats.active_sprints, 1);
        assert_eq!(stats.completed_sprints, 2);
        assert_eq!(stats.team_size, 2);
    }

    #[test]
    fn test_hours_use_estimates() {
        let list = records(vec![
            json!({"status": 2, "estimated_hours": 4}),
            json!({"status": 0, "estimated_hours": "12"}),
        ]);
        let (total, done) = hour_totals(&list);
        assert_eq!(total, 16.0);
        assert_eq!(done, 4.0);
    }

    #[test]
    fn test_sprint_overdue() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let past = records(vec![json!({"name": "S", "end_date": "2025-02-01T00:00:00Z"})]).remove(0);
        let future = records(vec![json!({"name": "S", "end_date": "2025-04-01"})]).remove(0);
        let garbage = records(vec![json!({"name": "S", "end_date": "soon"})]).remove(0);
        let missing = records(vec![json!({"name": "S"})]).remove(0);

        assert!(is_overdue(&past, now));
        assert!(!is_overdue(&future, now));
        assert!(!is_overdue(&garbage, now));
        assert!(!is_overdue(&missing, now));

        let stats = sprint_stats(&past, None, &tasks(1, 0, 1), now);
        assert!(stats.is_overdue);
        assert_eq!(stats.progress_percentage, 50.0);
    }

    #[test]
    fn test_task_stats_labels() {
        let task = records(vec![json!({"title": "Login", "status": 1, "priority": 4})]).remove(0);
        let sprint = records(vec![json!({"name": "S1"})]).remove(0);
        let stats = task_stats(&task, None, Some(&sprint));
        assert_eq!(stats.status, "in progress");
        assert_eq!(stats.priority, "critical");
        assert_eq!(stats.estimated_hours, 8.0);
        assert_eq!(stats.sprint_name.as_deref(), Some("S1"));
        assert!(stats.project_name.is_none());
    }

    #[test]
    fn test_general_stats() {
        let projects = records(vec![json!({"status": 0}), json!({"status": 2})]);
        let sprints = records(vec![json!({"status": 0})]);
        let users = records(vec![json!({"active": true}), json!({"active": false}), json!({})]);
        let stats = general_stats(&projects, &sprints, &tasks(1, 1, 2), &users);
        assert_eq!(stats.active_projects, 1);
        assert_eq!(stats.active_sprints, 1);
        assert_eq!(stats.active_users, 2);
        assert_eq!(stats.overall_progress, 25.0);
    }

    #[test]
    fn test_snapshot_serializes_with_tag() {
        let snapshot = StatsSnapshot::General(general_stats(&[], &[], &[], &[]));
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["entity_type"], json!("general"));
        assert_eq!(value["overall_progress"], json!(0.0));
    }
}
