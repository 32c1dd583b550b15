//! Natural-language answers to status questions
//!
//! A `QueryClassifier` turns the user's question into a typed intent; the
//! renderer then answers from an already computed `StatsSnapshot`. The
//! keyword classifier below is the default and only understands English.

use crate::core::types::{task_status, EntityKind, Record};
use crate::engine::stats::{GeneralStats, ProjectStats, SprintStats, StatsSnapshot, TaskStats};
use std::fmt::Write;

/// Which task count a question asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    /// Not started
    Pending,
    /// Not completed
    Remaining,
    Total,
    Completed,
}

impl CountKind {
    fn label(self) -> &'static str {
        match self {
            CountKind::Pending => "pending",
            CountKind::Remaining => "remaining",
            CountKind::Total => "total",
            CountKind::Completed => "completed",
        }
    }
}

/// What kind of answer a question wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    Count(CountKind),
    ListTasks { pending_only: bool },
    Status,
}

/// Maps a free-text question to an intent
pub trait QueryClassifier: Send + Sync {
    fn classify(&self, question: &str) -> QueryIntent;
}

/// Phrase matching over the lowercased question
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

const LIST_PHRASES: &[&str] = &[
    "list",
    "which tasks",
    "what tasks",
    "names of",
    "show tasks",
    "show me the tasks",
    "show the tasks",
];
const PENDING_WORDS: &[&str] = &["pending", "to do", "todo", "not started", "open"];
const REMAINING_WORDS: &[&str] = &["remain", "left", "unfinished", "outstanding"];
const COMPLETED_WORDS: &[&str] = &["completed", "done", "finished", "closed"];
const COUNT_PHRASES: &[&str] = &["how many", "number of", "count of", "total tasks"];

fn mentions(text: &str, words: &[&str]) -> bool {
    words.iter().any(|word| text.contains(word))
}

impl QueryClassifier for KeywordClassifier {
    fn classify(&self, question: &str) -> QueryIntent {
        let q = question.to_lowercase();

        if mentions(&q, LIST_PHRASES) {
            let pending_only = mentions(&q, PENDING_WORDS) || mentions(&q, REMAINING_WORDS);
            return QueryIntent::ListTasks { pending_only };
        }

        if mentions(&q, COUNT_PHRASES) {
            let kind = if mentions(&q, PENDING_WORDS) {
                CountKind::Pending
            } else if mentions(&q, REMAINING_WORDS) {
                CountKind::Remaining
            } else if mentions(&q, COMPLETED_WORDS) {
                CountKind::Completed
            } else {
                CountKind::Total
            };
            return QueryIntent::Count(kind);
        }

        QueryIntent::Status
    }
}

/// Render the answer for `intent`; `tasks` is the subject's task list
pub fn render(intent: QueryIntent, snapshot: &StatsSnapshot, tasks: &[Record]) -> String {
    match (intent, snapshot.buckets()) {
        (QueryIntent::Count(kind), Some(buckets)) => {
            let count = match kind {
                CountKind::Pending => buckets.todo,
                CountKind::Remaining => buckets.remaining(),
                CountKind::Total => buckets.total,
                CountKind::Completed => buckets.completed,
            };
            format!("{} {} tasks in {}", count, kind.label(), snapshot.subject())
        }
        (QueryIntent::ListTasks { pending_only }, Some(_)) => {
            render_task_list(snapshot, tasks, pending_only)
        }
        _ => render_status(snapshot),
    }
}

fn render_task_list(snapshot: &StatsSnapshot, tasks: &[Record], pending_only: bool) -> String {
    let selected: Vec<String> = tasks
        .iter()
        .filter(|task| {
            !pending_only
                || task
                    .get("status")
                    .map(|s| EntityKind::Task.status_code(s))
                    .unwrap_or(task_status::TODO)
                    == task_status::TODO
        })
        .map(|task| EntityKind::Task.display_name(task))
        .collect();

    let which = if pending_only { "Pending tasks" } else { "Tasks" };
    if selected.is_empty() {
        return format!("No {} in {}", which.to_lowercase(), snapshot.subject());
    }

    let mut out = format!("{} in {} ({}):", which, snapshot.subject(), selected.len());
    for title in selected {
        let _ = write!(out, "\n- {}", title);
    }
    out
}

/// Full multi-line status report
pub fn render_status(snapshot: &StatsSnapshot) -> String {
    match snapshot {
        StatsSnapshot::Project(stats) => project_report(stats),
        StatsSnapshot::Sprint(stats) => sprint_report(stats),
        StatsSnapshot::Task(stats) => task_report(stats),
        StatsSnapshot::General(stats) => general_report(stats),
    }
}

fn project_report(s: &ProjectStats) -> String {
    let mut out = format!("Status of project {}\n", s.name);
    let _ = writeln!(
        out,
        "Progress: {}% ({} of {} tasks completed)",
        s.progress_percentage, s.completed_tasks, s.total_tasks
    );
    let _ = writeln!(
        out,
        "Tasks: {} todo, {} in progress, {} completed",
        s.todo_tasks, s.in_progress_tasks, s.completed_tasks
    );
    let _ = writeln!(
        out,
        "Hours: {}h of {}h done ({}%)",
        s.completed_hours, s.total_hours, s.hours_progress
    );
    let _ = writeln!(
        out,
        "Sprints: {} total, {} active, {} completed",
        s.total_sprints, s.active_sprints, s.completed_sprints
    );
    let _ = writeln!(out, "Team: {} members", s.team_size);

    let advice = if s.total_tasks == 0 {
        "No tasks yet; break the work down into tasks to start tracking progress"
    } else if s.progress_percentage < 30.0 {
        "Early stage; prioritise the critical tasks and confirm the plan"
    } else if s.progress_percentage < 70.0 {
        "Steady progress; watch for blocked tasks and keep the sprint cadence"
    } else {
        "Nearly done; focus on finishing in-progress work and final testing"
    };
    let _ = write!(out, "Recommendation: {}", advice);
    out
}

fn sprint_report(s: &SprintStats) -> String {
    let mut out = match &s.project_name {
        Some(project) => format!("Status of sprint {} (project {})\n", s.name, project),
        None => format!("Status of sprint {}\n", s.name),
    };
    let _ = writeln!(
        out,
        "Progress: {}% ({} of {} tasks completed)",
        s.progress_percentage, s.completed_tasks, s.total_tasks
    );
    let _ = writeln!(
        out,
        "Tasks: {} todo, {} in progress, {} completed",
        s.todo_tasks, s.in_progress_tasks, s.completed_tasks
    );
    let _ = write!(out, "Hours: {}h of {}h done", s.completed_hours, s.total_hours);

    if s.is_overdue && s.completed_tasks < s.total_tasks {
        let _ = write!(
            out,
            "\nAlert: sprint is overdue with {} unfinished tasks",
            s.total_tasks - s.completed_tasks
        );
    }
    if s.total_tasks > 0 && s.progress_percentage < 50.0 {
        let _ = write!(out, "\nRecommendation: less than half done; consider rescoping the sprint");
    }
    out
}

fn task_report(s: &TaskStats) -> String {
    let mut out = format!("Task {}\n", s.title);
    let _ = writeln!(out, "Status: {}", s.status);
    let _ = writeln!(out, "Priority: {}", s.priority);
    let _ = write!(out, "Estimate: {}h", s.estimated_hours);
    if let Some(due) = &s.due_date {
        let _ = write!(out, "\nDue: {}", due);
    }
    if let Some(sprint) = &s.sprint_name {
        let _ = write!(out, "\nSprint: {}", sprint);
    }
    if let Some(project) = &s.project_name {
        let _ = write!(out, "\nProject: {}", project);
    }
    out
}

fn general_report(s: &GeneralStats) -> String {
    let mut out = String::from("Overall status\n");
    let _ = writeln!(out, "Projects: {} ({} active)", s.total_projects, s.active_projects);
    let _ = writeln!(out, "Sprints: {} ({} active)", s.total_sprints, s.active_sprints);
    let _ = writeln!(
        out,
        "Tasks: {} ({} completed, {} in progress, {} todo)",
        s.total_tasks, s.completed_tasks, s.in_progress_tasks, s.todo_tasks
    );
    let _ = writeln!(out, "Overall progress: {}%", s.overall_progress);
    let _ = write!(out, "Active users: {}", s.active_users);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stats::{general_stats, project_stats, sprint_stats};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    fn records(values: Vec<Value>) -> Vec<Record> {
        values.into_iter().filter_map(|v| v.as_object().cloned()).collect()
    }

    fn shop() -> (StatsSnapshot, Vec<Record>) {
        let project = records(vec![json!({"id": 1, "name": "Shop"})]).remove(0);
        let tasks = records(vec![
            json!({"title": "Login", "status": 2}),
            json!({"title": "Cart", "status": 1}),
            json!({"title": "Checkout", "status": 0}),
            json!({"title": "Search"}),
        ]);
        let stats = project_stats(&project, &[], &tasks, &[]);
        (StatsSnapshot::Project(stats), tasks)
    }

    #[test]
    fn test_keyword_classifier() {
        let c = KeywordClassifier;
        assert_eq!(c.classify("How many pending tasks?"), QueryIntent::Count(CountKind::Pending));
        assert_eq!(c.classify("how many tasks are left"), QueryIntent::Count(CountKind::Remaining));
        assert_eq!(c.classify("How many tasks are done"), QueryIntent::Count(CountKind::Completed));
        assert_eq!(c.classify("number of tasks"), QueryIntent::Count(CountKind::Total));
        assert_eq!(
            c.classify("List the pending tasks"),
            QueryIntent::ListTasks { pending_only: true }
        );
        assert_eq!(c.classify("which tasks exist"), QueryIntent::ListTasks { pending_only: false });
        assert_eq!(c.classify("How is it going?"), QueryIntent::Status);
    }

    #[test]
    fn test_counts() {
        let (snapshot, tasks) = shop();
        let answer = |kind| render(QueryIntent::Count(kind), &snapshot, &tasks);
        assert_eq!(answer(CountKind::Pending), "2 pending tasks in project Shop");
        assert_eq!(answer(CountKind::Remaining), "3 remaining tasks in project Shop");
        assert_eq!(answer(CountKind::Total), "4 total tasks in project Shop");
        assert_eq!(answer(CountKind::Completed), "1 completed tasks in project Shop");
    }

    #[test]
    fn test_task_lists() {
        let (snapshot, tasks) = shop();
        let pending = render(QueryIntent::ListTasks { pending_only: true }, &snapshot, &tasks);
        assert_eq!(pending, "Pending tasks in project Shop (2):\n- Checkout\n- Search");

        let all = render(QueryIntent::ListTasks { pending_only: false }, &snapshot, &tasks);
        assert!(all.starts_with("Tasks in project Shop (4):"));
        assert!(all.contains("- Login"));

        let empty = render(QueryIntent::ListTasks { pending_only: true }, &snapshot, &[]);
        assert_eq!(empty, "No pending tasks in project Shop");
    }

    #[test]
    fn test_project_report_recommendation() {
        let (snapshot, tasks) = shop();
        let report = render(QueryIntent::Status, &snapshot, &tasks);
        assert!(report.starts_with("Status of project Shop"));
        assert!(report.contains("Progress: 25% (1 of 4 tasks completed)"));
        assert!(report.contains("Recommendation: Early stage"));
    }

    #[test]
    fn test_sprint_overdue_alert() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let sprint = records(vec![json!({"name": "S1", "end_date": "2025-02-01"})]).remove(0);
        let tasks = records(vec![json!({"status": 0}), json!({"status": 2})]);
        let snapshot = StatsSnapshot::Sprint(sprint_stats(&sprint, None, &tasks, now));
        let report = render_status(&snapshot);
        assert!(report.contains("Alert: sprint is overdue with 1 unfinished tasks"));
    }

    #[test]
    fn test_count_on_task_falls_back_to_report() {
        let task = records(vec![json!({"title": "Login", "status": 1})]).remove(0);
        let snapshot = StatsSnapshot::Task(crate::engine::stats::task_stats(&task, None, None));
        let answer = render(QueryIntent::Count(CountKind::Total), &snapshot, &[]);
        assert!(answer.starts_with("Task Login\nStatus: in progress"));
    }

    #[test]
    fn test_general_report() {
        let snapshot = StatsSnapshot::General(general_stats(&[], &[], &[], &[]));
        let report = render_status(&snapshot);
        assert!(report.contains("Overall progress: 0%"));
        assert_eq!(
            render(QueryIntent::Count(CountKind::Total), &snapshot, &[]),
            "0 total tasks in all projects"
        );
    }
}
