//! Plain-text summary of a batch for the chat transport

use crate::core::types::{id_display, task_hours, EntityKind, Record};
use crate::engine::operation::{ExecutionResult, ResultType};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt::Write;

/// Created tasks listed individually before collapsing into a count
const MAX_LISTED_TASKS: usize = 5;

/// Productive hours per working day, for the effort line
const PRODUCTIVE_HOURS_PER_DAY: f64 = 6.0;

fn field(record: &Record, key: &str) -> String {
    record.get(key).map(id_display).unwrap_or_else(|| "N/A".to_string())
}

fn name_of(result: &ExecutionResult, key: &str, fallback: &str) -> String {
    result
        .record()
        .and_then(|r| r.get(key))
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

fn count_of(result: &ExecutionResult) -> usize {
    result.data.as_ref().and_then(Value::as_array).map_or(0, Vec::len)
}

/// One-line message for a batch made of a single successful operation
fn single_line(result: &ExecutionResult) -> Option<String> {
    use ResultType as R;
    let line = match result.result_type {
        R::Projects | R::Sprints | R::Tasks | R::Users | R::ProjectMembers => {
            let noun = match result.result_type {
                R::Projects => "projects",
                R::Sprints => "sprints",
                R::Tasks => "tasks",
                R::Users => "users",
                _ => "members",
            };
            match count_of(result) {
                0 => format!("No {} found", noun),
                n => format!("Found {} {}", n, noun),
            }
        }
        R::Project | R::Sprint | R::Task => {
            let kind = match result.result_type {
                R::Project => EntityKind::Project,
                R::Sprint => EntityKind::Sprint,
                _ => EntityKind::Task,
            };
            let name = result.record().map(|r| kind.display_name(r)).unwrap_or_default();
            format!("{} '{}' created", kind.label(), name)
        }
        R::ProjectDeleted | R::SprintDeleted => format!("'{}' deleted", name_of(result, "name", "?")),
        R::TaskDeleted => format!("'{}' deleted", name_of(result, "title", "?")),
        R::UserDeleted => format!("'{}' deleted", name_of(result, "full_name", "User")),
        R::ProjectUpdated | R::SprintUpdated | R::TaskUpdated | R::UserUpdated => {
            let record = result.record()?;
            let name = ["name", "title", "full_name", "username"]
                .iter()
                .find_map(|key| record.get(*key).and_then(Value::as_str))
                .unwrap_or("Entity");
            let fields: Vec<&str> = record
                .get("updated_fields")
                .and_then(Value::as_array)
                .map(|f| f.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            format!("'{}' updated ({})", name, fields.join(", "))
        }
        R::UserAssigned => format!(
            "{} assigned to {} as {}",
            name_of(result, "user_name", "User"),
            name_of(result, "project_name", "Project"),
            name_of(result, "role", "member"),
        ),
        R::UserRemoved => format!(
            "{} removed from {}",
            name_of(result, "user_name", "User"),
            name_of(result, "project_name", "Project"),
        ),
        R::AutoAssignment => {
            let record = result.record()?;
            format!(
                "Auto-assigned {} of {} requested users ({})",
                field(record, "actual_count"),
                field(record, "requested_count"),
                field(record, "criteria"),
            )
        }
        R::ProjectsBulkDeleted | R::SprintsBulkDeleted => bulk_line(result)?,
        R::QueryResponse => name_of(result, "analysis", ""),
        R::Error => return None,
    };
    Some(line)
}

fn bulk_line(result: &ExecutionResult) -> Option<String> {
    let record = result.record()?;
    let len = |key: &str| record.get(key).and_then(Value::as_array).map_or(0, Vec::len);
    let noun = if result.result_type == ResultType::SprintsBulkDeleted {
        "sprints"
    } else {
        "projects"
    };
    let mut line = format!(
        "Deleted {} {} matching '{}'",
        len("deleted"),
        noun,
        field(record, "pattern")
    );
    if len("failed") > 0 {
        let _ = write!(line, ", {} could not be deleted", len("failed"));
    }
    Some(line)
}

fn records_of<'a>(results: &[&'a ExecutionResult], result_type: ResultType) -> Vec<&'a Record> {
    results
        .iter()
        .filter(|r| r.result_type == result_type)
        .filter_map(|r| r.record())
        .collect()
}

/// `n operation(s)`
fn operations(n: usize) -> String {
    if n == 1 {
        "1 operation".to_string()
    } else {
        format!("{} operations", n)
    }
}

fn is_membership_or_create(result_type: ResultType) -> bool {
    matches!(
        result_type,
        ResultType::Project
            | ResultType::Sprint
            | ResultType::Task
            | ResultType::UserAssigned
            | ResultType::UserRemoved
    )
}

/// Created entities grouped by kind, with the effort estimate for tasks
fn write_created(out: &mut String, successful: &[&ExecutionResult]) {
    let projects = records_of(successful, ResultType::Project);
    let sprints = records_of(successful, ResultType::Sprint);
    let tasks = records_of(successful, ResultType::Task);

    if !projects.is_empty() {
        out.push_str("Projects:\n");
        for p in &projects {
            let _ = writeln!(out, "  - {} (ID: {})", EntityKind::Project.display_name(p), field(p, "id"));
        }
    }
    if !sprints.is_empty() {
        out.push_str("Sprints:\n");
        for s in &sprints {
            let _ = writeln!(
                out,
                "  - {} (ID: {}, Project: {})",
                EntityKind::Sprint.display_name(s),
                field(s, "id"),
                field(s, "project_id")
            );
        }
    }
    if !tasks.is_empty() {
        out.push_str("Tasks:\n");
        for t in tasks.iter().take(MAX_LISTED_TASKS) {
            let _ = writeln!(out, "  - {} (ID: {})", EntityKind::Task.display_name(t), field(t, "id"));
        }
        if tasks.len() > MAX_LISTED_TASKS {
            let _ = writeln!(out, "  ... and {} more tasks", tasks.len() - MAX_LISTED_TASKS);
        }
        let hours: f64 = tasks.iter().copied().map(task_hours).sum();
        let days = (hours / PRODUCTIVE_HOURS_PER_DAY * 10.0).round() / 10.0;
        let _ = writeln!(out, "Estimated effort: {}h ({} days)", hours, days);
    }
}

/// Assignments or removals, users grouped per project in first-seen order
fn write_memberships(
    out: &mut String,
    successful: &[&ExecutionResult],
    result_type: ResultType,
    heading: &str,
) {
    let mut by_project: IndexMap<String, Vec<String>> = IndexMap::new();
    for result in successful.iter().filter(|r| r.result_type == result_type) {
        by_project
            .entry(name_of(result, "project_name", "Project"))
            .or_default()
            .push(name_of(result, "user_name", "User"));
    }
    if by_project.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}:", heading);
    for (project, users) in &by_project {
        let _ = writeln!(out, "  - {}: {}", project, users.join(", "));
    }
}

/// Report for a batch with several results; every success gets a line
fn batch_report(successful: &[&ExecutionResult]) -> String {
    let mut out = String::new();
    write_created(&mut out, successful);
    write_memberships(&mut out, successful, ResultType::UserAssigned, "Assigned");
    write_memberships(&mut out, successful, ResultType::UserRemoved, "Removed");
    for result in successful.iter().filter(|r| !is_membership_or_create(r.result_type)) {
        if let Some(line) = single_line(result) {
            let _ = writeln!(out, "{}", line);
        }
    }
    let _ = write!(out, "Total: {} succeeded", operations(successful.len()));
    out
}

/// Summary text for a finished batch
///
/// At most `max_failures` failure messages are listed.
pub fn summarize(results: &[ExecutionResult], max_failures: usize) -> String {
    let successful: Vec<&ExecutionResult> = results.iter().filter(|r| r.success).collect();
    let failed: Vec<&ExecutionResult> = results.iter().filter(|r| !r.success).collect();

    let mut out = if successful.is_empty() {
        "No operations completed".to_string()
    } else if results.len() == 1 {
        single_line(successful[0]).unwrap_or_else(|| "1 operation succeeded".to_string())
    } else {
        batch_report(&successful)
    };

    if !failed.is_empty() {
        let _ = write!(out, "\n\n{} failed", operations(failed.len()));
        for failure in failed.iter().take(max_failures) {
            let error = failure.error.as_deref().unwrap_or("Unknown error");
            let _ = write!(out, "\n  - {}", error);
        }
    }
    out
}
