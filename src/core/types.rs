//! Core type definitions used throughout the codebase

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An entity as the remote API returns it: a flat JSON object
pub type Record = serde_json::Map<String, Value>;

/// Identifier written into records whose real id could not be recovered
pub const PLACEHOLDER_ID: &str = "New";

/// Wire format for every date the engine writes
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Hours assumed for a task that carries no estimate
pub const DEFAULT_TASK_HOURS: f64 = 8.0;

/// Entity families managed by the remote API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Sprint,
    Task,
    User,
}

impl EntityKind {
    /// Capitalized label used in user-facing error messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::Project => "Project",
            Self::Sprint => "Sprint",
            Self::Task => "Task",
            Self::User => "User",
        }
    }

    /// Fields the tier matcher compares against a search term
    pub fn name_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Project | Self::Sprint => &["name"],
            Self::Task => &["title", "name"],
            Self::User => &["full_name", "username"],
        }
    }

    /// Key an operation uses to name this entity's id (`project_id`, ...)
    pub fn id_key(&self) -> &'static str {
        match self {
            Self::Project => "project_id",
            Self::Sprint => "sprint_id",
            Self::Task => "task_id",
            Self::User => "user_id",
        }
    }

    /// Human-readable name of a record of this kind
    pub fn display_name(&self, record: &Record) -> String {
        self.name_fields()
            .iter()
            .find_map(|field| non_empty_str(record, field))
            .map(str::to_string)
            .unwrap_or_else(|| {
                let id = record.get("id").map(id_display).unwrap_or_default();
                format!("{} {}", self.label(), id)
            })
    }

    /// Map a status string to the API's integer code
    ///
    /// Integers pass through; unknown strings map to 0.
    pub fn status_code(&self, status: &Value) -> i64 {
        if let Some(code) = status.as_i64() {
            return code;
        }
        let Some(text) = status.as_str() else {
            return 0;
        };
        let text = text.trim().to_lowercase();
        match (self, text.as_str()) {
            (Self::Project, "active") => 0,
            (Self::Project, "completed") => 1,
            (Self::Project, "paused") => 2,
            (Self::Sprint, "active") => 0,
            (Self::Sprint, "completed") | (Self::Sprint, "closed") => 1,
            (Self::Task, "todo") => 0,
            (Self::Task, "in_progress") => 1,
            (Self::Task, "completed") => 2,
            _ => 0,
        }
    }
}

/// Task status codes as stored by the API
pub mod task_status {
    pub const TODO: i64 = 0;
    pub const IN_PROGRESS: i64 = 1;
    pub const COMPLETED: i64 = 2;
}

/// Sprint and project status codes as stored by the API
pub mod sprint_status {
    pub const ACTIVE: i64 = 0;
    pub const COMPLETED: i64 = 1;
}

/// Map a priority string to the API's integer code (medium when unknown)
pub fn priority_code(priority: &Value) -> i64 {
    if let Some(code) = priority.as_i64() {
        return code;
    }
    match priority.as_str().map(|p| p.trim().to_lowercase()).as_deref() {
        Some("low") => 1,
        Some("medium") => 2,
        Some("high") => 3,
        Some("critical") => 4,
        _ => 2,
    }
}

/// Normalize a user supplied date to the wire format
///
/// Values that already carry a time part are kept as given; a bare
/// `YYYY-MM-DD` gets midnight UTC appended. Empty and non-string
/// values yield `None`.
pub fn format_date(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    if text.contains('T') {
        Some(text.to_string())
    } else {
        Some(format!("{}T00:00:00Z", text))
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(DATE_FORMAT).to_string()
}

/// Parse the date shapes the API is known to return
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

/// Interpret a JSON value as a numeric id (integer or numeric string)
pub fn as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Interpret a JSON value as a non-negative hour count
pub fn as_hours(value: &Value) -> Option<f64> {
    let hours: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    hours.filter(|h| h.is_finite() && *h >= 0.0)
}

/// Hours as JSON, keeping whole numbers integral
pub fn hours_json(hours: f64) -> Value {
    if hours.fract() == 0.0 && hours.abs() < i64::MAX as f64 {
        Value::from(hours as i64)
    } else {
        Value::from(hours)
    }
}

/// Render an id for messages without JSON quoting
pub fn id_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "N/A".to_string(),
        other => other.to_string(),
    }
}

/// A string field, if present and not blank
pub fn non_empty_str<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Whether a data field was supplied with a usable value
///
/// `null`, `false` and empty strings count as absent, matching how
/// optional operation fields are filled in by the translator.
pub fn is_present(record: &Record, key: &str) -> bool {
    match record.get(key) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

/// Integer field with a default
pub fn int_field(record: &Record, key: &str, default: i64) -> i64 {
    record.get(key).and_then(Value::as_i64).unwrap_or(default)
}

/// Estimated hours of a task record, defaulting when absent
pub fn task_hours(record: &Record) -> f64 {
    record
        .get("estimated_hours")
        .and_then(as_hours)
        .unwrap_or(DEFAULT_TASK_HOURS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_status_codes() {
        assert_eq!(EntityKind::Project.status_code(&json!("paused")), 2);
        assert_eq!(EntityKind::Sprint.status_code(&json!("Closed")), 1);
        assert_eq!(EntityKind::Task.status_code(&json!("in_progress")), 1);
        assert_eq!(EntityKind::Task.status_code(&json!("whatever")), 0);
        assert_eq!(EntityKind::Task.status_code(&json!(2)), 2);
    }

    #[test]
    fn test_priority_codes() {
        assert_eq!(priority_code(&json!("critical")), 4);
        assert_eq!(priority_code(&json!("LOW")), 1);
        assert_eq!(priority_code(&json!("urgent")), 2);
        assert_eq!(priority_code(&json!(3)), 3);
    }

    #[test]
    fn test_format_date() {
        assert_eq!(
            format_date(&json!("2025-03-01")),
            Some("2025-03-01T00:00:00Z".to_string())
        );
        assert_eq!(
            format_date(&json!("2025-03-01T10:00:00Z")),
            Some("2025-03-01T10:00:00Z".to_string())
        );
        assert_eq!(format_date(&json!("")), None);
        assert_eq!(format_date(&Value::Null), None);
    }

    #[test]
    fn test_parse_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01T00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01"), Some(expected));
        assert_eq!(parse_timestamp("next tuesday"), None);
    }

    #[test]
    fn test_as_id() {
        assert_eq!(as_id(&json!(42)), Some(42));
        assert_eq!(as_id(&json!(" 7 ")), Some(7));
        assert_eq!(as_id(&json!("New")), None);
        assert_eq!(as_id(&Value::Null), None);
    }

    #[test]
    fn test_hours_json() {
        assert_eq!(hours_json(12.0), json!(12));
        assert_eq!(hours_json(2.5), json!(2.5));
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let mut record = Record::new();
        record.insert("id".into(), json!(9));
        assert_eq!(EntityKind::Sprint.display_name(&record), "Sprint 9");
        record.insert("name".into(), json!("Sprint Alpha"));
        assert_eq!(EntityKind::Sprint.display_name(&record), "Sprint Alpha");
    }
}
