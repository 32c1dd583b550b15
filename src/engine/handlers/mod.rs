//! Entity handlers - one async function per operation kind
//!
//! Handlers validate their input, call the collaborator API and normalize the
//! response into an `ExecutionResult`. They return `HandlerError` for every
//! failure; the executor renders it into the result envelope.

pub mod member;
pub mod project;
pub mod query;
pub mod sprint;
pub mod task;
pub mod user;

use crate::api::{ApiError, Filters, ProjectApi};
use crate::core::config::Config;
use crate::core::types::{
    as_hours, as_id, format_date, format_timestamp, hours_json, id_display, is_present,
    non_empty_str, priority_code, EntityKind, Record, PLACEHOLDER_ID,
};
use crate::engine::matcher::find_by_name;
use crate::engine::narrative::QueryClassifier;
use crate::engine::operation::{ExecutionResult, OperationKind, ResultType};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use thiserror::Error;

/// Why a single operation failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    /// Missing or malformed input
    #[error("{0}")]
    Validation(String),

    /// Name or id lookup found nothing
    #[error("{}", not_found_message(.entity, .term, .candidates))]
    NotFound {
        entity: EntityKind,
        term: String,
        candidates: Vec<String>,
    },

    #[error("{0}")]
    Api(#[from] ApiError),
}

impl HandlerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: EntityKind, term: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            term: term.into(),
            candidates: Vec::new(),
        }
    }
}

fn not_found_message(entity: &EntityKind, term: &str, candidates: &[String]) -> String {
    let base = format!("{} '{}' not found", entity.label(), term);
    if candidates.is_empty() {
        base
    } else {
        format!("{}. Available: {}", base, candidates.join(", "))
    }
}

pub type HandlerResult = std::result::Result<ExecutionResult, HandlerError>;

/// Collaborators and clock shared by every handler in one batch
#[derive(Clone, Copy)]
pub struct HandlerContext<'a> {
    pub api: &'a dyn ProjectApi,
    pub config: &'a Config,
    pub classifier: &'a dyn QueryClassifier,
    pub now: DateTime<Utc>,
}

impl<'a> HandlerContext<'a> {
    /// The single bounded pause used by the eventual-consistency workaround
    pub async fn settle(&self) {
        let wait = self.config.engine.consistency_wait();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// `data[key]` as a wire date, or now + `offset_days`
    pub fn date_or(&self, data: &Record, key: &str, offset_days: i64) -> String {
        data.get(key)
            .and_then(format_date)
            .unwrap_or_else(|| format_timestamp(self.now + Duration::days(offset_days)))
    }

    /// Find the id an operation targets, by explicit id or by name
    ///
    /// `id` and `<entity>_id` are checked first; otherwise the first present
    /// `name_keys` value goes through the tier matcher.
    pub async fn target_id(
        &self,
        kind: EntityKind,
        data: &Record,
        name_keys: &[&'static str],
        filters: Filters,
    ) -> Result<(i64, Option<&'static str>), HandlerError> {
        if let Some(raw) = ["id", kind.id_key()]
            .iter()
            .find(|key| is_present(data, key))
            .and_then(|key| data.get(*key))
        {
            let id = as_id(raw).ok_or_else(|| {
                HandlerError::validation(format!("Invalid {} ID", kind.label().to_lowercase()))
            })?;
            return Ok((id, None));
        }

        let Some((key, term)) = name_keys
            .iter()
            .find_map(|key| non_empty_str(data, key).map(|term| (*key, term)))
        else {
            return Err(HandlerError::validation(format!(
                "{} or {} required",
                kind.id_key(),
                name_keys.first().copied().unwrap_or("name")
            )));
        };

        let candidates = self.api.service(kind).get_all(filters).await?;
        let found = find_by_name(&candidates, kind, term)
            .ok_or_else(|| HandlerError::not_found(kind, term))?;
        let id = found
            .record
            .get("id")
            .and_then(as_id)
            .ok_or_else(|| HandlerError::not_found(kind, term))?;
        Ok((id, Some(key)))
    }

    /// Recover the real record of a freshly created entity
    ///
    /// Uses the echoed body when it carries an id. Otherwise waits once,
    /// re-lists the collection and takes the newest record whose name field
    /// equals the submitted one. Falls back to the submitted data with a
    /// placeholder id; this never fails.
    pub async fn recover_created(
        &self,
        kind: EntityKind,
        response: Value,
        mut submitted: Record,
        filters: Filters,
    ) -> Record {
        if let Value::Object(created) = response {
            if created.get("id").map_or(false, |id| !id.is_null()) {
                return created;
            }
        }

        self.settle().await;

        let field = kind.name_fields()[0];
        let wanted = submitted.get(field).cloned().unwrap_or(Value::Null);
        match self.api.service(kind).get_all(filters).await {
            Ok(all) => {
                if let Some(found) = all.into_iter().rev().find(|r| r.get(field) == Some(&wanted)) {
                    return found;
                }
                tracing::warn!(
                    "Created {} '{}' not visible yet; using placeholder id",
                    kind.label().to_lowercase(),
                    id_display(&wanted)
                );
            }
            Err(e) => tracing::warn!("Could not re-read {} after create: {}", kind.label(), e),
        }

        submitted.insert("id".into(), json!(PLACEHOLDER_ID));
        submitted
    }
}

/// How an updatable field's input is normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    Text,
    Status,
    Priority,
    Date,
    Hours,
    Id,
    Uppercase,
    Flag,
}

/// Per-entity update description
pub struct UpdateSpec {
    pub kind: EntityKind,
    pub result_type: ResultType,
    /// Keys that name the target when no id is given
    pub lookup_keys: &'static [&'static str],
    /// Key whose value renames the entity (`new_name` -> `name`)
    pub rename: Option<(&'static str, &'static str)>,
    pub fields: &'static [(&'static str, FieldRule)],
}

fn normalize_field(kind: EntityKind, rule: FieldRule, value: &Value) -> Option<Value> {
    match rule {
        FieldRule::Text => value.as_str().map(|s| json!(s)),
        FieldRule::Status => Some(json!(kind.status_code(value))),
        FieldRule::Priority => Some(json!(priority_code(value))),
        FieldRule::Date => format_date(value).map(Value::String),
        FieldRule::Hours => as_hours(value).map(hours_json),
        FieldRule::Id => as_id(value).map(|id| json!(id)),
        FieldRule::Uppercase => value.as_str().map(|s| json!(s.to_uppercase())),
        FieldRule::Flag => value.as_bool().map(Value::Bool),
    }
}

/// Fields an update operation supplies, normalized; `skip` is the lookup key
fn collect_updates(spec: &UpdateSpec, data: &Record, skip: Option<&str>) -> Vec<(String, Value)> {
    let mut updates = Vec::new();
    for (key, rule) in spec.fields {
        if Some(*key) == skip {
            continue;
        }
        let supplied = match rule {
            FieldRule::Flag => data.get(*key).filter(|v| v.is_boolean()),
            _ if is_present(data, key) => data.get(*key),
            _ => None,
        };
        if let Some(value) = supplied.and_then(|v| normalize_field(spec.kind, *rule, v)) {
            updates.push((key.to_string(), value));
        }
    }
    if let Some((from, to)) = spec.rename {
        if let Some(name) = non_empty_str(data, from) {
            updates.retain(|(key, _)| key != to);
            updates.push((to.to_string(), json!(name)));
        }
    }
    updates
}

/// Shared UPDATE_* flow: find, fetch, overlay, write back
pub async fn update_entity(ctx: &HandlerContext<'_>, spec: &UpdateSpec, data: &Record) -> HandlerResult {
    let kind = spec.kind;
    let (id, lookup_key) = ctx
        .target_id(kind, data, spec.lookup_keys, Filters::none())
        .await?;

    let service = ctx.api.service(kind);
    let current = service
        .get_by_id(id)
        .await?
        .ok_or_else(|| HandlerError::not_found(kind, id.to_string()))?;

    let updates = collect_updates(spec, data, lookup_key);
    if updates.is_empty() {
        return Err(HandlerError::validation(format!(
            "No fields to update for {} {}",
            kind.label().to_lowercase(),
            id
        )));
    }

    let mut merged = current;
    merged.remove("id");
    let updated_fields: Vec<String> = updates.iter().map(|(key, _)| key.clone()).collect();
    for (key, value) in updates {
        merged.insert(key, value);
    }

    tracing::info!("Updating {} {} ({})", kind.label().to_lowercase(), id, updated_fields.join(", "));
    service.update(id, merged.clone()).await?;

    let mut result = Record::new();
    result.insert("id".into(), json!(id));
    for field in kind.name_fields() {
        if let Some(value) = merged.get(*field) {
            result.insert(field.to_string(), value.clone());
        }
    }
    result.insert("updated_fields".into(), json!(updated_fields));
    result.insert("updated".into(), json!(true));
    Ok(ExecutionResult::ok(spec.result_type, Value::Object(result)))
}

/// Shared DELETE_* flow; returns the deleted id and the record seen before deletion
pub async fn delete_entity(
    ctx: &HandlerContext<'_>,
    kind: EntityKind,
    data: &Record,
    lookup_keys: &[&'static str],
) -> Result<(i64, Option<Record>), HandlerError> {
    let (id, _) = ctx.target_id(kind, data, lookup_keys, Filters::none()).await?;
    let service = ctx.api.service(kind);
    let before = service.get_by_id(id).await?;
    tracing::info!("Deleting {} {}", kind.label().to_lowercase(), id);
    service.delete(id).await?;
    Ok((id, before))
}

/// Delete-result payload `{id, <name field>: display name, deleted: true}`
pub fn deleted_payload(kind: EntityKind, id: i64, before: Option<&Record>) -> Value {
    let name = match before {
        Some(record) => kind.display_name(record),
        None => format!("{} {}", kind.label(), id),
    };
    let mut payload = Record::new();
    payload.insert("id".into(), json!(id));
    payload.insert(kind.name_fields()[0].to_string(), json!(name));
    payload.insert("deleted".into(), json!(true));
    Value::Object(payload)
}

/// Bulk delete by case-insensitive substring; every match is attempted
pub async fn bulk_delete(
    ctx: &HandlerContext<'_>,
    kind: EntityKind,
    data: &Record,
    filters: Filters,
    result_type: ResultType,
) -> HandlerResult {
    let plural = format!("{}s", kind.label().to_lowercase());
    let Some(pattern) = non_empty_str(data, "name_pattern").or_else(|| non_empty_str(data, "name"))
    else {
        return Err(HandlerError::validation(format!(
            "name_pattern required for bulk {} deletion",
            kind.label().to_lowercase()
        )));
    };

    let service = ctx.api.service(kind);
    let all = service.get_all(filters).await?;
    let matching = crate::engine::matcher::filter_by_pattern(&all, "name", pattern);
    if matching.is_empty() {
        return Err(HandlerError::validation(format!(
            "No {} found matching '{}'",
            plural, pattern
        )));
    }

    let mut deleted = Vec::new();
    let mut failed = Vec::new();
    for record in matching {
        let mut entry = Record::new();
        let id_value = record.get("id").cloned().unwrap_or(Value::Null);
        let name = kind.display_name(record);
        entry.insert("id".into(), id_value.clone());
        entry.insert("name".into(), json!(name));
        if kind == EntityKind::Sprint {
            entry.insert(
                "project_id".into(),
                record.get("project_id").cloned().unwrap_or(json!("N/A")),
            );
        }

        let outcome = match as_id(&id_value) {
            Some(id) => {
                tracing::info!("Bulk deleting {} {}: {}", kind.label().to_lowercase(), id, name);
                service.delete(id).await.map_err(|e| e.to_string())
            }
            None => Err(format!("record has no usable id ({})", id_display(&id_value))),
        };
        match outcome {
            Ok(()) => deleted.push(Value::Object(entry)),
            Err(error) => {
                tracing::warn!("Bulk delete of {} failed: {}", name, error);
                entry.insert("error".into(), json!(error));
                failed.push(Value::Object(entry));
            }
        }
    }

    let any_deleted = !deleted.is_empty();
    let attempted = deleted.len() + failed.len();
    let payload = json!({
        "deleted": deleted,
        "failed": failed,
        "pattern": pattern,
    });
    if any_deleted {
        Ok(ExecutionResult::ok(result_type, payload))
    } else {
        Ok(ExecutionResult::failure_with(
            result_type,
            payload,
            format!("Failed to delete any of {} {} matching '{}'", attempted, plural, pattern),
        ))
    }
}

/// Route one resolved operation to its handler
pub async fn dispatch(ctx: &HandlerContext<'_>, kind: &OperationKind, data: &Record) -> HandlerResult {
    use OperationKind as K;
    match kind {
        K::CreateProject => project::create(ctx, data).await,
        K::CreateSprint => sprint::create(ctx, data).await,
        K::CreateTask => task::create(ctx, data).await,
        K::ListProjects => project::list(ctx).await,
        K::ListSprints => sprint::list(ctx, data).await,
        K::ListTasks => task::list(ctx, data).await,
        K::ListUsers => user::list(ctx).await,
        K::UpdateProject => update_entity(ctx, &project::UPDATE, data).await,
        K::UpdateSprint => update_entity(ctx, &sprint::UPDATE, data).await,
        K::UpdateTask => update_entity(ctx, &task::UPDATE, data).await,
        K::UpdateUser => update_entity(ctx, &user::UPDATE, data).await,
        K::DeleteProject => project::delete(ctx, data).await,
        K::DeleteProjectsByName => project::delete_by_name(ctx, data).await,
        K::DeleteSprint => sprint::delete(ctx, data).await,
        K::DeleteSprintsByName => sprint::delete_by_name(ctx, data).await,
        K::DeleteTask => task::delete(ctx, data).await,
        K::DeleteUser => user::delete(ctx, data).await,
        K::AssignUserToProject => member::assign(ctx, data).await,
        K::RemoveUserFromProject => member::remove(ctx, data).await,
        K::ListProjectMembers => member::list(ctx, data).await,
        K::AutoAssignUsers => member::auto_assign(ctx, data).await,
        K::QueryStatus => query::query_status(ctx, data).await,
        K::Unknown(tag) => Err(HandlerError::validation(format!("Unknown operation: {}", tag))),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::engine::narrative::KeywordClassifier;
    use chrono::TimeZone;

    pub fn config() -> Config {
        let mut config = Config::default();
        config.engine.consistency_wait_ms = 0;
        config
    }

    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    pub fn ctx<'a>(api: &'a dyn ProjectApi, config: &'a Config) -> HandlerContext<'a> {
        HandlerContext {
            api,
            config,
            classifier: &KeywordClassifier,
            now: now(),
        }
    }

    pub fn data(value: Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }
}
