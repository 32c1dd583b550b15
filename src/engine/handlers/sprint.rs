//! Sprint operations

use super::{
    bulk_delete, delete_entity, deleted_payload, FieldRule, HandlerContext, HandlerError,
    HandlerResult, UpdateSpec,
};
use crate::api::Filters;
use crate::core::types::{as_id, is_present, non_empty_str, EntityKind, Record};
use crate::engine::operation::{ExecutionResult, ResultType};
use serde_json::{json, Value};

pub const UPDATE: UpdateSpec = UpdateSpec {
    kind: EntityKind::Sprint,
    result_type: ResultType::SprintUpdated,
    lookup_keys: &["name", "sprint_name"],
    rename: Some(("new_name", "name")),
    fields: &[
        ("name", FieldRule::Text),
        ("description", FieldRule::Text),
        ("status", FieldRule::Status),
        ("start_date", FieldRule::Date),
        ("end_date", FieldRule::Date),
        ("project_id", FieldRule::Id),
    ],
};

/// Optional `project_id` filter; present but malformed is an error
fn project_filter(data: &Record) -> Result<Option<i64>, HandlerError> {
    if !is_present(data, "project_id") {
        return Ok(None);
    }
    data.get("project_id")
        .and_then(as_id)
        .map(Some)
        .ok_or_else(|| HandlerError::validation("Invalid project ID"))
}

pub async fn create(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let project_id = project_filter(data)?
        .ok_or_else(|| HandlerError::validation("project_id required"))?;

    let mut fields = Record::new();
    fields.insert(
        "name".into(),
        json!(non_empty_str(data, "name").unwrap_or("New Sprint")),
    );
    fields.insert(
        "description".into(),
        json!(non_empty_str(data, "description").unwrap_or("Created by sprintdesk")),
    );
    fields.insert("project_id".into(), json!(project_id));
    fields.insert("start_date".into(), json!(ctx.date_or(data, "start_date", 0)));
    fields.insert(
        "end_date".into(),
        json!(ctx.date_or(data, "end_date", ctx.config.engine.sprint_duration_days)),
    );
    fields.insert(
        "status".into(),
        json!(EntityKind::Sprint.status_code(data.get("status").unwrap_or(&json!("active")))),
    );

    tracing::info!(
        "Creating sprint '{}' in project {}",
        fields["name"].as_str().unwrap_or_default(),
        project_id
    );
    let response = ctx.api.sprints().create(fields.clone()).await?;
    let created = ctx
        .recover_created(EntityKind::Sprint, response, fields, Filters::project(project_id))
        .await;
    Ok(ExecutionResult::ok(ResultType::Sprint, Value::Object(created)))
}

pub async fn list(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let filters = Filters {
        project_id: project_filter(data)?,
        sprint_id: None,
    };
    let sprints = ctx.api.sprints().get_all(filters).await?;
    Ok(ExecutionResult::ok(ResultType::Sprints, json!(sprints)))
}

pub async fn delete(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let (id, before) = delete_entity(ctx, EntityKind::Sprint, data, &["name", "sprint_name"]).await?;
    Ok(ExecutionResult::ok(
        ResultType::SprintDeleted,
        deleted_payload(EntityKind::Sprint, id, before.as_ref()),
    ))
}

pub async fn delete_by_name(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let filters = Filters {
        project_id: project_filter(data)?,
        sprint_id: None,
    };
    bulk_delete(
        ctx,
        EntityKind::Sprint,
        data,
        filters,
        ResultType::SprintsBulkDeleted,
    )
    .await
}
