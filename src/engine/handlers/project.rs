//! Project operations

use super::{
    bulk_delete, delete_entity, deleted_payload, FieldRule, HandlerContext, HandlerResult,
    UpdateSpec,
};
use crate::api::Filters;
use crate::core::types::{non_empty_str, EntityKind, Record};
use crate::engine::operation::{ExecutionResult, ResultType};
use serde_json::{json, Value};

pub const UPDATE: UpdateSpec = UpdateSpec {
    kind: EntityKind::Project,
    result_type: ResultType::ProjectUpdated,
    lookup_keys: &["name", "project_name"],
    rename: Some(("new_name", "name")),
    fields: &[
        ("name", FieldRule::Text),
        ("description", FieldRule::Text),
        ("status", FieldRule::Status),
        ("start_date", FieldRule::Date),
        ("end_date", FieldRule::Date),
    ],
};

pub async fn create(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let mut fields = Record::new();
    fields.insert(
        "name".into(),
        json!(non_empty_str(data, "name").unwrap_or("New Project")),
    );
    fields.insert(
        "description".into(),
        json!(non_empty_str(data, "description").unwrap_or("Created by sprintdesk")),
    );
    fields.insert("start_date".into(), json!(ctx.date_or(data, "start_date", 0)));
    fields.insert(
        "end_date".into(),
        json!(ctx.date_or(data, "end_date", ctx.config.engine.project_duration_days)),
    );
    fields.insert(
        "status".into(),
        json!(EntityKind::Project.status_code(data.get("status").unwrap_or(&json!("active")))),
    );

    tracing::info!("Creating project '{}'", fields["name"].as_str().unwrap_or_default());
    let response = ctx.api.projects().create(fields.clone()).await?;
    let created = ctx
        .recover_created(EntityKind::Project, response, fields, Filters::none())
        .await;
    Ok(ExecutionResult::ok(ResultType::Project, Value::Object(created)))
}

pub async fn list(ctx: &HandlerContext<'_>) -> HandlerResult {
    let projects = ctx.api.projects().get_all(Filters::none()).await?;
    Ok(ExecutionResult::ok(ResultType::Projects, json!(projects)))
}

pub async fn delete(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let (id, before) = delete_entity(ctx, EntityKind::Project, data, &["name", "project_name"]).await?;
    Ok(ExecutionResult::ok(
        ResultType::ProjectDeleted,
        deleted_payload(EntityKind::Project, id, before.as_ref()),
    ))
}

pub async fn delete_by_name(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    bulk_delete(
        ctx,
        EntityKind::Project,
        data,
        Filters::none(),
        ResultType::ProjectsBulkDeleted,
    )
    .await
}
