//! Task operations

use super::{delete_entity, deleted_payload, FieldRule, HandlerContext, HandlerError, HandlerResult, UpdateSpec};
use crate::api::Filters;
use crate::core::types::{
    as_hours, as_id, hours_json, is_present, non_empty_str, priority_code, EntityKind, Record,
};
use crate::engine::matcher::find_exact;
use crate::engine::operation::{ExecutionResult, ResultType};
use crate::engine::schedule::estimate_hours;
use serde_json::{json, Value};

const LOOKUP_KEYS: &[&str] = &["title", "name", "task_title"];

pub const UPDATE: UpdateSpec = UpdateSpec {
    kind: EntityKind::Task,
    result_type: ResultType::TaskUpdated,
    lookup_keys: LOOKUP_KEYS,
    rename: Some(("new_title", "title")),
    fields: &[
        ("title", FieldRule::Text),
        ("description", FieldRule::Text),
        ("status", FieldRule::Status),
        ("priority", FieldRule::Priority),
        ("estimated_hours", FieldRule::Hours),
        ("due_date", FieldRule::Date),
        ("sprint_id", FieldRule::Id),
        ("project_id", FieldRule::Id),
    ],
};

/// Optional id field; malformed values are logged and dropped
fn optional_id(data: &Record, key: &str) -> Option<i64> {
    if !is_present(data, key) {
        return None;
    }
    let id = data.get(key).and_then(as_id);
    if id.is_none() {
        tracing::warn!("Ignoring invalid {}: {:?}", key, data.get(key));
    }
    id
}

/// Sprint a task should land in when no `sprint_id` was given
///
/// An explicit `sprint_name` is matched exactly; otherwise the first sprint
/// whose name appears in the task's title or description is used.
async fn infer_sprint(
    ctx: &HandlerContext<'_>,
    data: &Record,
    project_id: Option<i64>,
) -> Result<Option<i64>, HandlerError> {
    let filters = Filters {
        project_id,
        sprint_id: None,
    };
    let sprints = ctx.api.sprints().get_all(filters).await?;

    if let Some(name) = non_empty_str(data, "sprint_name") {
        if let Some(sprint) = find_exact(&sprints, "name", name) {
            return Ok(sprint.get("id").and_then(as_id));
        }
        tracing::warn!("Sprint '{}' not found for new task", name);
    }

    let title = non_empty_str(data, "title").unwrap_or_default().to_lowercase();
    let description = non_empty_str(data, "description").unwrap_or_default().to_lowercase();
    let detected = sprints.iter().find(|sprint| {
        non_empty_str(sprint, "name")
            .map(|name| {
                let name = name.to_lowercase();
                title.contains(&name) || description.contains(&name)
            })
            .unwrap_or(false)
    });

    Ok(detected.and_then(|sprint| {
        let id = sprint.get("id").and_then(as_id);
        if let Some(id) = id {
            tracing::info!("Auto-detected sprint '{}' ({})", EntityKind::Sprint.display_name(sprint), id);
        }
        id
    }))
}

pub async fn create(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let title = non_empty_str(data, "title").unwrap_or("New Task");
    let description = non_empty_str(data, "description").unwrap_or("Created by sprintdesk");
    let estimated_hours = data
        .get("estimated_hours")
        .and_then(as_hours)
        .unwrap_or_else(|| {
            estimate_hours(
                non_empty_str(data, "title").unwrap_or_default(),
                non_empty_str(data, "description").unwrap_or_default(),
            )
        });

    let mut fields = Record::new();
    fields.insert("title".into(), json!(title));
    fields.insert("description".into(), json!(description));
    fields.insert(
        "priority".into(),
        json!(priority_code(data.get("priority").unwrap_or(&json!("medium")))),
    );
    fields.insert(
        "status".into(),
        json!(EntityKind::Task.status_code(data.get("status").unwrap_or(&json!("todo")))),
    );
    fields.insert("estimated_hours".into(), hours_json(estimated_hours));
    fields.insert(
        "due_date".into(),
        json!(ctx.date_or(data, "due_date", ctx.config.engine.task_due_days)),
    );

    let project_id = optional_id(data, "project_id");
    if let Some(project_id) = project_id {
        fields.insert("project_id".into(), json!(project_id));
    }

    let mut sprint_id = optional_id(data, "sprint_id");
    if sprint_id.is_none() {
        sprint_id = match infer_sprint(ctx, data, project_id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Sprint detection skipped for '{}': {}", title, e);
                None
            }
        };
    }
    if let Some(sprint_id) = sprint_id {
        fields.insert("sprint_id".into(), json!(sprint_id));
    }

    tracing::info!("Creating task '{}' ({}h)", title, estimated_hours);
    let response = ctx.api.tasks().create(fields.clone()).await?;
    let filters = Filters {
        project_id,
        sprint_id: None,
    };
    let created = ctx
        .recover_created(EntityKind::Task, response, fields, filters)
        .await;
    Ok(ExecutionResult::ok(ResultType::Task, Value::Object(created)))
}

pub async fn list(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let filters = Filters {
        project_id: optional_id(data, "project_id"),
        sprint_id: optional_id(data, "sprint_id"),
    };
    let tasks = ctx.api.tasks().get_all(filters).await?;
    Ok(ExecutionResult::ok(ResultType::Tasks, json!(tasks)))
}

/// Delete a task and confirm it is really gone
pub async fn delete(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let (id, before) = delete_entity(ctx, EntityKind::Task, data, LOOKUP_KEYS).await?;

    ctx.settle().await;
    if ctx.api.tasks().get_by_id(id).await?.is_some() {
        tracing::warn!("Task {} still exists after deletion", id);
        return Err(HandlerError::validation(format!(
            "Task appears to still exist after deletion (task {} is still present)",
            id
        )));
    }

    Ok(ExecutionResult::ok(
        ResultType::TaskDeleted,
        deleted_payload(EntityKind::Task, id, before.as_ref()),
    ))
}

#[cfg(test)]
mod tests {
    use super::super::testing::{config, ctx, data};
    use super::super::update_entity;
    use super::*;
    use crate::api::{ApiError, ApiResult, EntityService, MemberService, MemoryApi, ProjectApi};

    #[tokio::test]
    async fn test_create_defaults_and_estimate() {
        let api = MemoryApi::new();
        let config = config();
        let result = create(
            &ctx(&api, &config),
            &data(json!({"title": "Checkout form", "project_id": 1})),
        )
        .await
        .unwrap();

        let task = result.record().unwrap();
        assert_eq!(task["id"], json!(1));
        assert_eq!(task["priority"], json!(2));
        assert_eq!(task["status"], json!(0));
        assert_eq!(task["estimated_hours"], json!(12));
        assert_eq!(task["due_date"], json!("2025-03-08T09:00:00Z"));
        assert!(task.get("sprint_id").is_none());
    }

    #[tokio::test]
    async fn test_explicit_hours_and_bad_ids() {
        let api = MemoryApi::new();
        let config = config();
        let result = create(
            &ctx(&api, &config),
            &data(json!({"title": "Docs", "estimated_hours": "5", "project_id": "abc", "priority": "high"})),
        )
        .await
        .unwrap();
        let task = result.record().unwrap();
        assert_eq!(task["estimated_hours"], json!(5));
        assert_eq!(task["priority"], json!(3));
        assert!(task.get("project_id").is_none());
    }

    #[tokio::test]
    async fn test_sprint_by_name_and_auto_detect() {
        let api = MemoryApi::new();
        let config = config();
        MemoryApi::seed_json(&api.sprints, json!({"id": 3, "name": "Backend", "project_id": 1}));
        MemoryApi::seed_json(&api.sprints, json!({"id": 4, "name": "Frontend", "project_id": 1}));

        let named = create(
            &ctx(&api, &config),
            &data(json!({"title": "Login", "sprint_name": "frontend"})),
        )
        .await
        .unwrap();
        assert_eq!(named.record().unwrap()["sprint_id"], json!(4));

        let detected = create(
            &ctx(&api, &config),
            &data(json!({"title": "Wire up backend caching"})),
        )
        .await
        .unwrap();
        assert_eq!(detected.record().unwrap()["sprint_id"], json!(3));
    }

    #[tokio::test]
    async fn test_update_task_by_title() {
        let api = MemoryApi::new();
        let config = config();
        MemoryApi::seed_json(&api.tasks, json!({"id": 9, "title": "Write tests", "status": 0, "sprint_id": 2}));

        let result = update_entity(
            &ctx(&api, &config),
            &UPDATE,
            &data(json!({"title": "write tests", "status": "in_progress", "priority": "critical"})),
        )
        .await
        .unwrap();
        assert_eq!(result.record().unwrap()["title"], json!("Write tests"));

        let stored = api.tasks.row(9).unwrap();
        assert_eq!(stored["status"], json!(1));
        assert_eq!(stored["priority"], json!(4));
        assert_eq!(stored["sprint_id"], json!(2));
    }

    #[tokio::test]
    async fn test_delete_task_verified() {
        let api = MemoryApi::new();
        let config = config();
        MemoryApi::seed_json(&api.tasks, json!({"id": 2, "title": "Old task"}));

        let result = delete(&ctx(&api, &config), &data(json!({"task_id": 2})))
            .await
            .unwrap();
        assert_eq!(result.data, Some(json!({"id": 2, "title": "Old task", "deleted": true})));
    }

    /// Task collection whose deletes report success but change nothing
    struct Sticky(MemoryApi);

    #[async_trait::async_trait]
    impl EntityService for Sticky {
        async fn create(&self, fields: Record) -> ApiResult<Value> {
            self.0.tasks.create(fields).await
        }
        async fn get_all(&self, filters: Filters) -> ApiResult<Vec<Record>> {
            self.0.tasks.get_all(filters).await
        }
        async fn update(&self, id: i64, fields: Record) -> ApiResult<()> {
            self.0.tasks.update(id, fields).await
        }
        async fn delete(&self, _: i64) -> ApiResult<()> {
            Ok(())
        }
    }

    impl ProjectApi for Sticky {
        fn projects(&self) -> &dyn EntityService {
            &self.0.projects
        }
        fn sprints(&self) -> &dyn EntityService {
            &self.0.sprints
        }
        fn tasks(&self) -> &dyn EntityService {
            self
        }
        fn users(&self) -> &dyn EntityService {
            &self.0.users
        }
        fn members(&self) -> &dyn MemberService {
            &self.0.members
        }
    }

    #[tokio::test]
    async fn test_delete_task_still_present() {
        let api = Sticky(MemoryApi::new());
        let config = config();
        MemoryApi::seed_json(&api.0.tasks, json!({"id": 2, "title": "Zombie"}));

        let err = delete(&ctx(&api, &config), &data(json!({"title": "Zombie"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("still present"));
    }

    /// Collection whose every call times out
    struct Unreachable;

    #[async_trait::async_trait]
    impl EntityService for Unreachable {
        async fn create(&self, _: Record) -> ApiResult<Value> {
            Err(ApiError::Timeout)
        }
        async fn get_all(&self, _: Filters) -> ApiResult<Vec<Record>> {
            Err(ApiError::Timeout)
        }
        async fn update(&self, _: i64, _: Record) -> ApiResult<()> {
            Err(ApiError::Timeout)
        }
        async fn delete(&self, _: i64) -> ApiResult<()> {
            Err(ApiError::Timeout)
        }
    }

    struct SprintsDown(MemoryApi);

    impl ProjectApi for SprintsDown {
        fn projects(&self) -> &dyn EntityService {
            &self.0.projects
        }
        fn sprints(&self) -> &dyn EntityService {
            &Unreachable
        }
        fn tasks(&self) -> &dyn EntityService {
            &self.0.tasks
        }
        fn users(&self) -> &dyn EntityService {
            &self.0.users
        }
        fn members(&self) -> &dyn MemberService {
            &self.0.members
        }
    }

    #[tokio::test]
    async fn test_sprint_listing_error_does_not_block_create() {
        let api = SprintsDown(MemoryApi::new());
        let config = config();

        let result = create(
            &ctx(&api, &config),
            &data(json!({"title": "Login", "sprint_name": "Frontend", "project_id": 1})),
        )
        .await
        .unwrap();

        let task = result.record().unwrap();
        assert_eq!(task["title"], json!("Login"));
        assert!(task.get("sprint_id").is_none());
        assert_eq!(api.0.tasks.len(), 1);
    }
}
