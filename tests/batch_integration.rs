//! Integration tests for batch execution
//!
//! These run whole batches through `Engine` against the in-memory API:
//! - reference chaining between create operations
//! - partial failure (failed references, unknown operations)
//! - schedule inference writing dates back after task creation
//! - bulk deletes where some deletions fail

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use sprintdesk::api::{
    ApiError, ApiResult, EntityService, Filters, MemberService, MemoryApi, ProjectApi,
};
use sprintdesk::core::config::Config;
use sprintdesk::core::types::Record;
use sprintdesk::engine::{parse_batch, Engine, Operation, OperationKind, ResultType};
use std::sync::Arc;

fn config() -> Config {
    let mut config = Config::default();
    config.engine.consistency_wait_ms = 0;
    config
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

fn memory_engine() -> (Arc<MemoryApi>, Engine) {
    let api = Arc::new(MemoryApi::new());
    (api.clone(), Engine::new(api, config()))
}

// ============================================================================
// Reference chaining and schedule inference
// ============================================================================

#[tokio::test]
async fn test_project_sprint_tasks_chain_and_get_dates() {
    let (api, engine) = memory_engine();
    let batch = parse_batch(
        r#"{"operations": [
            {"type": "CREATE_PROJECT", "data": {"name": "Landing"}, "reference": "p"},
            {"type": "CREATE_SPRINT", "data": {"name": "S1", "project_id": "$p.id"}, "reference": "s1"},
            {"type": "CREATE_TASK", "data": {"title": "Write copy", "project_id": "$p.id", "sprint_id": "$s1.id"}},
            {"type": "CREATE_TASK", "data": {"title": "Review copy", "project_id": "$p", "sprint_id": "$s1"}}
        ]}"#,
    )
    .unwrap();

    let outcome = engine.execute_at(&batch, now()).await;
    assert_eq!(outcome.succeeded(), 4, "{}", outcome.summary_text);

    for task in &outcome.results[2..] {
        let task = task.record().unwrap();
        assert_eq!(task["project_id"], json!(1));
        assert_eq!(task["sprint_id"], json!(1));
        assert_eq!(task["estimated_hours"], json!(8));
    }

    // 16h over two tasks: one week minimum, 7 days, buffered to 8
    let project = api.projects.row(1).unwrap();
    assert_eq!(project["name"], json!("Landing"));
    assert_eq!(project["start_date"], json!("2025-03-01T09:00:00Z"));
    assert_eq!(project["end_date"], json!("2025-03-09T09:00:00Z"));

    let sprint = api.sprints.row(1).unwrap();
    assert_eq!(sprint["name"], json!("S1"));
    assert_eq!(sprint["project_id"], json!(1));
    assert_eq!(sprint["start_date"], json!("2025-03-01T09:00:00Z"));
    assert_eq!(sprint["end_date"], json!("2025-03-09T09:00:00Z"));

    assert!(outcome.summary_text.contains("Estimated effort: 16h"));
}

#[tokio::test]
async fn test_two_sprints_are_laid_back_to_back() {
    let (api, engine) = memory_engine();
    let batch = vec![
        Operation::with_json(OperationKind::CreateProject, json!({"name": "Shop"})).reference("p"),
        Operation::with_json(OperationKind::CreateSprint, json!({"name": "A", "project_id": "$p.id"}))
            .reference("a"),
        Operation::with_json(OperationKind::CreateSprint, json!({"name": "B", "project_id": "$p.id"}))
            .reference("b"),
        Operation::with_json(OperationKind::CreateTask, json!({"title": "Plain", "sprint_id": "$a.id"})),
        Operation::with_json(OperationKind::CreateTask, json!({"title": "Other", "sprint_id": "$b.id"})),
    ];

    let outcome = engine.execute_at(&batch, now()).await;
    assert_eq!(outcome.failed(), 0);

    // each sprint: 8h -> 8 days; B starts after a 2 day gap
    let a = api.sprints.row(1).unwrap();
    let b = api.sprints.row(2).unwrap();
    assert_eq!(a["end_date"], json!("2025-03-09T09:00:00Z"));
    assert_eq!(b["start_date"], json!("2025-03-11T09:00:00Z"));
    assert_eq!(b["end_date"], json!("2025-03-19T09:00:00Z"));
    assert_eq!(api.projects.row(1).unwrap()["end_date"], json!("2025-03-19T09:00:00Z"));
}

#[tokio::test]
async fn test_no_project_in_batch_leaves_dates_alone() {
    let (api, engine) = memory_engine();
    MemoryApi::seed_json(
        &api.sprints,
        json!({"id": 1, "name": "Existing", "project_id": 9, "end_date": "2025-12-31T00:00:00Z"}),
    );
    let batch = vec![Operation::with_json(
        OperationKind::CreateTask,
        json!({"title": "Plain", "sprint_id": 1}),
    )];

    let outcome = engine.execute_at(&batch, now()).await;
    assert_eq!(outcome.succeeded(), 1);
    assert_eq!(api.sprints.row(1).unwrap()["end_date"], json!("2025-12-31T00:00:00Z"));
}

// ============================================================================
// Partial failure
// ============================================================================

#[tokio::test]
async fn test_failed_reference_resolves_to_null() {
    let (api, engine) = memory_engine();
    let batch = vec![
        Operation::with_json(OperationKind::CreateSprint, json!({"name": "Orphan"})).reference("s"),
        Operation::with_json(OperationKind::CreateTask, json!({"title": "Plain", "sprint_id": "$s.id"})),
    ];

    let outcome = engine.execute_at(&batch, now()).await;
    assert!(outcome.is_partial_failure());
    assert_eq!(outcome.results[0].error.as_deref(), Some("project_id required"));

    let task = outcome.results[1].record().unwrap();
    assert!(task.get("sprint_id").is_none());
    assert_eq!(api.tasks.len(), 1);
    assert!(api.sprints.is_empty());
}

#[tokio::test]
async fn test_unknown_operation_is_reported_in_place() {
    let (_, engine) = memory_engine();
    let batch = parse_batch(
        r#"[
            {"type": "CREATE_PROJECT", "data": {"name": "Shop"}},
            {"type": "FLY_TO_MOON", "data": {}},
            {"type": "list_projects"}
        ]"#,
    )
    .unwrap();

    let outcome = engine.execute_at(&batch, now()).await;
    assert_eq!(outcome.results.len(), 3);
    assert!(outcome.results[0].success);
    assert_eq!(outcome.results[1].result_type, ResultType::Error);
    assert_eq!(outcome.results[1].error.as_deref(), Some("Unknown operation: FLY_TO_MOON"));
    assert!(outcome.results[2].success);
    assert_eq!(outcome.results[2].data, Some(json!([{
        "id": 1,
        "name": "Shop",
        "description": "Created by sprintdesk",
        "start_date": "2025-03-01T09:00:00Z",
        "end_date": "2025-03-31T09:00:00Z",
        "status": 0
    }])));
    assert!(outcome.summary_text.contains("1 operation failed"));
    assert!(outcome.summary_text.contains("  - Unknown operation: FLY_TO_MOON"));
}

#[tokio::test]
async fn test_summary_lists_first_three_failures() {
    let (_, engine) = memory_engine();
    let mut batch = vec![Operation::with_json(OperationKind::ListUsers, json!({}))];
    for name in ["a", "b", "c", "d"] {
        batch.push(Operation::with_json(OperationKind::DeleteProject, json!({"name": name})));
    }

    let outcome = engine.execute_at(&batch, now()).await;
    assert_eq!(outcome.failed(), 4);
    assert!(outcome.summary_text.contains("4 operations failed"));
    assert!(outcome.summary_text.contains("Project 'c' not found"));
    assert!(!outcome.summary_text.contains("Project 'd' not found"));
}

#[tokio::test]
async fn test_results_serialize_as_envelopes() {
    let (_, engine) = memory_engine();
    let batch = vec![Operation::with_json(OperationKind::DeleteTask, json!({}))];
    let outcome = engine.execute_at(&batch, now()).await;

    let value = serde_json::to_value(&outcome.results[0]).unwrap();
    assert_eq!(
        value,
        json!({"success": false, "type": "error", "error": "task_id or title required"})
    );
}

// ============================================================================
// Bulk delete with a flaky collaborator
// ============================================================================

/// Project collection whose deletes fail for selected ids
struct FlakyProjects {
    inner: MemoryApi,
    failing: Vec<i64>,
}

#[async_trait]
impl EntityService for FlakyProjects {
    async fn create(&self, fields: Record) -> ApiResult<Value> {
        self.inner.projects.create(fields).await
    }

    async fn get_all(&self, filters: Filters) -> ApiResult<Vec<Record>> {
        self.inner.projects.get_all(filters).await
    }

    async fn update(&self, id: i64, fields: Record) -> ApiResult<()> {
        self.inner.projects.update(id, fields).await
    }

    async fn delete(&self, id: i64) -> ApiResult<()> {
        if self.failing.contains(&id) {
            return Err(ApiError::Status {
                status: 500,
                message: "database locked".into(),
            });
        }
        self.inner.projects.delete(id).await
    }
}

impl ProjectApi for FlakyProjects {
    fn projects(&self) -> &dyn EntityService {
        self
    }

    fn sprints(&self) -> &dyn EntityService {
        &self.inner.sprints
    }

    fn tasks(&self) -> &dyn EntityService {
        &self.inner.tasks
    }

    fn users(&self) -> &dyn EntityService {
        &self.inner.users
    }

    fn members(&self) -> &dyn MemberService {
        &self.inner.members
    }
}

fn flaky(failing: Vec<i64>) -> Arc<FlakyProjects> {
    let api = FlakyProjects {
        inner: MemoryApi::new(),
        failing,
    };
    for i in 1..=5 {
        MemoryApi::seed_json(&api.inner.projects, json!({"id": i, "name": format!("Demo {}", i)}));
    }
    MemoryApi::seed_json(&api.inner.projects, json!({"id": 6, "name": "Keep me"}));
    Arc::new(api)
}

#[tokio::test]
async fn test_bulk_delete_reports_partial_failures() {
    let api = flaky(vec![2, 4]);
    let engine = Engine::new(api.clone(), config());
    let batch = vec![Operation::with_json(
        OperationKind::DeleteProjectsByName,
        json!({"name_pattern": "demo"}),
    )];

    let outcome = engine.execute_at(&batch, now()).await;
    let result = &outcome.results[0];
    assert!(result.success);
    assert_eq!(result.result_type, ResultType::ProjectsBulkDeleted);

    let data = result.record().unwrap();
    assert_eq!(data["deleted"].as_array().unwrap().len(), 3);
    let failed = data["failed"].as_array().unwrap();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0]["name"], json!("Demo 2"));
    assert_eq!(failed[0]["error"], json!("HTTP 500: database locked"));

    let left: Vec<String> = api
        .inner
        .projects
        .rows()
        .iter()
        .map(|p| p["name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(left, vec!["Demo 2", "Demo 4", "Keep me"]);
    assert_eq!(outcome.summary_text, "Deleted 3 projects matching 'demo', 2 could not be deleted");
}

#[tokio::test]
async fn test_bulk_delete_all_failing_is_a_failure_with_data() {
    let api = flaky(vec![1, 2, 3, 4, 5]);
    let engine = Engine::new(api, config());
    let batch = vec![Operation::with_json(
        OperationKind::DeleteProjectsByName,
        json!({"name_pattern": "Demo"}),
    )];

    let outcome = engine.execute_at(&batch, now()).await;
    let result = &outcome.results[0];
    assert!(!result.success);
    assert_eq!(result.result_type, ResultType::ProjectsBulkDeleted);
    assert_eq!(result.record().unwrap()["failed"].as_array().unwrap().len(), 5);
    assert!(result.error.as_deref().unwrap().starts_with("Failed to delete any of 5 projects"));
}

// ============================================================================
// Membership round trip
// ============================================================================

#[tokio::test]
async fn test_assign_by_names_then_list_members() {
    let (api, engine) = memory_engine();
    MemoryApi::seed_json(&api.users, json!({"id": 1, "username": "ana", "full_name": "Ana Lopez", "active": true}));
    let batch = vec![
        Operation::with_json(OperationKind::CreateProject, json!({"name": "Shop"})).reference("p"),
        Operation::with_json(
            OperationKind::AssignUserToProject,
            json!({"project_id": "$p.id", "user_name": "ana", "role": "developer"}),
        ),
        Operation::with_json(OperationKind::ListProjectMembers, json!({"project_name": "shop"})),
    ];

    let outcome = engine.execute_at(&batch, now()).await;
    assert_eq!(outcome.succeeded(), 3, "{}", outcome.summary_text);

    let assigned = outcome.results[1].record().unwrap();
    assert_eq!(assigned["user_name"], json!("Ana Lopez"));
    assert_eq!(assigned["project_name"], json!("Shop"));

    let members = outcome.results[2].data.as_ref().unwrap().as_array().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["role"], json!("developer"));
    assert_eq!(members[0]["user_details"]["username"], json!("ana"));
}

#[tokio::test]
async fn test_mixed_batch_summary_names_every_success() {
    let (api, engine) = memory_engine();
    MemoryApi::seed_json(&api.projects, json!({"id": 1, "name": "Shop"}));
    MemoryApi::seed_json(&api.projects, json!({"id": 2, "name": "Demo 1"}));
    MemoryApi::seed_json(&api.projects, json!({"id": 3, "name": "Demo 2"}));
    MemoryApi::seed_json(&api.users, json!({"id": 1, "username": "ana", "active": true}));
    MemoryApi::seed_json(&api.users, json!({"id": 2, "username": "bo", "active": true}));

    let batch = vec![
        Operation::with_json(
            OperationKind::AssignUserToProject,
            json!({"project_name": "Shop", "user_name": "ana"}),
        ),
        Operation::with_json(
            OperationKind::AssignUserToProject,
            json!({"project_name": "Shop", "user_name": "bo"}),
        ),
        Operation::with_json(OperationKind::DeleteProjectsByName, json!({"name_pattern": "demo"})),
        Operation::with_json(
            OperationKind::QueryStatus,
            json!({"query": "how many tasks", "entity_type": "project", "entity_name": "Shop"}),
        ),
        Operation::with_json(OperationKind::DeleteProject, json!({"name": "nope"})),
    ];

    let outcome = engine.execute_at(&batch, now()).await;
    assert_eq!(outcome.succeeded(), 4, "{}", outcome.summary_text);
    assert_eq!(
        outcome.summary_text,
        "Assigned:\n  - Shop: ana, bo\n\
         Deleted 2 projects matching 'demo'\n\
         0 total tasks in project Shop\n\
         Total: 4 operations succeeded\n\n\
         1 operation failed\n  - Project 'nope' not found"
    );
}
