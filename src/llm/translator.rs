//! Translate free-text requests into operation batches
//!
//! The model answers with `{"operations": [...]}`; surrounding prose is
//! tolerated and stripped before parsing.

use crate::core::error::{SprintdeskError, Result};
use crate::engine::operation::{parse_batch, Batch, OperationKind};
use crate::llm::client::Complete;
use crate::llm::context::WorkspaceContext;

/// Translate `input` into a batch using the workspace `context`
pub async fn translate(
    client: &dyn Complete,
    input: &str,
    context: &WorkspaceContext,
) -> Result<Batch> {
    let system_prompt = system_prompt();
    let user_prompt = format!(
        "CURRENT CONTEXT:\n{}\nUSER REQUEST:\n{}\n\nGenerate the operations as JSON:",
        context.summary(),
        input
    );

    let response = client.complete(&system_prompt, &user_prompt).await?;
    let json_str = extract_json(&response)?;

    let batch = parse_batch(json_str).map_err(|e| {
        SprintdeskError::LlmError(format!(
            "Failed to parse operations: {} - Response: {}",
            e, response
        ))
    })?;

    for op in &batch {
        if let OperationKind::Unknown(tag) = &op.kind {
            tracing::warn!("Model produced unknown operation {}", tag);
        }
    }
    tracing::info!("Translated request into {} operations", batch.len());
    Ok(batch)
}

/// Extract the outermost JSON object or array from a model reply
fn extract_json(response: &str) -> Result<&str> {
    let start = response
        .find(|c| c == '{' || c == '[')
        .ok_or_else(|| SprintdeskError::LlmError("No JSON found in response".into()))?;
    let closing = if response[start..].starts_with('{') { '}' } else { ']' };
    let end = response
        .rfind(closing)
        .filter(|end| *end > start)
        .ok_or_else(|| SprintdeskError::LlmError("No closing bracket found in response".into()))?;
    Ok(&response[start..=end])
}

fn system_prompt() -> String {
    let tags: Vec<&str> = OperationKind::known().iter().map(|k| k.as_str()).collect();
    format!("{}\nVALID TYPES: {}\n", SYSTEM_PROMPT, tags.join(", "))
}

/// System prompt for operation generation
const SYSTEM_PROMPT: &str = r#"You generate operations for a project management API.
Convert the user's request into an ordered JSON batch.

OPERATIONS:
- CREATE_PROJECT {name, description, start_date, end_date, status}
- CREATE_SPRINT {name, description, project_id (required), start_date, end_date}
- CREATE_TASK {title, description, project_id, sprint_id, sprint_name, priority, status, estimated_hours, due_date}
- LIST_PROJECTS, LIST_SPRINTS {project_id}, LIST_TASKS {project_id, sprint_id}, LIST_USERS
- UPDATE_PROJECT / UPDATE_SPRINT / UPDATE_TASK / UPDATE_USER {id or name, plus the fields to change; new_name / new_title / new_username to rename}
- DELETE_PROJECT / DELETE_SPRINT / DELETE_TASK / DELETE_USER {id or name}
- DELETE_PROJECTS_BY_NAME / DELETE_SPRINTS_BY_NAME {name_pattern}
- ASSIGN_USER_TO_PROJECT / REMOVE_USER_FROM_PROJECT {project_id or project_name, user_id or user_name, role}
- LIST_PROJECT_MEMBERS {project_id or project_name}
- AUTO_ASSIGN_USERS {project_id or project_name, count, criteria: random|by_role|least_busy}
- QUERY_STATUS {query, entity_type: project|sprint|task|general, entity_name or entity_id}

VALUES:
- project status: active|completed|paused; sprint status: active|completed
- task status: todo|in_progress|completed; priority: low|medium|high|critical
- dates: YYYY-MM-DD

REFERENCES:
Give an operation a "reference" name to use its result later as "$name.field"
(or "$name" for its id). Example: "project_id": "$proj1.id".
Use ids from the context for entities that already exist.

OUTPUT FORMAT (JSON only, no explanation):
{"operations": [{"type": "OPERATION_TYPE", "data": {...}, "reference": "optional_name"}]}

Example: "create project Shop with a sprint and 2 tasks" ->
{"operations": [
  {"type": "CREATE_PROJECT", "data": {"name": "Shop"}, "reference": "proj1"},
  {"type": "CREATE_SPRINT", "data": {"name": "Sprint 1", "project_id": "$proj1.id"}, "reference": "sprint1"},
  {"type": "CREATE_TASK", "data": {"title": "Product page", "project_id": "$proj1.id", "sprint_id": "$sprint1.id"}},
  {"type": "CREATE_TASK", "data": {"title": "Checkout form", "project_id": "$proj1.id", "sprint_id": "$sprint1.id"}}
]}
"#;
