//! Operations, batches and per-operation results

use crate::core::types::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Every operation the engine knows how to dispatch
///
/// Serialized as the SCREAMING_SNAKE_CASE tag used by the translator.
/// Unrecognized tags are kept in `Unknown` so a batch still deserializes
/// and the executor can report the bad operation in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationKind {
    CreateProject,
    CreateSprint,
    CreateTask,
    ListProjects,
    ListSprints,
    ListTasks,
    ListUsers,
    UpdateProject,
    UpdateSprint,
    UpdateTask,
    UpdateUser,
    DeleteProject,
    DeleteProjectsByName,
    DeleteSprint,
    DeleteSprintsByName,
    DeleteTask,
    DeleteUser,
    AssignUserToProject,
    RemoveUserFromProject,
    ListProjectMembers,
    AutoAssignUsers,
    QueryStatus,
    Unknown(String),
}

static KNOWN_KINDS: [OperationKind; 22] = [
    OperationKind::CreateProject,
    OperationKind::CreateSprint,
    OperationKind::CreateTask,
    OperationKind::ListProjects,
    OperationKind::ListSprints,
    OperationKind::ListTasks,
    OperationKind::ListUsers,
    OperationKind::UpdateProject,
    OperationKind::UpdateSprint,
    OperationKind::UpdateTask,
    OperationKind::UpdateUser,
    OperationKind::DeleteProject,
    OperationKind::DeleteProjectsByName,
    OperationKind::DeleteSprint,
    OperationKind::DeleteSprintsByName,
    OperationKind::DeleteTask,
    OperationKind::DeleteUser,
    OperationKind::AssignUserToProject,
    OperationKind::RemoveUserFromProject,
    OperationKind::ListProjectMembers,
    OperationKind::AutoAssignUsers,
    OperationKind::QueryStatus,
];

impl OperationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateProject => "CREATE_PROJECT",
            Self::CreateSprint => "CREATE_SPRINT",
            Self::CreateTask => "CREATE_TASK",
            Self::ListProjects => "LIST_PROJECTS",
            Self::ListSprints => "LIST_SPRINTS",
            Self::ListTasks => "LIST_TASKS",
            Self::ListUsers => "LIST_USERS",
            Self::UpdateProject => "UPDATE_PROJECT",
            Self::UpdateSprint => "UPDATE_SPRINT",
            Self::UpdateTask => "UPDATE_TASK",
            Self::UpdateUser => "UPDATE_USER",
            Self::DeleteProject => "DELETE_PROJECT",
            Self::DeleteProjectsByName => "DELETE_PROJECTS_BY_NAME",
            Self::DeleteSprint => "DELETE_SPRINT",
            Self::DeleteSprintsByName => "DELETE_SPRINTS_BY_NAME",
            Self::DeleteTask => "DELETE_TASK",
            Self::DeleteUser => "DELETE_USER",
            Self::AssignUserToProject => "ASSIGN_USER_TO_PROJECT",
            Self::RemoveUserFromProject => "REMOVE_USER_FROM_PROJECT",
            Self::ListProjectMembers => "LIST_PROJECT_MEMBERS",
            Self::AutoAssignUsers => "AUTO_ASSIGN_USERS",
            Self::QueryStatus => "QUERY_STATUS",
            Self::Unknown(tag) => tag,
        }
    }

    /// All dispatchable kinds, for prompts and help text
    pub fn known() -> &'static [OperationKind] {
        &KNOWN_KINDS
    }
}

impl From<String> for OperationKind {
    fn from(tag: String) -> Self {
        let normalized = tag.trim().to_uppercase();
        KNOWN_KINDS
            .iter()
            .find(|kind| kind.as_str() == normalized)
            .cloned()
            .unwrap_or(Self::Unknown(tag))
    }
}

impl From<OperationKind> for String {
    fn from(kind: OperationKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    #[serde(default)]
    pub data: Record,
    /// Name under which a successful result is bound for later operations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Operation {
    pub fn new(kind: OperationKind, data: Record) -> Self {
        Self {
            kind,
            data,
            reference: None,
        }
    }

    /// Build an operation from a JSON object literal; non-objects give empty data
    pub fn with_json(kind: OperationKind, data: Value) -> Self {
        let data = match data {
            Value::Object(record) => record,
            _ => Record::new(),
        };
        Self::new(kind, data)
    }

    pub fn reference(mut self, name: impl Into<String>) -> Self {
        self.reference = Some(name.into());
        self
    }
}

/// Ordered operations; order is the only dependency mechanism
pub type Batch = Vec<Operation>;

#[derive(Deserialize)]
#[serde(untagged)]
enum BatchShape {
    Wrapped { operations: Batch },
    Bare(Batch),
}

/// Parse a batch from JSON, either `[...]` or `{"operations": [...]}`
pub fn parse_batch(json: &str) -> serde_json::Result<Batch> {
    let shape: BatchShape = serde_json::from_str(json)?;
    Ok(match shape {
        BatchShape::Wrapped { operations } => operations,
        BatchShape::Bare(batch) => batch,
    })
}

/// Tag describing what a result's `data` holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    Project,
    Sprint,
    Task,
    Projects,
    Sprints,
    Tasks,
    Users,
    ProjectUpdated,
    SprintUpdated,
    TaskUpdated,
    UserUpdated,
    ProjectDeleted,
    SprintDeleted,
    TaskDeleted,
    UserDeleted,
    ProjectsBulkDeleted,
    SprintsBulkDeleted,
    UserAssigned,
    UserRemoved,
    ProjectMembers,
    AutoAssignment,
    QueryResponse,
    Error,
}

/// Uniform envelope every handler produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(rename = "type")]
    pub result_type: ResultType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn ok(result_type: ResultType, data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            result_type,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            result_type: ResultType::Error,
            error: Some(error.into()),
        }
    }

    /// A failed result that still carries data (e.g. bulk deletes where
    /// nothing could be removed)
    pub fn failure_with(result_type: ResultType, data: Value, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Some(data),
            result_type,
            error: Some(error.into()),
        }
    }

    /// `data` as an object, when it is one
    pub fn record(&self) -> Option<&Record> {
        self.data.as_ref().and_then(Value::as_object)
    }
}

/// Everything a batch produced, in operation order, plus a text summary
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<ExecutionResult>,
    pub summary_text: String,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn is_partial_failure(&self) -> bool {
        self.succeeded() > 0 && self.failed() > 0
    }
}
