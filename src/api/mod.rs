//! Collaborator contract for the remote project API
//!
//! The engine only ever talks to `ProjectApi`. Two implementations ship with
//! the crate: `HttpApi` for the real REST service and `MemoryApi`, an
//! in-process store used for offline runs and tests.

pub mod http;
pub mod memory;

pub use http::HttpApi;
pub use memory::MemoryApi;

use crate::core::types::{as_id, EntityKind, Record};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failure reported by a collaborator call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The API answered successfully but the body carried an error field
    #[error("{0}")]
    Rejected(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Unexpected response: {0}")]
    Decode(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Optional list filters; services ignore the ones they do not support
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filters {
    pub project_id: Option<i64>,
    pub sprint_id: Option<i64>,
}

impl Filters {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn project(project_id: i64) -> Self {
        Self {
            project_id: Some(project_id),
            sprint_id: None,
        }
    }

    pub fn sprint(project_id: Option<i64>, sprint_id: i64) -> Self {
        Self {
            project_id,
            sprint_id: Some(sprint_id),
        }
    }
}

/// CRUD surface of one entity collection
#[async_trait]
pub trait EntityService: Send + Sync {
    /// Create an entity; returns the response body (may be `null` when the
    /// API does not echo the created record)
    async fn create(&self, fields: Record) -> ApiResult<Value>;

    async fn get_all(&self, filters: Filters) -> ApiResult<Vec<Record>>;

    /// Look a single entity up by id
    ///
    /// The REST API has no item endpoint for most collections, so the
    /// default scans the full list.
    async fn get_by_id(&self, id: i64) -> ApiResult<Option<Record>> {
        let all = self.get_all(Filters::none()).await?;
        Ok(all
            .into_iter()
            .find(|record| record.get("id").and_then(as_id) == Some(id)))
    }

    /// Replace the entity's fields with `fields`
    async fn update(&self, id: i64, fields: Record) -> ApiResult<()>;

    async fn delete(&self, id: i64) -> ApiResult<()>;
}

/// Project membership surface
#[async_trait]
pub trait MemberService: Send + Sync {
    async fn get_all(&self) -> ApiResult<Vec<Record>>;

    async fn get_by_project(&self, project_id: i64) -> ApiResult<Vec<Record>>;

    async fn assign_user(&self, project_id: i64, user_id: i64, role: &str) -> ApiResult<()>;

    async fn remove_user(&self, project_id: i64, user_id: i64) -> ApiResult<()>;
}

/// The full collaborator: one service per entity type
pub trait ProjectApi: Send + Sync {
    fn projects(&self) -> &dyn EntityService;
    fn sprints(&self) -> &dyn EntityService;
    fn tasks(&self) -> &dyn EntityService;
    fn users(&self) -> &dyn EntityService;
    fn members(&self) -> &dyn MemberService;

    fn service(&self, kind: EntityKind) -> &dyn EntityService {
        match kind {
            EntityKind::Project => self.projects(),
            EntityKind::Sprint => self.sprints(),
            EntityKind::Task => self.tasks(),
            EntityKind::User => self.users(),
        }
    }
}

/// Normalize a list response (`[...]` or `{"data": [...]}`) into records
pub(crate) fn records_from(body: Value) -> ApiResult<Vec<Record>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => items,
            _ => return Err(ApiError::Decode("expected a list of records".into())),
        },
        Value::Null => Vec::new(),
        other => return Err(ApiError::Decode(format!("expected a list, got {}", other))),
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_from_shapes() {
        let plain = records_from(json!([{"id": 1}, {"id": 2}])).unwrap();
        assert_eq!(plain.len(), 2);

        let wrapped = records_from(json!({"data": [{"id": 1}]})).unwrap();
        assert_eq!(wrapped.len(), 1);

        assert!(records_from(Value::Null).unwrap().is_empty());
        assert!(records_from(json!({"message": "nope"})).is_err());
    }

    #[test]
    fn test_records_from_skips_non_objects() {
        let records = records_from(json!([{"id": 1}, 7, "x"])).unwrap();
        assert_eq!(records.len(), 1);
    }
}
