//! In-process implementation of the project API
//!
//! Used by `--offline` runs and by the test suite. By default `create`
//! answers with an empty body, like the REST API does for most
//! collections, so callers exercise the same id-recovery path.

use super::{ApiError, ApiResult, EntityService, Filters, MemberService, ProjectApi};
use crate::core::types::{as_id, Record};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn record_id(record: &Record) -> Option<i64> {
    record.get("id").and_then(as_id)
}

fn matches_filter(record: &Record, key: &str, wanted: Option<i64>) -> bool {
    match wanted {
        Some(id) => record.get(key).and_then(as_id) == Some(id),
        None => true,
    }
}

/// One in-memory collection with auto-incrementing ids
pub struct MemoryCollection {
    rows: Mutex<Vec<Record>>,
    next_id: AtomicI64,
    echo_created: AtomicBool,
}

impl MemoryCollection {
    fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            echo_created: AtomicBool::new(false),
        }
    }

    /// Insert a record directly, assigning an id when it has none
    pub fn seed(&self, mut record: Record) -> i64 {
        let id = match record_id(&record) {
            Some(id) => {
                self.next_id.fetch_max(id + 1, Ordering::SeqCst);
                id
            }
            None => self.next_id.fetch_add(1, Ordering::SeqCst),
        };
        record.insert("id".into(), json!(id));
        lock(&self.rows).push(record);
        id
    }

    /// Make `create` answer with the stored record instead of an empty body
    pub fn set_echo_created(&self, echo: bool) {
        self.echo_created.store(echo, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored record
    pub fn rows(&self) -> Vec<Record> {
        lock(&self.rows).clone()
    }

    /// Stored record by id, without going through the async trait
    pub fn row(&self, id: i64) -> Option<Record> {
        lock(&self.rows)
            .iter()
            .find(|record| record_id(record) == Some(id))
            .cloned()
    }
}

#[async_trait]
impl EntityService for MemoryCollection {
    async fn create(&self, fields: Record) -> ApiResult<Value> {
        let id = self.seed(fields);
        if self.echo_created.load(Ordering::SeqCst) {
            Ok(self.row(id).map(Value::Object).unwrap_or(Value::Null))
        } else {
            Ok(Value::Null)
        }
    }

    async fn get_all(&self, filters: Filters) -> ApiResult<Vec<Record>> {
        Ok(lock(&self.rows)
            .iter()
            .filter(|record| matches_filter(record, "project_id", filters.project_id))
            .filter(|record| matches_filter(record, "sprint_id", filters.sprint_id))
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: i64) -> ApiResult<Option<Record>> {
        Ok(self.row(id))
    }

    async fn update(&self, id: i64, mut fields: Record) -> ApiResult<()> {
        let mut rows = lock(&self.rows);
        let row = rows
            .iter_mut()
            .find(|record| record_id(record) == Some(id))
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: format!("record {} not found", id),
            })?;
        fields.insert("id".into(), json!(id));
        *row = fields;
        Ok(())
    }

    async fn delete(&self, id: i64) -> ApiResult<()> {
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|record| record_id(record) != Some(id));
        if rows.len() == before {
            return Err(ApiError::Status {
                status: 404,
                message: format!("record {} not found", id),
            });
        }
        Ok(())
    }
}

/// Project membership rows `{project_id, user_id, role}`
pub struct MemoryMembers {
    rows: Mutex<Vec<Record>>,
}

impl MemoryMembers {
    pub fn rows(&self) -> Vec<Record> {
        lock(&self.rows).clone()
    }

    fn is_member(rows: &[Record], project_id: i64, user_id: i64) -> bool {
        rows.iter().any(|row| {
            matches_filter(row, "project_id", Some(project_id))
                && matches_filter(row, "user_id", Some(user_id))
        })
    }
}

#[async_trait]
impl MemberService for MemoryMembers {
    async fn get_all(&self) -> ApiResult<Vec<Record>> {
        Ok(self.rows())
    }

    async fn get_by_project(&self, project_id: i64) -> ApiResult<Vec<Record>> {
        Ok(lock(&self.rows)
            .iter()
            .filter(|row| matches_filter(row, "project_id", Some(project_id)))
            .cloned()
            .collect())
    }

    async fn assign_user(&self, project_id: i64, user_id: i64, role: &str) -> ApiResult<()> {
        let mut rows = lock(&self.rows);
        if Self::is_member(&rows, project_id, user_id) {
            return Err(ApiError::Status {
                status: 400,
                message: format!("user {} is already a member of project {}", user_id, project_id),
            });
        }
        let mut row = Record::new();
        row.insert("project_id".into(), json!(project_id));
        row.insert("user_id".into(), json!(user_id));
        row.insert("role".into(), json!(role));
        rows.push(row);
        Ok(())
    }

    async fn remove_user(&self, project_id: i64, user_id: i64) -> ApiResult<()> {
        let mut rows = lock(&self.rows);
        if !Self::is_member(&rows, project_id, user_id) {
            return Err(ApiError::Status {
                status: 404,
                message: format!("user {} is not a member of project {}", user_id, project_id),
            });
        }
        rows.retain(|row| {
            !(matches_filter(row, "project_id", Some(project_id))
                && matches_filter(row, "user_id", Some(user_id)))
        });
        Ok(())
    }
}

/// In-memory project API
pub struct MemoryApi {
    pub projects: MemoryCollection,
    pub sprints: MemoryCollection,
    pub tasks: MemoryCollection,
    pub users: MemoryCollection,
    pub members: MemoryMembers,
}

impl MemoryApi {
    pub fn new() -> Self {
        Self {
            projects: MemoryCollection::new(),
            sprints: MemoryCollection::new(),
            tasks: MemoryCollection::new(),
            users: MemoryCollection::new(),
            members: MemoryMembers {
                rows: Mutex::new(Vec::new()),
            },
        }
    }

    /// Seed a record from a JSON object literal; non-objects are ignored
    pub fn seed_json(collection: &MemoryCollection, value: Value) -> Option<i64> {
        match value {
            Value::Object(record) => Some(collection.seed(record)),
            _ => None,
        }
    }
}

impl Default for MemoryApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectApi for MemoryApi {
    fn projects(&self) -> &dyn EntityService {
        &self.projects
    }

    fn sprints(&self) -> &dyn EntityService {
        &self.sprints
    }

    fn tasks(&self) -> &dyn EntityService {
        &self.tasks
    }

    fn users(&self) -> &dyn EntityService {
        &self.users
    }

    fn members(&self) -> &dyn MemberService {
        &self.members
    }
}
