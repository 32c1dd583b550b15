//! REST client for the project API
//!
//! Every collection lives under its own list path (`/projectlist`,
//! `/sprintlist`, ...). Item lookups scan the list because the API has no
//! per-item GET for most collections.

use super::{records_from, ApiError, ApiResult, EntityService, Filters, MemberService, ProjectApi};
use crate::core::config::ApiConfig;
use crate::core::types::Record;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Shared HTTP plumbing: base URL, client and bearer token
struct Transport {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl Transport {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &[(&str, i64)],
    ) -> ApiResult<Value> {
        let url = self.url(path);
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("content-type", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = self.token() {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout
            } else {
                ApiError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        tracing::debug!("{} {} -> {}", method, url, status);

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if status.is_success() {
            // Some endpoints answer with plain text; that still means success
            let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
                return Err(ApiError::Rejected(error_text(error)));
            }
            return Ok(body);
        }

        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|body| body.get("error").map(error_text))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One REST collection
struct HttpCollection {
    transport: Arc<Transport>,
    path: &'static str,
    /// Whether the list endpoint accepts `project_id` / `sprint_id`
    filterable: bool,
}

#[async_trait]
impl EntityService for HttpCollection {
    async fn create(&self, fields: Record) -> ApiResult<Value> {
        self.transport
            .request(Method::POST, self.path, Some(&Value::Object(fields)), &[])
            .await
    }

    async fn get_all(&self, filters: Filters) -> ApiResult<Vec<Record>> {
        let mut query = Vec::new();
        if self.filterable {
            if let Some(project_id) = filters.project_id {
                query.push(("project_id", project_id));
            }
            if let Some(sprint_id) = filters.sprint_id {
                query.push(("sprint_id", sprint_id));
            }
        }
        let body = self
            .transport
            .request(Method::GET, self.path, None, &query)
            .await?;
        records_from(body)
    }

    async fn update(&self, id: i64, fields: Record) -> ApiResult<()> {
        let path = format!("{}/{}", self.path, id);
        self.transport
            .request(Method::PUT, &path, Some(&Value::Object(fields)), &[])
            .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> ApiResult<()> {
        let path = format!("{}/{}", self.path, id);
        self.transport
            .request(Method::DELETE, &path, None, &[])
            .await?;
        Ok(())
    }
}

struct HttpMembers {
    transport: Arc<Transport>,
}

#[derive(Serialize)]
struct Assignment<'a> {
    project_id: i64,
    user_id: i64,
    role: &'a str,
}

#[async_trait]
impl MemberService for HttpMembers {
    async fn get_all(&self) -> ApiResult<Vec<Record>> {
        let body = self
            .transport
            .request(Method::GET, "/projectmember", None, &[])
            .await?;
        records_from(body)
    }

    async fn get_by_project(&self, project_id: i64) -> ApiResult<Vec<Record>> {
        let path = format!("/projectmember/project/{}", project_id);
        let body = self.transport.request(Method::GET, &path, None, &[]).await?;
        records_from(body)
    }

    async fn assign_user(&self, project_id: i64, user_id: i64, role: &str) -> ApiResult<()> {
        let body = serde_json::to_value(Assignment {
            project_id,
            user_id,
            role,
        })
        .map_err(|e| ApiError::Decode(e.to_string()))?;
        self.transport
            .request(Method::POST, "/projectmember", Some(&body), &[])
            .await?;
        Ok(())
    }

    async fn remove_user(&self, project_id: i64, user_id: i64) -> ApiResult<()> {
        let path = format!("/projectmember/{}/{}", project_id, user_id);
        self.transport
            .request(Method::DELETE, &path, None, &[])
            .await?;
        Ok(())
    }
}

/// HTTP implementation of the collaborator API
pub struct HttpApi {
    transport: Arc<Transport>,
    projects: HttpCollection,
    sprints: HttpCollection,
    tasks: HttpCollection,
    users: HttpCollection,
    members: HttpMembers,
}

impl HttpApi {
    /// Create a client for the given settings (no network traffic yet)
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let transport = Arc::new(Transport {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        });

        let collection = |path, filterable| HttpCollection {
            transport: Arc::clone(&transport),
            path,
            filterable,
        };

        Ok(Self {
            projects: collection("/projectlist", false),
            sprints: collection("/sprintlist", true),
            tasks: collection("/tasklist", true),
            users: collection("/userlist", false),
            members: HttpMembers {
                transport: Arc::clone(&transport),
            },
            transport,
        })
    }

    /// Exchange credentials for a bearer token used by later requests
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<()> {
        let body = serde_json::json!({ "username": username, "password": password });
        let response = self
            .transport
            .request(Method::POST, "/auth/login", Some(&body), &[])
            .await?;

        let token = ["accessToken", "access_token", "token"]
            .iter()
            .find_map(|key| response.get(*key).and_then(Value::as_str))
            .ok_or_else(|| ApiError::Decode("no access token in login response".into()))?;

        *self
            .transport
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        tracing::info!("Authenticated against {}", self.transport.base_url);
        Ok(())
    }

    /// Cheap authenticated request to confirm the API is reachable
    pub async fn health_check(&self) -> bool {
        self.users.get_all(Filters::none()).await.is_ok()
    }

    pub fn is_authenticated(&self) -> bool {
        self.transport.token().is_some()
    }
}

impl ProjectApi for HttpApi {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = ApiConfig {
            base_url: "https://api.example.com/".into(),
            ..ApiConfig::default()
        };
        let api = HttpApi::new(&config).unwrap();
        assert_eq!(api.transport.base_url, "https://api.example.com");
        assert_eq!(
            api.transport.url("/projectlist"),
            "https://api.example.com/projectlist"
        );
        assert!(!api.is_authenticated());
    }

    #[test]
    fn test_error_text() {
        assert_eq!(error_text(&Value::String("boom".into())), "boom");
        assert_eq!(error_text(&serde_json::json!({"code": 3})), r#"{"code":3}"#);
    }

    #[tokio::test]
    async fn test_unreachable_api_is_transport_error() {
        let config = ApiConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..ApiConfig::default()
        };
        let api = HttpApi::new(&config).unwrap();
        let result = api.projects().get_all(Filters::none()).await;
        assert!(matches!(
            result,
            Err(ApiError::Transport(_)) | Err(ApiError::Timeout)
        ));
    }
}
