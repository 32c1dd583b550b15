//! User operations

use super::{delete_entity, FieldRule, HandlerContext, HandlerResult, UpdateSpec};
use crate::api::Filters;
use crate::core::types::{non_empty_str, EntityKind, Record};
use crate::engine::operation::{ExecutionResult, ResultType};
use serde_json::json;

const LOOKUP_KEYS: &[&str] = &["username", "user_name", "full_name"];

pub const UPDATE: UpdateSpec = UpdateSpec {
    kind: EntityKind::User,
    result_type: ResultType::UserUpdated,
    lookup_keys: LOOKUP_KEYS,
    rename: Some(("new_username", "username")),
    fields: &[
        ("username", FieldRule::Text),
        ("email", FieldRule::Text),
        ("full_name", FieldRule::Text),
        ("password_hash", FieldRule::Text),
        ("work_mode", FieldRule::Uppercase),
        ("phone", FieldRule::Text),
        ("role", FieldRule::Text),
        ("active", FieldRule::Flag),
    ],
};

pub async fn list(ctx: &HandlerContext<'_>) -> HandlerResult {
    let users = ctx.api.users().get_all(Filters::none()).await?;
    Ok(ExecutionResult::ok(ResultType::Users, json!(users)))
}

pub async fn delete(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let (id, before) = delete_entity(ctx, EntityKind::User, data, LOOKUP_KEYS).await?;
    let before = before.unwrap_or_default();
    let username = non_empty_str(&before, "username")
        .map(str::to_string)
        .unwrap_or_else(|| format!("user_{}", id));
    let full_name = non_empty_str(&before, "full_name")
        .map(str::to_string)
        .unwrap_or_else(|| username.clone());

    Ok(ExecutionResult::ok(
        ResultType::UserDeleted,
        json!({
            "id": id,
            "username": username,
            "full_name": full_name,
            "deleted": true,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::super::testing::{config, ctx, data};
    use super::super::update_entity;
    use super::*;
    use crate::api::MemoryApi;

    #[tokio::test]
    async fn test_update_user_work_mode_and_flag() {
        let api = MemoryApi::new();
        let config = config();
        MemoryApi::seed_json(
            &api.users,
            json!({"id": 1, "username": "alopez", "full_name": "Ana Lopez", "work_mode": "REMOTE", "active": true}),
        );

        let result = update_entity(
            &ctx(&api, &config),
            &UPDATE,
            &data(json!({"user_name": "Ana Lopez", "work_mode": "hybrid", "active": false})),
        )
        .await
        .unwrap();

        let payload = result.record().unwrap();
        assert_eq!(payload["username"], json!("alopez"));
        assert_eq!(payload["full_name"], json!("Ana Lopez"));
        assert_eq!(payload["updated_fields"], json!(["work_mode", "active"]));

        let stored = api.users.row(1).unwrap();
        assert_eq!(stored["work_mode"], json!("HYBRID"));
        assert_eq!(stored["active"], json!(false));
    }

    #[tokio::test]
    async fn test_delete_user_by_username() {
        let api = MemoryApi::new();
        let config = config();
        MemoryApi::seed_json(&api.users, json!({"id": 6, "username": "bchen", "full_name": "Bo Chen"}));

        let result = delete(&ctx(&api, &config), &data(json!({"username": "bchen"})))
            .await
            .unwrap();
        assert_eq!(
            result.data,
            Some(json!({"id": 6, "username": "bchen", "full_name": "Bo Chen", "deleted": true}))
        );
        assert!(api.users.is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_user() {
        let api = MemoryApi::new();
        let config = config();
        let err = delete(&ctx(&api, &config), &data(json!({"username": "ghost"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User 'ghost' not found");
    }
}
