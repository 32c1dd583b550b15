//! Project membership operations

use super::{HandlerContext, HandlerError, HandlerResult};
use crate::api::Filters;
use crate::core::types::{as_id, id_display, is_present, non_empty_str, EntityKind, Record};
use crate::engine::matcher::find_by_name;
use crate::engine::operation::{ExecutionResult, ResultType};
use ahash::AHashMap;
use rand::seq::SliceRandom;
use serde_json::{json, Value};

const DEFAULT_ROLE: &str = "member";
const DEFAULT_AUTO_ASSIGN_COUNT: usize = 2;

/// Resolve a project or user named by `<id_key>` or `<name_key>`
async fn resolve_party(
    ctx: &HandlerContext<'_>,
    kind: EntityKind,
    data: &Record,
    name_key: &str,
) -> Result<i64, HandlerError> {
    let id_key = kind.id_key();
    if is_present(data, id_key) {
        return data.get(id_key).and_then(as_id).ok_or_else(|| {
            HandlerError::validation(format!("Invalid {}", id_key))
        });
    }

    let Some(term) = non_empty_str(data, name_key) else {
        return Err(HandlerError::validation(format!(
            "{} or {} is required",
            id_key, name_key
        )));
    };

    let candidates = ctx.api.service(kind).get_all(Filters::none()).await?;
    if let Some(id) = find_by_name(&candidates, kind, term).and_then(|m| m.record.get("id").and_then(as_id)) {
        return Ok(id);
    }

    // users get a short list of who does exist
    let listed = if kind == EntityKind::User {
        candidates
            .iter()
            .take(ctx.config.engine.max_listed_candidates)
            .map(|user| {
                let id = user.get("id").map(id_display).unwrap_or_default();
                format!("{} (ID: {})", kind.display_name(user), id)
            })
            .collect()
    } else {
        Vec::new()
    };
    Err(HandlerError::NotFound {
        entity: kind,
        term: term.to_string(),
        candidates: listed,
    })
}

/// Display name of an entity by id, falling back to `<Label> <id>`
async fn display_name(ctx: &HandlerContext<'_>, kind: EntityKind, id: i64) -> String {
    match ctx.api.service(kind).get_by_id(id).await {
        Ok(Some(record)) => kind.display_name(&record),
        _ => format!("{} {}", kind.label(), id),
    }
}

pub async fn assign(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let project_id = resolve_party(ctx, EntityKind::Project, data, "project_name").await?;
    let user_id = resolve_party(ctx, EntityKind::User, data, "user_name").await?;
    let role = non_empty_str(data, "role").unwrap_or(DEFAULT_ROLE);

    let user_name = display_name(ctx, EntityKind::User, user_id).await;
    let project_name = display_name(ctx, EntityKind::Project, project_id).await;

    tracing::info!("Assigning {} to {} as {}", user_name, project_name, role);
    ctx.api.members().assign_user(project_id, user_id, role).await?;

    Ok(ExecutionResult::ok(
        ResultType::UserAssigned,
        json!({
            "user_id": user_id,
            "project_id": project_id,
            "user_name": user_name,
            "project_name": project_name,
            "role": role,
            "assigned": true,
        }),
    ))
}

pub async fn remove(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let project_id = resolve_party(ctx, EntityKind::Project, data, "project_name").await?;
    let user_id = resolve_party(ctx, EntityKind::User, data, "user_name").await?;

    let user_name = display_name(ctx, EntityKind::User, user_id).await;
    let project_name = display_name(ctx, EntityKind::Project, project_id).await;

    tracing::info!("Removing {} from {}", user_name, project_name);
    ctx.api.members().remove_user(project_id, user_id).await?;

    Ok(ExecutionResult::ok(
        ResultType::UserRemoved,
        json!({
            "user_id": user_id,
            "project_id": project_id,
            "user_name": user_name,
            "project_name": project_name,
            "removed": true,
        }),
    ))
}

/// Members of a project, each with `user_details` when the user exists
pub async fn list(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let project_id = resolve_party(ctx, EntityKind::Project, data, "project_name").await?;
    let members = ctx.api.members().get_by_project(project_id).await?;
    let users = ctx.api.users().get_all(Filters::none()).await?;
    let by_id: AHashMap<i64, &Record> = users
        .iter()
        .filter_map(|user| user.get("id").and_then(as_id).map(|id| (id, user)))
        .collect();

    let enriched: Vec<Value> = members
        .into_iter()
        .map(|mut member| {
            let user = member
                .get("user_id")
                .and_then(as_id)
                .and_then(|id| by_id.get(&id));
            if let Some(user) = user {
                member.insert("user_details".into(), Value::Object((*user).clone()));
            }
            Value::Object(member)
        })
        .collect();

    Ok(ExecutionResult::ok(ResultType::ProjectMembers, Value::Array(enriched)))
}

/// How AUTO_ASSIGN_USERS picks among available users
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignCriteria {
    Random,
    ByRole,
    LeastBusy,
}

impl AssignCriteria {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "random" => Some(Self::Random),
            "by_role" | "role" => Some(Self::ByRole),
            "least_busy" => Some(Self::LeastBusy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::ByRole => "by_role",
            Self::LeastBusy => "least_busy",
        }
    }
}

fn is_active(user: &Record) -> bool {
    user.get("active").and_then(Value::as_bool).unwrap_or(true)
}

fn is_developer(user: &Record) -> bool {
    non_empty_str(user, "role")
        .map(|role| role.to_lowercase().contains("developer"))
        .unwrap_or(false)
}

/// Pick up to `count` users according to `criteria`
///
/// `memberships` counts current project memberships per user id.
pub fn select_users<'a>(
    available: Vec<&'a Record>,
    count: usize,
    criteria: AssignCriteria,
    memberships: &AHashMap<i64, usize>,
) -> Vec<&'a Record> {
    match criteria {
        AssignCriteria::Random => available
            .choose_multiple(&mut rand::thread_rng(), count)
            .copied()
            .collect(),
        AssignCriteria::ByRole => {
            let (mut chosen, others): (Vec<_>, Vec<_>) =
                available.into_iter().partition(|user| is_developer(user));
            chosen.extend(others);
            chosen.truncate(count);
            chosen
        }
        AssignCriteria::LeastBusy => {
            let mut sorted = available;
            sorted.sort_by_key(|user| {
                user.get("id")
                    .and_then(as_id)
                    .and_then(|id| memberships.get(&id).copied())
                    .unwrap_or(0)
            });
            sorted.truncate(count);
            sorted
        }
    }
}

pub async fn auto_assign(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let project_id = resolve_party(ctx, EntityKind::Project, data, "project_name").await?;
    let count = ["count", "num_users"]
        .iter()
        .find_map(|key| data.get(*key).and_then(as_id))
        .filter(|n| *n > 0)
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_AUTO_ASSIGN_COUNT);
    let criteria_text = non_empty_str(data, "criteria").unwrap_or("random");
    let criteria = AssignCriteria::parse(criteria_text).ok_or_else(|| {
        HandlerError::validation(format!(
            "Unknown criteria '{}' (expected random, by_role or least_busy)",
            criteria_text
        ))
    })?;

    tracing::info!(
        "Auto-assigning {} users to project {} ({})",
        count,
        project_id,
        criteria.as_str()
    );

    let users = ctx.api.users().get_all(Filters::none()).await?;
    let active: Vec<&Record> = users.iter().filter(|user| is_active(user)).collect();
    if active.is_empty() {
        return Err(HandlerError::validation("No active users available for assignment"));
    }

    let current = ctx.api.members().get_by_project(project_id).await?;
    let current_ids: Vec<i64> = current
        .iter()
        .filter_map(|m| m.get("user_id").and_then(as_id))
        .collect();
    let available: Vec<&Record> = active
        .into_iter()
        .filter(|user| {
            user.get("id")
                .and_then(as_id)
                .map_or(false, |id| !current_ids.contains(&id))
        })
        .collect();
    if available.is_empty() {
        return Err(HandlerError::validation(
            "All active users are already assigned to this project",
        ));
    }

    let mut memberships: AHashMap<i64, usize> = AHashMap::new();
    if criteria == AssignCriteria::LeastBusy {
        for row in ctx.api.members().get_all().await? {
            if let Some(user_id) = row.get("user_id").and_then(as_id) {
                *memberships.entry(user_id).or_insert(0) += 1;
            }
        }
    }

    let mut assignments = Vec::new();
    for user in select_users(available, count, criteria, &memberships) {
        let Some(user_id) = user.get("id").and_then(as_id) else {
            continue;
        };
        match ctx
            .api
            .members()
            .assign_user(project_id, user_id, DEFAULT_ROLE)
            .await
        {
            Ok(()) => assignments.push(json!({
                "user_id": user_id,
                "user_name": EntityKind::User.display_name(user),
                "assigned": true,
            })),
            Err(e) => tracing::warn!("Could not assign user {}: {}", user_id, e),
        }
    }

    let assigned_any = !assignments.is_empty();
    let payload = json!({
        "project_id": project_id,
        "actual_count": assignments.len(),
        "assignments": assignments,
        "criteria": criteria.as_str(),
        "requested_count": count,
    });
    if !assigned_any {
        return Ok(ExecutionResult::failure_with(
            ResultType::AutoAssignment,
            payload,
            "No users could be assigned",
        ));
    }
    Ok(ExecutionResult::ok(ResultType::AutoAssignment, payload))
}
