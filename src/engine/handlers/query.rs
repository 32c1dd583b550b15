//! Status queries: subject lookup, subtree fetch, stats and narrative

use super::{HandlerContext, HandlerError, HandlerResult};
use crate::api::Filters;
use crate::core::types::{as_id, id_display, is_present, non_empty_str, EntityKind, Record};
use crate::engine::matcher::find_by_name;
use crate::engine::narrative::render;
use crate::engine::operation::{ExecutionResult, ResultType};
use crate::engine::stats::{general_stats, project_stats, sprint_stats, task_stats, StatsSnapshot};
use ahash::AHashSet;
use serde::Serialize;
use serde_json::json;

/// What a query is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySubject {
    Project,
    Sprint,
    Task,
    General,
}

impl QuerySubject {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "project" => Some(Self::Project),
            "sprint" => Some(Self::Sprint),
            "task" => Some(Self::Task),
            "general" | "all" => Some(Self::General),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Sprint => "sprint",
            Self::Task => "task",
            Self::General => "general",
        }
    }

    fn kind(&self) -> Option<EntityKind> {
        match self {
            Self::Project => Some(EntityKind::Project),
            Self::Sprint => Some(EntityKind::Sprint),
            Self::Task => Some(EntityKind::Task),
            Self::General => None,
        }
    }
}

/// How the subject is named
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Id(i64),
    Name(String),
    Unspecified,
}

impl Target {
    /// Integers are ids, anything else non-blank is a name
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            Self::Unspecified
        } else if let Ok(id) = text.parse() {
            Self::Id(id)
        } else {
            Self::Name(text.to_string())
        }
    }
}

/// Stats plus the rendered answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub stats: StatsSnapshot,
    pub narrative: String,
}

async fn locate(
    ctx: &HandlerContext<'_>,
    kind: EntityKind,
    target: &Target,
) -> Result<Record, HandlerError> {
    let service = ctx.api.service(kind);
    match target {
        Target::Id(id) => service
            .get_by_id(*id)
            .await?
            .ok_or_else(|| HandlerError::not_found(kind, id.to_string())),
        Target::Name(name) => {
            let candidates = service.get_all(Filters::none()).await?;
            find_by_name(&candidates, kind, name)
                .map(|found| found.record.clone())
                .ok_or_else(|| HandlerError::not_found(kind, name.clone()))
        }
        Target::Unspecified => Err(HandlerError::validation(format!(
            "entity_name or entity_id required for {} queries",
            kind.label().to_lowercase()
        ))),
    }
}

/// Parent record named by `key`, if it exists
async fn parent(
    ctx: &HandlerContext<'_>,
    kind: EntityKind,
    record: &Record,
    key: &str,
) -> Result<Option<Record>, HandlerError> {
    match record.get(key).and_then(as_id) {
        Some(id) => Ok(ctx.api.service(kind).get_by_id(id).await?),
        None => Ok(None),
    }
}

/// Look the subject up, fetch its subtree and answer `question`
pub async fn run_query(
    ctx: &HandlerContext<'_>,
    subject: QuerySubject,
    target: &Target,
    question: &str,
) -> Result<QueryOutcome, HandlerError> {
    let (stats, tasks) = match subject.kind() {
        Some(EntityKind::Project) => {
            let project = locate(ctx, EntityKind::Project, target).await?;
            match project.get("id").and_then(as_id) {
                Some(project_id) => {
                    let sprints = ctx.api.sprints().get_all(Filters::project(project_id)).await?;
                    let sprint_ids: AHashSet<i64> = sprints
                        .iter()
                        .filter_map(|s| s.get("id").and_then(as_id))
                        .collect();
                    // tasks may carry only a sprint_id
                    let tasks: Vec<Record> = ctx
                        .api
                        .tasks()
                        .get_all(Filters::none())
                        .await?
                        .into_iter()
                        .filter(|t| {
                            t.get("project_id").and_then(as_id) == Some(project_id)
                                || t.get("sprint_id")
                                    .and_then(as_id)
                                    .map_or(false, |id| sprint_ids.contains(&id))
                        })
                        .collect();
                    let members = ctx.api.members().get_by_project(project_id).await?;
                    let stats = project_stats(&project, &sprints, &tasks, &members);
                    (StatsSnapshot::Project(stats), tasks)
                }
                None => (StatsSnapshot::Project(project_stats(&project, &[], &[], &[])), Vec::new()),
            }
        }
        Some(EntityKind::Sprint) => {
            let sprint = locate(ctx, EntityKind::Sprint, target).await?;
            let project = parent(ctx, EntityKind::Project, &sprint, "project_id").await?;
            let tasks = match sprint.get("id").and_then(as_id) {
                Some(sprint_id) => ctx.api.tasks().get_all(Filters::sprint(None, sprint_id)).await?,
                None => Vec::new(),
            };
            let stats = sprint_stats(&sprint, project.as_ref(), &tasks, ctx.now);
            (StatsSnapshot::Sprint(stats), tasks)
        }
        Some(_) => {
            let task = locate(ctx, EntityKind::Task, target).await?;
            let project = parent(ctx, EntityKind::Project, &task, "project_id").await?;
            let sprint = parent(ctx, EntityKind::Sprint, &task, "sprint_id").await?;
            let stats = task_stats(&task, project.as_ref(), sprint.as_ref());
            (StatsSnapshot::Task(stats), vec![task])
        }
        None => {
            let projects = ctx.api.projects().get_all(Filters::none()).await?;
            let sprints = ctx.api.sprints().get_all(Filters::none()).await?;
            let tasks = ctx.api.tasks().get_all(Filters::none()).await?;
            let users = ctx.api.users().get_all(Filters::none()).await?;
            let stats = general_stats(&projects, &sprints, &tasks, &users);
            (StatsSnapshot::General(stats), tasks)
        }
    };

    let intent = ctx.classifier.classify(question);
    tracing::debug!("Query '{}' on {} classified as {:?}", question, stats.subject(), intent);
    let narrative = render(intent, &stats, &tasks);
    Ok(QueryOutcome { stats, narrative })
}

/// QUERY_STATUS operation
pub async fn query_status(ctx: &HandlerContext<'_>, data: &Record) -> HandlerResult {
    let question = non_empty_str(data, "query").unwrap_or_default();
    let entity_type = non_empty_str(data, "entity_type").unwrap_or("project");
    let subject = QuerySubject::parse(entity_type).ok_or_else(|| {
        HandlerError::validation(format!("Unsupported entity_type: {}", entity_type))
    })?;

    let target = if is_present(data, "entity_id") {
        data.get("entity_id")
            .map(|id| Target::from_text(&id_display(id)))
            .unwrap_or(Target::Unspecified)
    } else {
        Target::from_text(non_empty_str(data, "entity_name").unwrap_or_default())
    };

    tracing::info!("Answering '{}' about {} {:?}", question, subject.as_str(), target);
    let outcome = run_query(ctx, subject, &target, question).await?;
    let entity_name = match &target {
        Target::Name(name) => json!(name),
        Target::Id(id) => json!(id),
        Target::Unspecified => json!(null),
    };

    Ok(ExecutionResult::ok(
        ResultType::QueryResponse,
        json!({
            "query": question,
            "entity_type": subject.as_str(),
            "entity_name": entity_name,
            "analysis": outcome.narrative,
            "stats": outcome.stats,
        }),
    ))
}
