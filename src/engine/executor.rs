//! Batch execution - runs operations in order, chaining references
//!
//! A failed operation never aborts the batch. Its reference stays unbound and
//! later operations that use it see `null`.

use crate::api::ProjectApi;
use crate::core::config::Config;
use crate::core::error::{SprintdeskError, Result};
use crate::engine::handlers::query::{run_query, QueryOutcome, QuerySubject, Target};
use crate::engine::handlers::{dispatch, HandlerContext, HandlerError};
use crate::engine::narrative::{KeywordClassifier, QueryClassifier};
use crate::engine::operation::{BatchOutcome, ExecutionResult, Operation, OperationKind};
use crate::engine::references::{resolve_data, ReferenceTable};
use crate::engine::schedule::{apply_schedule, compute_schedule, PlannedTask};
use crate::engine::summary::summarize;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Executes operation batches and answers status queries against one API
///
/// Holds no per-batch state, so one engine can serve concurrent batches.
#[derive(Clone)]
pub struct Engine {
    api: Arc<dyn ProjectApi>,
    config: Config,
    classifier: Arc<dyn QueryClassifier>,
}

impl Engine {
    pub fn new(api: Arc<dyn ProjectApi>, config: Config) -> Self {
        Self {
            api,
            config,
            classifier: Arc::new(KeywordClassifier),
        }
    }

    /// Replace the default keyword classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn QueryClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn api(&self) -> &dyn ProjectApi {
        self.api.as_ref()
    }

    fn context(&self, now: DateTime<Utc>) -> HandlerContext<'_> {
        HandlerContext {
            api: self.api.as_ref(),
            config: &self.config,
            classifier: self.classifier.as_ref(),
            now,
        }
    }

    pub async fn execute(&self, batch: &[Operation]) -> BatchOutcome {
        self.execute_at(batch, Utc::now()).await
    }

    /// Execute with an explicit "now" for defaults and schedule dates
    pub async fn execute_at(&self, batch: &[Operation], now: DateTime<Utc>) -> BatchOutcome {
        tracing::info!("Executing batch of {} operations", batch.len());

        let ctx = self.context(now);
        let mut table = ReferenceTable::new();
        let mut results = Vec::with_capacity(batch.len());
        let mut planned = Vec::new();
        let mut project_ref: Option<&str> = None;

        for (index, op) in batch.iter().enumerate() {
            let data = resolve_data(&op.data, &table);
            let result = match dispatch(&ctx, &op.kind, &data).await {
                Ok(result) => result,
                Err(e) => ExecutionResult::failure(e.to_string()),
            };

            if result.success {
                tracing::info!("[{}/{}] {} succeeded", index + 1, batch.len(), op.kind);
                if let (Some(name), Some(snapshot)) = (&op.reference, &result.data) {
                    table.bind(name.clone(), snapshot.clone());
                }
                match op.kind {
                    OperationKind::CreateProject if op.reference.is_some() => {
                        project_ref = op.reference.as_deref();
                    }
                    // raw data keeps the `$sprint` token that names the bucket
                    OperationKind::CreateTask => planned.push(PlannedTask::from_operation_data(
                        &op.data,
                        &self.config.schedule.default_sprint_ref,
                    )),
                    _ => {}
                }
            } else {
                tracing::warn!(
                    "[{}/{}] {} failed: {}",
                    index + 1,
                    batch.len(),
                    op.kind,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        if !planned.is_empty() {
            match project_ref {
                Some(project_ref) => {
                    let schedule = compute_schedule(&planned, now, &self.config.schedule);
                    let updated =
                        apply_schedule(self.api.as_ref(), &table, project_ref, &schedule).await;
                    tracing::info!(
                        "Schedule inferred for {} tasks; {} entities dated (project ends {})",
                        planned.len(),
                        updated,
                        schedule.project.end_date
                    );
                }
                None => tracing::debug!("No project created in batch; dates left untouched"),
            }
        }

        let summary_text = summarize(&results, self.config.engine.max_reported_failures);
        let outcome = BatchOutcome {
            results,
            summary_text,
        };
        tracing::info!(
            "Batch finished: {} succeeded, {} failed",
            outcome.succeeded(),
            outcome.failed()
        );
        outcome
    }

    /// Answer a free-text question about a project, sprint, task or everything
    ///
    /// `name_or_id` is an id when it parses as an integer, a name otherwise.
    pub async fn query(
        &self,
        entity_type: &str,
        name_or_id: &str,
        question: &str,
    ) -> Result<QueryOutcome> {
        let subject = QuerySubject::parse(entity_type)
            .ok_or_else(|| SprintdeskError::UnsupportedSubject(entity_type.to_string()))?;
        let target = Target::from_text(name_or_id);
        let ctx = self.context(Utc::now());
        run_query(&ctx, subject, &target, question)
            .await
            .map_err(|e| match e {
                HandlerError::NotFound { entity, term, .. } => SprintdeskError::EntityNotFound {
                    entity: entity.label(),
                    term,
                },
                HandlerError::Api(api) => SprintdeskError::Api(api),
                HandlerError::Validation(message) => SprintdeskError::UnsupportedSubject(message),
            })
    }
}
