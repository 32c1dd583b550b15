//! Workspace context for translation prompts
//!
//! Lists the projects, sprints and users that already exist so the model
//! can use real ids instead of inventing names.

use crate::api::{Filters, ProjectApi};
use crate::core::error::Result;
use crate::core::types::{id_display, EntityKind, Record};
use std::fmt::Write;

/// Entries of each kind included in a prompt
const MAX_LISTED: usize = 20;

/// An existing entity the user might mention
#[derive(Debug, Clone, PartialEq)]
pub struct KnownEntity {
    pub id: String,
    pub name: String,
    /// Owning project id, for sprints
    pub project_id: Option<String>,
}

impl KnownEntity {
    fn from_record(kind: EntityKind, record: &Record) -> Self {
        Self {
            id: record.get("id").map(id_display).unwrap_or_default(),
            name: kind.display_name(record),
            project_id: record.get("project_id").map(id_display),
        }
    }
}

/// Snapshot of the workspace handed to the translator
#[derive(Debug, Clone, Default)]
pub struct WorkspaceContext {
    /// Project the conversation is focused on, if any
    pub current_project: Option<KnownEntity>,
    pub projects: Vec<KnownEntity>,
    pub sprints: Vec<KnownEntity>,
    pub users: Vec<KnownEntity>,
}

impl WorkspaceContext {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read the current workspace from the API
    pub async fn from_api(api: &dyn ProjectApi) -> Result<Self> {
        let listed = |kind: EntityKind, records: Vec<Record>| -> Vec<KnownEntity> {
            records
                .iter()
                .take(MAX_LISTED)
                .map(|r| KnownEntity::from_record(kind, r))
                .collect()
        };

        let projects = api.projects().get_all(Filters::none()).await?;
        let sprints = api.sprints().get_all(Filters::none()).await?;
        let users = api.users().get_all(Filters::none()).await?;

        Ok(Self {
            current_project: None,
            projects: listed(EntityKind::Project, projects),
            sprints: listed(EntityKind::Sprint, sprints),
            users: listed(EntityKind::User, users),
        })
    }

    /// Focus the context on one project, if it is known
    pub fn focus(&mut self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.current_project = self
            .projects
            .iter()
            .find(|p| p.name.to_lowercase() == name)
            .cloned();
        self.current_project.is_some()
    }

    /// Text block for the prompt
    pub fn summary(&self) -> String {
        let mut s = String::new();

        if let Some(project) = &self.current_project {
            let _ = writeln!(s, "Current project: {} (ID: {})", project.name, project.id);
        }

        if !self.projects.is_empty() {
            s.push_str("\nAVAILABLE PROJECTS:\n");
            for p in &self.projects {
                let _ = writeln!(s, "- {} (ID: {})", p.name, p.id);
            }
        }

        if !self.sprints.is_empty() {
            s.push_str("\nAVAILABLE SPRINTS:\n");
            for sprint in &self.sprints {
                let project = sprint.project_id.as_deref().unwrap_or("N/A");
                let _ = writeln!(s, "- {} (ID: {}, Project: {})", sprint.name, sprint.id, project);
            }
        }

        if !self.users.is_empty() {
            s.push_str("\nUSERS:\n");
            for u in &self.users {
                let _ = writeln!(s, "- {} (ID: {})", u.name, u.id);
            }
        }

        if s.is_empty() {
            s.push_str("The workspace is empty.\n");
        }
        s
    }
}
