//! GCP Projects
//!
//! Scope resolution: turns an organization, folder, or explicit project list
//! into the ordered set of ACTIVE projects an assessment walks.

use super::client::GcpCli;
use crate::config::{self, FOLDER_ENV, ORGANIZATION_ENV};
use serde_json::Value;
use std::fmt;

/// Lifecycle state of projects that get assessed
pub const ACTIVE: &str = "ACTIVE";

/// Project information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub project_number: String,
    pub lifecycle_state: String,
}

impl Project {
    pub fn is_active(&self) -> bool {
        self.lifecycle_state == ACTIVE
    }
}

impl From<&Value> for Project {
    fn from(value: &Value) -> Self {
        let field = |key: &str, default: &str| {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or(default)
                .to_string()
        };
        Self {
            project_id: field("projectId", "-"),
            name: field("name", "-"),
            project_number: field("projectNumber", "-"),
            lifecycle_state: field("lifecycleState", "UNKNOWN"),
        }
    }
}

/// Scope flags as given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFlags {
    pub organization_id: Option<String>,
    pub folder_id: Option<String>,
    pub project_ids: Option<String>,
}

impl ScopeFlags {
    pub fn is_empty(&self) -> bool {
        self.organization_id.is_none() && self.folder_id.is_none() && self.project_ids.is_none()
    }

    /// The flags, or the environment's organization and folder when no flag is set
    pub fn or_env(self) -> Self {
        self.or_env_with(config::env_var)
    }

    /// Same as [`ScopeFlags::or_env`], reading variables through `lookup`.
    /// Any flag disables the fallback; project ids never come from the environment.
    pub fn or_env_with(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if !self.is_empty() {
            return self;
        }
        Self {
            organization_id: lookup(ORGANIZATION_ENV),
            folder_id: lookup(FOLDER_ENV),
            project_ids: None,
        }
    }

    pub fn scope(&self) -> Scope {
        Scope::from_parts(
            self.organization_id.clone(),
            self.folder_id.clone(),
            self.project_ids
                .as_deref()
                .map(config::parse_project_ids)
                .unwrap_or_default(),
        )
    }
}

/// Which projects an assessment covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Projects(Vec<String>),
    Folder(String),
    Organization(String),
    All,
}

impl Scope {
    /// Pick the scope from whichever inputs are present.
    /// Explicit projects win over a folder, a folder over an organization.
    pub fn from_parts(
        organization_id: Option<String>,
        folder_id: Option<String>,
        project_ids: Vec<String>,
    ) -> Self {
        if !project_ids.is_empty() {
            Scope::Projects(project_ids)
        } else if let Some(folder) = folder_id {
            Scope::Folder(folder)
        } else if let Some(org) = organization_id {
            Scope::Organization(org)
        } else {
            Scope::All
        }
    }

    /// Scope level used in the "Starting ... assessment" banner
    pub fn level(&self) -> &'static str {
        match self {
            Scope::Projects(_) => "Project-Level",
            Scope::Folder(_) => "Folder-Level",
            Scope::Organization(_) => "Organization-Level",
            Scope::All => "Multi-Project",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Projects(ids) if ids.len() == 1 => write!(f, "project '{}'", ids[0]),
            Scope::Projects(ids) => write!(f, "{} specific projects", ids.len()),
            Scope::Folder(id) => write!(f, "folder '{}'", id),
            Scope::Organization(id) => write!(f, "organization '{}'", id),
            Scope::All => write!(f, "all accessible projects"),
        }
    }
}

/// Numeric folder id, accepting the `folders/<n>` form
pub fn folder_number(folder_id: &str) -> &str {
    folder_id.strip_prefix("folders/").unwrap_or(folder_id)
}

/// Resolve a scope into ACTIVE projects, in listing order
pub async fn resolve_projects(cli: &GcpCli, scope: &Scope) -> Vec<Project> {
    let projects = match scope {
        Scope::Projects(ids) => {
            tracing::info!("Getting details for {} specific projects", ids.len());
            let mut projects = Vec::with_capacity(ids.len());
            for id in ids {
                match describe_project(cli, id).await {
                    Some(project) if project.is_active() => projects.push(project),
                    _ => tracing::warn!("Project {} not found or not active", id),
                }
            }
            projects
        }
        Scope::Folder(folder) => {
            list_projects(cli, Some(&format!("parent.id={}", folder_number(folder)))).await
        }
        Scope::Organization(org) => list_projects(cli, Some(&format!("parent.id={}", org))).await,
        Scope::All => {
            tracing::warn!(
                "No organization, folder, or specific projects specified, using all accessible projects"
            );
            list_projects(cli, None).await
        }
    };

    tracing::info!("Found {} active projects", projects.len());
    projects
}

/// List ACTIVE projects, optionally filtered (`--filter=<filter>`)
pub async fn list_projects(cli: &GcpCli, filter: Option<&str>) -> Vec<Project> {
    let mut args = vec!["projects".to_string(), "list".to_string()];
    if let Some(filter) = filter {
        args.push(format!("--filter={}", filter));
    }
    args.push("--format=json".to_string());

    let response = cli.query(&cli.gcloud(args)).await;
    active_projects(&response)
}

/// Describe one project; `None` if the call failed or returned nothing
pub async fn describe_project(cli: &GcpCli, project_id: &str) -> Option<Project> {
    let response = cli
        .query(&cli.gcloud(["projects", "describe", project_id, "--format=json"]))
        .await;
    response.is_object().then(|| Project::from(&response))
}

/// Keep only ACTIVE entries of a `projects list` response
pub fn active_projects(response: &Value) -> Vec<Project> {
    response
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(Project::from)
                .filter(Project::is_active)
                .collect()
        })
        .unwrap_or_default()
}
