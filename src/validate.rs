//! Setup validation
//!
//! `gcp-assess validate` checks that the tools, credentials and permissions an
//! assessment needs are in place, printing one ✓/✗ block per check. Every
//! check runs even when an earlier one fails.

use crate::config::{self, CREDENTIALS_ENV, FOLDER_ENV, ORGANIZATION_ENV, PROJECT_IDS_ENV};
use crate::gcp::client::GcpCli;
use crate::gcp::projects::{active_projects, folder_number, Project, ACTIVE};
use crate::gcp::runner::CommandError;
use crate::resource::fields;
use serde_json::Value;
use std::fmt::Write as _;
use std::path::Path;

const BANNER: &str = "============================================================";
const SERVICE_ACCOUNT_DOMAIN: &str = ".iam.gserviceaccount.com";

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub success: bool,
    pub message: String,
    pub details: Vec<String>,
}

impl CheckResult {
    fn pass(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            success: true,
            message: message.into(),
            details: Vec::new(),
        }
    }

    fn fail(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::pass(name, message)
        }
    }

    fn detail(mut self, line: impl Into<String>) -> Self {
        self.details.push(line.into());
        self
    }

    fn details<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.details.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Printed block: status line, message, indented details, blank line
    pub fn render(&self) -> String {
        let mut out = String::new();
        let status = if self.success { "✓" } else { "✗" };
        let _ = writeln!(out, "{} {}", status, self.name);
        if !self.message.is_empty() {
            let _ = writeln!(out, "  {}", self.message);
        }
        for line in self.details.iter().filter(|l| !l.trim().is_empty()) {
            let _ = writeln!(out, "    {}", line);
        }
        let _ = writeln!(out);
        out
    }
}

/// Where a scope value came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Source {
    #[default]
    Environment,
    Flag,
}

/// Per-value sources of [`ValidationInputs`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputSources {
    pub organization_id: Source,
    pub folder_id: Source,
    pub project_ids: Source,
}

/// Scope and environment the checks look at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationInputs {
    pub organization_id: Option<String>,
    pub folder_id: Option<String>,
    pub project_ids: Vec<String>,
    pub credentials: Option<String>,
    pub sources: InputSources,
}

impl ValidationInputs {
    /// CLI values, falling back to the environment
    pub fn from_cli_or_env(
        organization_id: Option<String>,
        folder_id: Option<String>,
        project_ids: Option<String>,
    ) -> Self {
        Self::from_cli_or(organization_id, folder_id, project_ids, config::env_var)
    }

    /// Same as [`ValidationInputs::from_cli_or_env`], reading variables through `lookup`
    pub fn from_cli_or(
        organization_id: Option<String>,
        folder_id: Option<String>,
        project_ids: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let source = |flag: &Option<String>| {
            if flag.is_some() {
                Source::Flag
            } else {
                Source::Environment
            }
        };
        let sources = InputSources {
            organization_id: source(&organization_id),
            folder_id: source(&folder_id),
            project_ids: source(&project_ids),
        };
        Self {
            organization_id: organization_id.or_else(|| lookup(ORGANIZATION_ENV)),
            folder_id: folder_id.or_else(|| lookup(FOLDER_ENV)),
            project_ids: project_ids
                .or_else(|| lookup(PROJECT_IDS_ENV))
                .map(|raw| config::parse_project_ids(&raw))
                .unwrap_or_default(),
            credentials: lookup(CREDENTIALS_ENV),
            sources,
        }
    }
}

/// Name a value is reported under: its flag or its environment variable
fn source_label(source: Source, flag: &'static str, var: &'static str) -> &'static str {
    match source {
        Source::Flag => flag,
        Source::Environment => var,
    }
}

/// Run all checks in order, printing each block as it completes
pub async fn run_validation(cli: &GcpCli, inputs: &ValidationInputs) -> Vec<CheckResult> {
    println!("GCP Organization-Level Setup Validation");
    println!("{}", BANNER);
    println!();

    let mut results = Vec::with_capacity(7);

    println!("1. Validating gcloud CLI installation...");
    results.push(report(check_installation(cli).await));

    println!("2. Validating authentication...");
    results.push(report(check_authentication(cli).await));

    println!("3. Validating organization access...");
    results.push(report(check_organization_access(cli, inputs).await));

    println!("4. Validating project listing access...");
    results.push(report(check_project_access(cli, inputs).await));

    println!("5. Validating Compute Engine API access...");
    results.push(report(check_compute_api(cli).await));

    println!("6. Validating Cloud Monitoring API access...");
    results.push(report(check_monitoring_api(cli).await));

    println!("7. Validating environment variables...");
    results.push(report(check_environment(inputs)));

    print!("{}", render_summary(&results));
    results
}

fn report(result: CheckResult) -> CheckResult {
    print!("{}", result.render());
    if result.success {
        tracing::debug!("Check passed: {}", result.name);
    } else {
        tracing::warn!("Check failed: {}: {}", result.name, result.message);
    }
    result
}

pub fn all_passed(results: &[CheckResult]) -> bool {
    results.iter().all(|r| r.success)
}

pub async fn check_installation(cli: &GcpCli) -> CheckResult {
    const NAME: &str = "gcloud CLI Installation";
    match cli.text(&cli.gcloud(["version"])).await {
        Ok(output) => {
            let version = output
                .lines()
                .next()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or("Unknown version");
            CheckResult::pass(NAME, format!("gcloud CLI is installed: {}", version))
        }
        Err(_) => CheckResult::fail(NAME, "gcloud CLI not found. Please install Google Cloud SDK.")
            .detail("Visit: https://cloud.google.com/sdk/docs/install"),
    }
}

pub async fn check_authentication(cli: &GcpCli) -> CheckResult {
    const NAME: &str = "Authentication Status";
    let accounts = match cli.json(&cli.gcloud(["auth", "list", "--format=json"])).await {
        Ok(accounts) => accounts,
        Err(CommandError::Parse { .. }) => {
            return CheckResult::fail(NAME, "Error parsing authentication data")
        }
        Err(_) => return CheckResult::fail("Authentication Check", "Error checking authentication status"),
    };

    let active = fields::items(&accounts)
        .iter()
        .find(|account| fields::text(account, "status") == ACTIVE);
    match active {
        Some(account) => {
            let email = fields::text(account, "account");
            let kind = if email.contains('@') && email.contains(SERVICE_ACCOUNT_DOMAIN) {
                "Service Account"
            } else {
                "User Account"
            };
            CheckResult::pass(NAME, format!("Authentication configured ({})", kind))
                .detail(format!("Active account: {}", email))
        }
        None => CheckResult::fail(NAME, "No active authentication found")
            .detail("Run 'gcloud auth login' or 'gcloud auth activate-service-account'"),
    }
}

pub async fn check_organization_access(cli: &GcpCli, inputs: &ValidationInputs) -> CheckResult {
    const NAME: &str = "Organization Access";
    let orgs = match cli.json(&cli.gcloud(["organizations", "list", "--format=json"])).await {
        Ok(orgs) => orgs,
        Err(CommandError::Parse { .. }) => {
            return CheckResult::fail(NAME, "Error parsing organization data")
        }
        Err(_) => {
            return CheckResult::fail(NAME, "Cannot list organizations. Check IAM permissions.")
                .detail("Required role: roles/resourcemanager.organizationViewer")
        }
    };

    let orgs = fields::items(&orgs);
    if orgs.is_empty() {
        return CheckResult::fail(NAME, "No accessible organizations found")
            .detail("Verify organization-level IAM permissions");
    }

    let listing: Vec<String> = orgs
        .iter()
        .map(|org| {
            format!(
                "- {} (ID: {})",
                fields::text(org, "name"),
                fields::text(org, "organizationId")
            )
        })
        .collect();

    match &inputs.organization_id {
        Some(target) => {
            match orgs
                .iter()
                .find(|org| fields::text(org, "organizationId") == *target)
            {
                Some(org) => CheckResult::pass(
                    NAME,
                    format!("Target organization accessible: {}", fields::text(org, "name")),
                )
                .detail(format!("Organization ID: {}", target)),
                None => CheckResult::fail(NAME, format!("Target organization {} not accessible", target))
                    .detail("Available organizations:")
                    .details(listing),
            }
        }
        None => CheckResult::pass(NAME, format!("Access to {} organization(s)", orgs.len()))
            .detail("Available organizations:")
            .details(listing),
    }
}

pub async fn check_project_access(cli: &GcpCli, inputs: &ValidationInputs) -> CheckResult {
    if !inputs.project_ids.is_empty() {
        return check_specific_projects(cli, &inputs.project_ids).await;
    }

    const NAME: &str = "Project Listing";
    let (filter, scope) = match (&inputs.organization_id, &inputs.folder_id) {
        (Some(org), _) => (Some(format!("--filter=parent.id={}", org)), format!("organization {}", org)),
        (None, Some(folder)) => (
            Some(format!("--filter=parent.id={}", folder_number(folder))),
            format!("folder {}", folder),
        ),
        (None, None) => (None, "all accessible projects".to_string()),
    };

    let mut args = vec!["projects".to_string(), "list".to_string(), "--format=json".to_string()];
    args.extend(filter);
    let listing = match cli.json(&cli.gcloud(args)).await {
        Ok(listing) => listing,
        Err(CommandError::Parse { .. }) => return CheckResult::fail(NAME, "Error parsing project data"),
        Err(_) => {
            return CheckResult::fail(NAME, format!("Cannot list projects for {}", scope))
                .detail("Check resourcemanager.projects.list permission")
        }
    };

    let projects = active_projects(&listing);
    if projects.is_empty() {
        return CheckResult::pass(NAME, format!("No active projects found in {}", scope))
            .detail("This may be expected if the organization/folder is empty");
    }

    let mut summary: Vec<String> = projects.iter().take(5).map(project_line).collect();
    if projects.len() > 5 {
        summary.push(format!("... and {} more projects", projects.len() - 5));
    }
    CheckResult::pass(
        NAME,
        format!("Access to {} active project(s) in {}", projects.len(), scope),
    )
    .details(summary)
}

async fn check_specific_projects(cli: &GcpCli, project_ids: &[String]) -> CheckResult {
    const NAME: &str = "Project Access";
    let mut accessible = Vec::new();
    for id in project_ids {
        let described = cli
            .json(&cli.gcloud(["projects", "describe", id.as_str(), "--format=json"]))
            .await;
        if let Ok(value) = described {
            let project = Project::from(&value);
            if value.is_object() && project.is_active() {
                accessible.push(project);
            }
        }
    }

    if accessible.is_empty() {
        return CheckResult::fail(
            NAME,
            format!("No access to specified projects: {}", project_ids.join(", ")),
        );
    }
    CheckResult::pass(
        NAME,
        format!(
            "Access to {}/{} specified projects",
            accessible.len(),
            project_ids.len()
        ),
    )
    .details(accessible.iter().map(project_line))
}

fn project_line(project: &Project) -> String {
    format!("- {} ({})", project.project_id, project.name)
}

/// First project `projects list --limit=1` returns
async fn sample_project(cli: &GcpCli) -> Result<String, &'static str> {
    let listing = cli
        .json(&cli.gcloud(["projects", "list", "--limit=1", "--format=json"]))
        .await
        .map_err(|_| "Cannot get test project")?;
    fields::items(&listing)
        .first()
        .and_then(|p| fields::lookup(p, "projectId"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or("No projects available")
}

/// Map an API failure's output onto a short diagnosis
pub fn api_failure_message(
    output: &str,
    not_enabled: &'static str,
    denied: &'static str,
    fallback: &'static str,
) -> &'static str {
    if output.contains("API has not been used") {
        not_enabled
    } else if output.contains("Permission denied") || output.contains("PERMISSION_DENIED") {
        denied
    } else {
        fallback
    }
}

pub async fn check_compute_api(cli: &GcpCli) -> CheckResult {
    const NAME: &str = "Compute API Access";
    let project = match sample_project(cli).await {
        Ok(project) => project,
        Err(reason) => return CheckResult::fail(NAME, format!("{} for API validation", reason)),
    };

    let probe = cli
        .gcloud([
            "compute".to_string(),
            "instances".to_string(),
            "list".to_string(),
            format!("--project={}", project),
            "--format=json".to_string(),
            "--limit=1".to_string(),
        ]);
    match cli.text(&probe).await {
        Ok(_) => CheckResult::pass(NAME, "Compute Engine API access verified")
            .detail(format!("Test project: {}", project)),
        Err(e) => CheckResult::fail(
            NAME,
            api_failure_message(
                e.detail().unwrap_or_default(),
                "Compute Engine API not enabled",
                "Insufficient IAM permissions",
                "API access denied or not enabled",
            ),
        )
        .detail(format!("Test project: {}", project))
        .detail("Required role: roles/compute.viewer"),
    }
}

pub async fn check_monitoring_api(cli: &GcpCli) -> CheckResult {
    const NAME: &str = "Monitoring API Access";
    let project = match sample_project(cli).await {
        Ok(project) => project,
        Err(reason) => {
            return CheckResult::fail(NAME, format!("{} for monitoring validation", reason))
        }
    };

    let probe = cli
        .gcloud([
            "monitoring".to_string(),
            "metrics".to_string(),
            "list".to_string(),
            format!("--project={}", project),
            "--limit=1".to_string(),
            "--format=json".to_string(),
        ]);
    match cli.text(&probe).await {
        Ok(_) => CheckResult::pass(NAME, "Cloud Monitoring API access verified")
            .detail(format!("Test project: {}", project)),
        Err(e) => CheckResult::fail(
            NAME,
            api_failure_message(
                e.detail().unwrap_or_default(),
                "Cloud Monitoring API not enabled",
                "Insufficient monitoring permissions",
                "Monitoring API access denied or not enabled",
            ),
        )
        .detail(format!("Test project: {}", project))
        .detail("Required role: roles/monitoring.viewer"),
    }
}

/// Report which variables are set; informational, always passes
pub fn check_environment(inputs: &ValidationInputs) -> CheckResult {
    let mut status = Vec::new();

    match &inputs.credentials {
        Some(path) if Path::new(path).exists() => {
            status.push(format!("✓ {} set and file exists", CREDENTIALS_ENV))
        }
        Some(_) => status.push(format!("✗ {} set but file not found", CREDENTIALS_ENV)),
        None => status.push(format!("- {} not set (using gcloud auth)", CREDENTIALS_ENV)),
    }

    let sources = &inputs.sources;
    for (source, flag, var, value) in [
        (sources.organization_id, "--org-id", ORGANIZATION_ENV, &inputs.organization_id),
        (sources.folder_id, "--folder-id", FOLDER_ENV, &inputs.folder_id),
    ] {
        match value {
            Some(value) => status.push(format!("✓ {}: {}", source_label(source, flag, var), value)),
            None => status.push(format!("- {} not set", var)),
        }
    }

    if inputs.project_ids.is_empty() {
        status.push(format!("- {} not set", PROJECT_IDS_ENV));
    } else {
        status.push(format!(
            "✓ {}: {} project(s)",
            source_label(sources.project_ids, "--project-ids", PROJECT_IDS_ENV),
            inputs.project_ids.len()
        ));
        for id in inputs.project_ids.iter().take(3) {
            status.push(format!("  - {}", id));
        }
        if inputs.project_ids.len() > 3 {
            status.push(format!("  ... and {} more", inputs.project_ids.len() - 3));
        }
    }

    CheckResult::pass("Environment Variables", "Environment variable status:").details(status)
}

/// Closing summary: pass count, failed checks, recommendations
pub fn render_summary(results: &[CheckResult]) -> String {
    let mut out = String::new();
    let passed = results.iter().filter(|r| r.success).count();

    let _ = writeln!(out, "{}", BANNER);
    let _ = writeln!(out, "VALIDATION SUMMARY");
    let _ = writeln!(out, "{}", BANNER);
    let _ = writeln!(out, "Tests passed: {}/{}", passed, results.len());
    let _ = writeln!(out);

    let failed: Vec<_> = results.iter().filter(|r| !r.success).collect();
    if !failed.is_empty() {
        let _ = writeln!(out, "FAILED TESTS:");
        for result in &failed {
            let _ = writeln!(out, "✗ {}: {}", result.name, result.message);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "RECOMMENDATIONS:");
    if failed.is_empty() {
        let _ = writeln!(out, "✓ All validations passed! You can run the organization assessment.");
        let _ = writeln!(out, "  Command: gcp-assess all --org-id YOUR_ORG_ID");
    } else {
        let _ = writeln!(out, "Please address the failed validations before running the assessment:");
        let _ = writeln!(out, "1. Ensure proper IAM roles are assigned");
        let _ = writeln!(out, "2. Enable required APIs in your projects");
        let _ = writeln!(out, "3. Verify authentication setup");
    }
    let _ = writeln!(out, "{}", BANNER);
    out
}
