//! Multi-domain orchestration
//!
//! `gcp-assess all` re-invokes the current executable once per requested
//! domain, sequentially or all at once, and writes a plain-text summary of
//! how each child fared.

use crate::gcp::runner::{CommandError, CommandRunner, Invocation};
use crate::resource::Domain;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::fmt::Write as _;
use std::path::Path;
use std::time::{Duration, Instant};

pub const DEFAULT_SUMMARY_REPORT: &str = "gcp_assessment_summary.txt";
pub const DEFAULT_DOMAIN_TIMEOUT_SECS: u64 = 3600;

/// File patterns listed at the end of the summary report
const GENERATED_FILE_PATTERNS: &[&str] = &[
    "gcp_compute_inventory_*.csv",
    "gcp_compute_utilization_*.csv",
    "gcp_networking_*_*.csv",
    "gcp_storage_*_*.csv",
    "gcp_gke_*_*.csv",
    "*.log (assessment logs)",
];

/// Flags forwarded to every domain child
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildArgs {
    pub organization_id: Option<String>,
    pub folder_id: Option<String>,
    pub project_ids: Option<String>,
    pub max_workers: Option<usize>,
    pub log_level: Option<String>,
    pub request_delay_ms: Option<u64>,
    pub command_timeout: Option<u64>,
}

impl ChildArgs {
    /// `<domain> <scope flag> --output-prefix gcp_<domain> <common flags>`
    pub fn for_domain(&self, domain: Domain) -> Vec<String> {
        let mut args = vec![domain.name().to_string()];

        // At most one scope flag, organization first
        if let Some(org) = &self.organization_id {
            args.extend(["--org-id".to_string(), org.clone()]);
        } else if let Some(folder) = &self.folder_id {
            args.extend(["--folder-id".to_string(), folder.clone()]);
        } else if let Some(ids) = &self.project_ids {
            args.extend(["--project-ids".to_string(), ids.clone()]);
        }

        args.extend(["--output-prefix".to_string(), domain.default_prefix()]);

        if let Some(workers) = self.max_workers {
            args.extend(["--max-workers".to_string(), workers.to_string()]);
        }
        if let Some(level) = &self.log_level {
            args.extend(["--log-level".to_string(), level.clone()]);
        }
        if let Some(delay) = self.request_delay_ms {
            args.extend(["--request-delay-ms".to_string(), delay.to_string()]);
        }
        if let Some(timeout) = self.command_timeout {
            args.extend(["--command-timeout".to_string(), timeout.to_string()]);
        }
        args
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Executable re-invoked for each domain
    pub program: String,
    pub services: Vec<Domain>,
    pub child: ChildArgs,
    pub parallel: bool,
    /// Per-domain limit; the child is killed when it runs over
    pub timeout: Duration,
}

/// How one domain child finished
#[derive(Debug, Clone, PartialEq)]
pub struct DomainOutcome {
    pub domain: Domain,
    pub duration: Duration,
    /// Captured stdout on success, error description on failure
    pub result: std::result::Result<String, String>,
}

impl DomainOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub outcomes: Vec<DomainOutcome>,
    pub total_duration: Duration,
}

impl RunSummary {
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.success_count() == self.outcomes.len()
    }
}

/// Run every requested domain as a child process. Outcomes follow the
/// requested order in both modes.
pub async fn run_all(runner: &dyn CommandRunner, options: &OrchestratorOptions) -> RunSummary {
    tracing::info!("Starting GCP Master Assessment");
    tracing::info!(
        "Services to assess: {}",
        options
            .services
            .iter()
            .map(|d| d.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    tracing::info!(
        "Execution mode: {}",
        if options.parallel { "Parallel" } else { "Sequential" }
    );

    let started = Instant::now();
    let outcomes = if options.parallel {
        join_all(
            options
                .services
                .iter()
                .map(|domain| run_domain(runner, options, *domain)),
        )
        .await
    } else {
        let mut outcomes = Vec::with_capacity(options.services.len());
        for domain in &options.services {
            let outcome = run_domain(runner, options, *domain).await;
            if !outcome.succeeded() {
                tracing::warn!(
                    "{} assessment failed, continuing with next service...",
                    domain.name().to_uppercase()
                );
            }
            outcomes.push(outcome);
        }
        outcomes
    };

    RunSummary {
        outcomes,
        total_duration: started.elapsed(),
    }
}

async fn run_domain(
    runner: &dyn CommandRunner,
    options: &OrchestratorOptions,
    domain: Domain,
) -> DomainOutcome {
    let label = domain.name().to_uppercase();
    let invocation = Invocation::new(options.program.as_str())
        .args(options.child.for_domain(domain))
        .timeout(Some(options.timeout));

    tracing::info!("Starting {} assessment...", label);
    let started = Instant::now();
    let result = runner.run(&invocation).await;
    let duration = started.elapsed();

    let result = match result {
        Ok(stdout) => {
            tracing::info!(
                "{} assessment completed successfully in {:.2} seconds",
                label,
                duration.as_secs_f64()
            );
            Ok(stdout)
        }
        Err(e) => {
            let error = failure_description(&e);
            tracing::error!("{} assessment failed: {}", label, error);
            Err(error)
        }
    };

    DomainOutcome {
        domain,
        duration,
        result,
    }
}

/// Short error text for the summary report
pub fn failure_description(error: &CommandError) -> String {
    match error {
        CommandError::Timeout { after, .. } => format!("Timeout after {} seconds", after.as_secs()),
        CommandError::Failed { code, stderr, .. } => match code {
            Some(code) => format!("Exit code {}: {}", code, stderr),
            None => format!("Terminated by signal: {}", stderr),
        },
        other => other.to_string(),
    }
}

/// Report text: per-domain status in canonical domain order, then totals and
/// the generated file patterns
pub fn render_summary(summary: &RunSummary, generated_at: &DateTime<Utc>) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "GCP MASTER ASSESSMENT SUMMARY REPORT");
    let _ = writeln!(report, "{}", "=".repeat(50));
    let _ = writeln!(
        report,
        "Assessment Date: {}",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(
        report,
        "Total Duration: {:.2} seconds",
        summary.total_duration.as_secs_f64()
    );
    let _ = writeln!(report);

    let mut successful = Vec::new();
    let mut failed = Vec::new();
    for domain in Domain::ALL {
        let Some(outcome) = summary.outcomes.iter().find(|o| o.domain == domain) else {
            continue;
        };
        let label = domain.name().to_uppercase();
        match &outcome.result {
            Ok(_) => {
                let _ = writeln!(report, "{} Assessment: SUCCESS", label);
                let _ = writeln!(
                    report,
                    "  Duration: {:.2} seconds",
                    outcome.duration.as_secs_f64()
                );
                successful.push(domain.name());
            }
            Err(error) => {
                let _ = writeln!(report, "{} Assessment: FAILED", label);
                let _ = writeln!(report, "  Error: {}", error);
                failed.push(domain.name());
            }
        }
        let _ = writeln!(report);
    }

    let _ = writeln!(report, "SUMMARY");
    let _ = writeln!(report, "{}", "-".repeat(20));
    let _ = writeln!(
        report,
        "Successful assessments: {}/{}",
        successful.len(),
        summary.outcomes.len()
    );
    let _ = writeln!(report, "Successful services: {}", successful.join(", "));
    if !failed.is_empty() {
        let _ = writeln!(report, "Failed services: {}", failed.join(", "));
    }

    let _ = writeln!(report);
    let _ = writeln!(report, "GENERATED FILES");
    let _ = writeln!(report, "{}", "-".repeat(20));
    let _ = writeln!(
        report,
        "Check the current directory for the following file patterns:"
    );
    for pattern in GENERATED_FILE_PATTERNS {
        let _ = writeln!(report, "- {}", pattern);
    }
    report
}

pub fn write_summary(path: &Path, report: &str) -> Result<()> {
    std::fs::write(path, report)
        .with_context(|| format!("writing summary report {}", path.display()))?;
    tracing::info!("Summary report generated: {}", path.display());
    Ok(())
}

/// Closing banner logged by the master run
pub fn log_completion(summary: &RunSummary, report_path: &Path) {
    tracing::info!("{}", "=".repeat(60));
    tracing::info!("GCP MASTER ASSESSMENT COMPLETED");
    tracing::info!(
        "Successful assessments: {}/{}",
        summary.success_count(),
        summary.outcomes.len()
    );
    tracing::info!(
        "Total duration: {:.2} seconds",
        summary.total_duration.as_secs_f64()
    );
    tracing::info!("Summary report: {}", report_path.display());
    tracing::info!("{}", "=".repeat(60));
}
