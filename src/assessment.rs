//! Single-domain assessment pipeline
//!
//! Preflight, scope resolution, parallel collection, CSV export, then a
//! summary banner in the log.

use crate::collect::{collector_for, dispatch_collector, CollectContext};
use crate::export::{export_assessment, ExportTarget};
use crate::gcp::client::GcpCli;
use crate::gcp::projects::{resolve_projects, Scope};
use crate::resource::fields::NOT_AVAILABLE;
use crate::resource::{Assessment, Domain};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

const BANNER: &str = "============================================================";

/// Everything one domain run needs besides the CLI client
#[derive(Debug, Clone)]
pub struct AssessmentOptions {
    pub domain: Domain,
    pub scope: Scope,
    /// Stamped into records and checked by the compute preflight
    pub organization_id: Option<String>,
    pub max_workers: usize,
    pub target: ExportTarget,
}

/// Outcome of a successful domain run
#[derive(Debug)]
pub struct AssessmentReport {
    pub projects: usize,
    pub assessment: Assessment,
    pub files: Vec<PathBuf>,
}

/// Run one domain end to end. Fails on a preflight failure, an empty project
/// set, or an export error; per-project failures are only logged.
pub async fn run_assessment(cli: GcpCli, options: AssessmentOptions) -> Result<AssessmentReport> {
    let domain = options.domain;
    tracing::info!("Starting GCP {} Assessment", domain.title());

    let ctx = Arc::new(CollectContext::new(cli, options.organization_id.clone()));
    let collector = collector_for(domain);
    collector
        .preflight(&ctx)
        .await
        .context("Access validation failed. Please check prerequisites.")?;

    let projects = resolve_projects(&ctx.cli, &options.scope).await;
    if projects.is_empty() {
        bail!("No projects found or accessible");
    }
    let project_count = projects.len();
    tracing::info!(
        "Starting {} assessment of {} projects in {}",
        options.scope.level(),
        project_count,
        options.scope
    );

    let assessment = dispatch_collector(
        collector,
        Arc::clone(&ctx),
        projects,
        options.max_workers,
    )
    .await;

    tracing::info!("Exporting assessment results...");
    let files = export_assessment(domain, &assessment, &options.target, &ctx.collected_at)?;

    for line in summary_lines(domain, &options.scope, project_count, &assessment) {
        tracing::info!("{}", line);
    }

    Ok(AssessmentReport {
        projects: project_count,
        assessment,
        files,
    })
}

/// End-of-run banner, with domain-specific totals
pub fn summary_lines(
    domain: Domain,
    scope: &Scope,
    projects: usize,
    assessment: &Assessment,
) -> Vec<String> {
    let mut lines = vec![
        BANNER.to_string(),
        format!("{} ASSESSMENT COMPLETED", domain.title().to_uppercase()),
        format!("Assessment scope: {}", scope),
        format!("Projects processed: {}", projects),
    ];

    match domain {
        Domain::Compute => {
            lines.push(format!(
                "Total instances found: {}",
                assessment.count("compute-inventory")
            ));
            lines.push(format!(
                "Running instances with utilization data: {}",
                assessment.count("compute-utilization")
            ));
        }
        Domain::Networking => {
            for (key, label) in [
                ("vpcs", "VPCs"),
                ("subnets", "Subnets"),
                ("firewall_rules", "Firewall rules"),
                ("load_balancers", "Load balancers"),
                ("nat_gateways", "NAT gateways"),
                ("vpn_gateways", "VPN gateways"),
                ("dns_zones", "DNS zones"),
            ] {
                lines.push(format!("{} found: {}", label, assessment.count(key)));
            }
        }
        Domain::Storage => {
            let usage = assessment.records("bucket_usage");
            let total_gb: f64 = usage
                .iter()
                .filter_map(|r| r.get("total_size_gb")?.parse::<f64>().ok())
                .sum();
            let total_objects: u64 = usage
                .iter()
                .filter_map(|r| r.get("object_count")?.parse::<u64>().ok())
                .sum();
            lines.push(format!("Total buckets found: {}", assessment.count("buckets")));
            lines.push(format!(
                "Total storage size: {:.2} GB ({:.2} TB)",
                total_gb,
                total_gb / 1024.0
            ));
            lines.push(format!("Total objects: {}", group_thousands(total_objects)));
        }
        Domain::Gke => {
            let clusters = assessment.records("clusters");
            let numeric = |column: &str| {
                clusters
                    .iter()
                    .filter_map(|r| r.get(column))
                    .filter(|v| *v != NOT_AVAILABLE)
                    .filter_map(|v| v.parse::<f64>().ok())
                    .sum::<f64>()
            };
            lines.push(format!("Total clusters found: {}", clusters.len()));
            lines.push(format!(
                "Total node pools found: {}",
                assessment.count("node_pools")
            ));
            lines.push(format!("Total workloads found: {}", assessment.count("workloads")));
            lines.push(format!("Total nodes: {}", numeric("node_count") as i64));
            lines.push(format!("Total vCPUs: {}", numeric("total_vcpus") as i64));
            lines.push(format!("Total memory: {:.2} GB", numeric("total_memory_gb")));
        }
    }

    lines.push(BANNER.to_string());
    lines
}

/// `1234567` as `1,234,567`
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
