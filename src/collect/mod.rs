//! Per-project collectors and the parallel dispatcher
//!
//! A [`Collector`] turns one project into an [`Assessment`] for its domain.
//! [`dispatch`] runs a per-project worker over all resolved projects with a
//! bounded number in flight and merges the results in submission order.
//!
//! # Module Structure
//!
//! - [`compute`] - VM inventory and utilization
//! - [`networking`] - VPCs, subnets, firewall rules, load balancers, NAT, VPN, DNS
//! - [`storage`] - Buckets and bucket usage
//! - [`gke`] - Clusters, node pools and in-cluster workloads
//! - [`os_image`] - OS detection from boot disk images

pub mod compute;
pub mod gke;
pub mod networking;
pub mod os_image;
pub mod storage;

use crate::gcp::client::GcpCli;
use crate::gcp::projects::Project;
use crate::resource::fields::NOT_AVAILABLE;
use crate::resource::{Assessment, Domain, Record};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;

/// Shared, read-only state for every collector call of one run
pub struct CollectContext {
    pub cli: GcpCli,
    /// Stamped into every record; `N/A` when the run is not organization-scoped
    pub organization_id: Option<String>,
    pub collected_at: DateTime<Utc>,
}

impl CollectContext {
    pub fn new(cli: GcpCli, organization_id: Option<String>) -> Self {
        Self {
            cli,
            organization_id,
            collected_at: Utc::now(),
        }
    }

    pub fn organization(&self) -> &str {
        self.organization_id.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    /// Run timestamp as written into date columns
    pub fn timestamp(&self) -> String {
        self.collected_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }

    /// Record pre-filled with the identifier columns every resource type starts with
    pub fn base_record(&self, project: &Project) -> Record {
        Record::new()
            .with("organization_id", self.organization())
            .with("project_id", project.project_id.as_str())
            .with("project_name", project.name.as_str())
    }
}

/// Collects one domain's resources for one project
pub trait Collector: Send + Sync {
    fn domain(&self) -> Domain;

    /// Checks run once before any project is collected
    fn preflight<'a>(&'a self, _ctx: &'a CollectContext) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a CollectContext,
        project: &'a Project,
    ) -> BoxFuture<'a, Result<Assessment>>;
}

/// Collector for a domain
pub fn collector_for(domain: Domain) -> Arc<dyn Collector> {
    match domain {
        Domain::Compute => Arc::new(compute::ComputeCollector),
        Domain::Networking => Arc::new(networking::NetworkingCollector),
        Domain::Storage => Arc::new(storage::StorageCollector),
        Domain::Gke => Arc::new(gke::GkeCollector),
    }
}

/// Run `worker` once per project with at most `max_workers` in flight.
///
/// Each worker runs as its own task and only returns its result; merging
/// happens here, in project order. A worker that fails or panics is logged
/// with its project id and contributes nothing.
pub async fn dispatch<F, Fut>(projects: Vec<Project>, max_workers: usize, worker: F) -> Assessment
where
    F: Fn(Project) -> Fut,
    Fut: Future<Output = Result<Assessment>> + Send + 'static,
{
    let total = projects.len();
    let mut slots: Vec<Option<Assessment>> = (0..total).map(|_| None).collect();

    let mut completions = stream::iter(projects.into_iter().enumerate())
        .map(|(index, project)| {
            let project_id = project.project_id.clone();
            let handle = tokio::spawn(worker(project));
            async move { (index, project_id, handle.await) }
        })
        .buffer_unordered(max_workers.max(1));

    let mut done = 0usize;
    while let Some((index, project_id, outcome)) = completions.next().await {
        done += 1;
        match outcome {
            Ok(Ok(assessment)) => {
                tracing::info!(
                    "Completed project {} ({}/{}): {} records",
                    project_id,
                    done,
                    total,
                    assessment.total()
                );
                slots[index] = Some(assessment);
            }
            Ok(Err(e)) => tracing::error!("Error processing project {}: {:#}", project_id, e),
            Err(e) => tracing::error!("Error processing project {}: worker aborted: {}", project_id, e),
        }
    }

    let mut merged = Assessment::new();
    for assessment in slots.into_iter().flatten() {
        merged.merge(assessment);
    }
    merged
}

/// [`dispatch`] with a domain collector as the worker
pub async fn dispatch_collector(
    collector: Arc<dyn Collector>,
    ctx: Arc<CollectContext>,
    projects: Vec<Project>,
    max_workers: usize,
) -> Assessment {
    dispatch(projects, max_workers, move |project| {
        let collector = Arc::clone(&collector);
        let ctx = Arc::clone(&ctx);
        async move { collector.collect(&ctx, &project).await }
    })
    .await
}
