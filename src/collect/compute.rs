//! Compute Engine collector
//!
//! One inventory record per instance and one utilization record per RUNNING
//! instance. Machine type and disk details need a `describe` call each.

use super::os_image::{os_from_boot_disk, OsInfo};
use super::{CollectContext, Collector};
use crate::gcp::projects::Project;
use crate::resource::fields::{self, NOT_AVAILABLE};
use crate::resource::{Assessment, Domain, Record};
use anyhow::{anyhow, bail, Result};
use futures::future::BoxFuture;
use serde_json::Value;

pub const INVENTORY: &str = "compute-inventory";
pub const UTILIZATION: &str = "compute-utilization";

/// Columns without a metrics source yet
const METRIC_COLUMNS: &[&str] = &["cpu_avg_30d", "cpu_max_30d", "memory_avg_30d", "memory_max_30d"];

pub struct ComputeCollector;

impl Collector for ComputeCollector {
    fn domain(&self) -> Domain {
        Domain::Compute
    }

    fn preflight<'a>(&'a self, ctx: &'a CollectContext) -> BoxFuture<'a, Result<()>> {
        Box::pin(validate_access(ctx))
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a CollectContext,
        project: &'a Project,
    ) -> BoxFuture<'a, Result<Assessment>> {
        Box::pin(collect_project(ctx, project))
    }
}

/// Require an active gcloud account and, when set, a readable organization
pub async fn validate_access(ctx: &CollectContext) -> Result<()> {
    tracing::info!("Validating access and authentication...");
    let cli = &ctx.cli;

    let accounts = cli.query(&cli.gcloud(["auth", "list", "--format=json"])).await;
    let accounts = fields::items(&accounts);
    if accounts.is_empty() {
        bail!("No authentication found. Please run 'gcloud auth login' or set up service account.");
    }

    let active = accounts
        .iter()
        .find(|account| fields::text(account, "status") == "ACTIVE")
        .ok_or_else(|| anyhow!("No active authentication found."))?;
    tracing::info!("Authenticated as: {}", fields::text(active, "account"));

    if let Some(org) = &ctx.organization_id {
        let details = cli
            .query(&cli.gcloud(["organizations", "describe", org.as_str(), "--format=json"]))
            .await;
        if !details.is_object() {
            bail!("Cannot access organization {}", org);
        }
        tracing::info!(
            "Organization access verified: {}",
            fields::text_or(&details, "displayName", org)
        );
    }

    Ok(())
}

async fn collect_project(ctx: &CollectContext, project: &Project) -> Result<Assessment> {
    let cli = &ctx.cli;
    let project_id = project.project_id.as_str();
    let mut assessment = Assessment::new();

    tracing::info!("Processing project: {}", project_id);
    let response = cli
        .query(&cli.gcloud([
            "compute".to_string(),
            "instances".to_string(),
            "list".to_string(),
            format!("--project={}", project_id),
            "--format=json".to_string(),
        ]))
        .await;
    cli.pause().await;

    let instances = fields::items(&response);
    if instances.is_empty() {
        tracing::info!("No instances found in project {}", project_id);
        return Ok(assessment);
    }
    tracing::info!("Found {} instances in {}", instances.len(), project_id);

    for instance in instances {
        match instance_records(ctx, project, instance).await {
            Ok((inventory, utilization)) => {
                assessment.push(INVENTORY, inventory);
                if let Some(utilization) = utilization {
                    assessment.push(UTILIZATION, utilization);
                }
            }
            Err(e) => tracing::error!(
                "Error processing instance {} in {}: {:#}",
                fields::text_or(instance, "name", "unknown"),
                project_id,
                e
            ),
        }
    }

    tracing::info!(
        "Completed project {}: {} instances, {} utilization records",
        project_id,
        assessment.count(INVENTORY),
        assessment.count(UTILIZATION)
    );
    Ok(assessment)
}

async fn instance_records(
    ctx: &CollectContext,
    project: &Project,
    instance: &Value,
) -> Result<(Record, Option<Record>)> {
    let name = fields::required_str(instance, "name")?;
    let zone = fields::short_name(fields::required_str(instance, "zone")?);
    let status = fields::required_str(instance, "status")?;
    let machine_type_url = fields::required_str(instance, "machineType")?;
    let region = region_of(zone);

    tracing::debug!("Processing instance: {} in {}", name, project.project_id);

    let machine = machine_spec(ctx, &project.project_id, machine_type_url).await;
    let disks = disk_summary(ctx, &project.project_id, instance).await;
    let os = match &disks.boot {
        Some(boot) => os_from_boot_disk(&boot.payload),
        None => {
            tracing::warn!("No boot disk found for instance {}", name);
            OsInfo::default()
        }
    };

    let service_accounts: Vec<Value> = fields::lookup(instance, "serviceAccounts")
        .and_then(Value::as_array)
        .map(|accounts| {
            accounts
                .iter()
                .map(|sa| Value::String(fields::text_or(sa, "email", "")))
                .collect()
        })
        .unwrap_or_default();

    let inventory = ctx
        .base_record(project)
        .with("project_number", project.project_number.as_str())
        .with("instance_name", name)
        .with("zone", zone)
        .with("region", region)
        .with("status", status)
        .with("machine_type", machine.machine_type)
        .with("vcpus", machine.vcpus)
        .with("memory_gb", machine.memory_gb)
        .with("total_storage_gb", disks.total_storage_gb.to_string())
        .with("disk_count", disks.disk_count.to_string())
        .with("storage_types", disks.storage_types_label())
        .with(
            "boot_disk_type",
            disks.boot.as_ref().map_or(NOT_AVAILABLE, |b| b.disk_type.as_str()),
        )
        .with(
            "boot_disk_size_gb",
            disks
                .boot
                .as_ref()
                .map_or_else(|| NOT_AVAILABLE.to_string(), |b| b.size_gb.to_string()),
        )
        .with("internal_ip", fields::text(instance, "networkInterfaces.0.networkIP"))
        .with(
            "external_ip",
            fields::text(instance, "networkInterfaces.0.accessConfigs.0.natIP"),
        )
        .with("os_family", os.family)
        .with("os_version", os.version)
        .with("os_architecture", os.architecture)
        .with("boot_disk_image", os.image)
        .with("runtime_hours_30d", NOT_AVAILABLE)
        .with("uptime_percentage_30d", NOT_AVAILABLE)
        .with("creation_timestamp", fields::text(instance, "creationTimestamp"))
        .with("labels", fields::json_object(instance, "labels"))
        .with("tags", fields::json_array(instance, "tags.items"))
        .with("service_accounts", fields::json_text(&Value::Array(service_accounts)))
        .with("preemptible", fields::flag(instance, "scheduling.preemptible"))
        .with("deletion_protection", fields::flag(instance, "deletionProtection"));

    let utilization = (status == "RUNNING").then(|| {
        let mut record = ctx
            .base_record(project)
            .with("instance_name", name)
            .with("zone", zone)
            .with("region", region)
            .with("data_collection_date", ctx.timestamp());
        for column in METRIC_COLUMNS {
            record.set(column, NOT_AVAILABLE);
        }
        record
    });

    Ok((inventory, utilization))
}

/// `us-central1-a` -> `us-central1`
pub fn region_of(zone: &str) -> &str {
    zone.rsplit_once('-').map_or(zone, |(region, _)| region)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineSpec {
    pub machine_type: String,
    pub vcpus: String,
    pub memory_gb: String,
}

/// vCPU and memory of a machine type; `N/A` when it cannot be described
async fn machine_spec(ctx: &CollectContext, project_id: &str, machine_type_url: &str) -> MachineSpec {
    let machine_type = fields::short_name(machine_type_url).to_string();
    let mut spec = MachineSpec {
        machine_type: machine_type.clone(),
        vcpus: NOT_AVAILABLE.to_string(),
        memory_gb: NOT_AVAILABLE.to_string(),
    };

    let Some(zone) = fields::url_segment(machine_type_url, 2) else {
        tracing::error!("Error parsing machine type {}: no zone in URL", machine_type_url);
        return spec;
    };

    let cli = &ctx.cli;
    let details = cli
        .query(&cli.gcloud([
            "compute".to_string(),
            "machine-types".to_string(),
            "describe".to_string(),
            machine_type,
            format!("--zone={}", zone),
            format!("--project={}", project_id),
            "--format=json".to_string(),
        ]))
        .await;

    if details.is_object() {
        spec.vcpus = fields::text(&details, "guestCpus");
        if let Some(memory_mb) = fields::integer(&details, "memoryMb").filter(|mb| *mb != 0) {
            spec.memory_gb = fields::format_float(fields::round_to(memory_mb as f64 / 1024.0, 2));
        }
    }
    spec
}

#[derive(Debug, Clone)]
pub struct BootDisk {
    pub disk_type: String,
    pub size_gb: i64,
    /// Full `disks describe` payload, reused for OS detection
    pub payload: Value,
}

#[derive(Debug, Clone, Default)]
pub struct DiskSummary {
    pub total_storage_gb: i64,
    pub disk_count: usize,
    /// Distinct disk types, first-seen order
    pub storage_types: Vec<String>,
    pub boot: Option<BootDisk>,
}

impl DiskSummary {
    pub fn storage_types_label(&self) -> String {
        if self.storage_types.is_empty() {
            NOT_AVAILABLE.to_string()
        } else {
            self.storage_types.join(",")
        }
    }

    /// Fold one described disk into the summary
    pub fn add(&mut self, attached: &Value, details: Value) {
        let size_gb = fields::integer(&details, "sizeGb").unwrap_or(0);
        let disk_type = fields::short_name(&fields::text(&details, "type")).to_string();

        self.total_storage_gb += size_gb;
        self.disk_count += 1;
        if !self.storage_types.contains(&disk_type) {
            self.storage_types.push(disk_type.clone());
        }

        let is_boot = fields::lookup(attached, "boot")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if is_boot && self.boot.is_none() {
            self.boot = Some(BootDisk {
                disk_type,
                size_gb,
                payload: details,
            });
        }
    }
}

/// Describe each attached disk once
async fn disk_summary(ctx: &CollectContext, project_id: &str, instance: &Value) -> DiskSummary {
    let cli = &ctx.cli;
    let mut summary = DiskSummary::default();

    let attached = fields::lookup(instance, "disks")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for disk in attached {
        let source = fields::text_or(disk, "source", "unknown");
        let (name, zone) = match disk_location(disk) {
            Ok(location) => location,
            Err(e) => {
                tracing::error!("Error getting disk info for {}: {:#}", source, e);
                continue;
            }
        };

        let details = cli
            .query(&cli.gcloud([
                "compute".to_string(),
                "disks".to_string(),
                "describe".to_string(),
                name.to_string(),
                format!("--zone={}", zone),
                format!("--project={}", project_id),
                "--format=json".to_string(),
            ]))
            .await;
        if details.is_object() {
            summary.add(disk, details);
        }
        cli.pause().await;
    }

    summary
}

/// Disk name and zone from an attached disk's `source` URL
fn disk_location(disk: &Value) -> Result<(&str, &str)> {
    let source = fields::required_str(disk, "source")?;
    let zone = fields::url_segment(source, 2)
        .ok_or_else(|| anyhow!("unexpected disk source URL '{}'", source))?;
    Ok((fields::short_name(source), zone))
}
