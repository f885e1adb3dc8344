//! GKE collector
//!
//! Clusters and node pools come from `gcloud container`. Workloads need
//! cluster credentials: `get-credentials` writes them into a kubeconfig that
//! belongs to this one cluster visit, and `kubectl` reads it from there, so
//! concurrent workers never share a kubeconfig.

use super::{CollectContext, Collector};
use crate::gcp::projects::Project;
use crate::gcp::runner::CommandError;
use crate::resource::fields::{self, NOT_AVAILABLE};
use crate::resource::{Assessment, Domain, Record};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde_json::Value;

/// Kubernetes kinds listed per cluster, with the singular used in records
const WORKLOAD_KINDS: &[(&str, &str)] = &[
    ("deployments", "deployment"),
    ("services", "service"),
    ("pods", "pod"),
];

/// vCPUs and memory (GB) of common node machine types; unknown types count as zero
const MACHINE_SPECS: &[(&str, u32, f64)] = &[
    ("e2-micro", 1, 1.0),
    ("e2-small", 1, 2.0),
    ("e2-medium", 1, 4.0),
    ("e2-standard-2", 2, 8.0),
    ("e2-standard-4", 4, 16.0),
    ("e2-standard-8", 8, 32.0),
    ("n1-standard-1", 1, 3.75),
    ("n1-standard-2", 2, 7.5),
    ("n1-standard-4", 4, 15.0),
    ("n1-standard-8", 8, 30.0),
    ("n1-standard-16", 16, 60.0),
    ("n2-standard-2", 2, 8.0),
    ("n2-standard-4", 4, 16.0),
    ("n2-standard-8", 8, 32.0),
    ("n2-standard-16", 16, 64.0),
];

pub fn machine_type_specs(machine_type: &str) -> (u32, f64) {
    MACHINE_SPECS
        .iter()
        .find(|(name, _, _)| *name == machine_type)
        .map_or((0, 0.0), |(_, vcpus, memory)| (*vcpus, *memory))
}

pub struct GkeCollector;

impl Collector for GkeCollector {
    fn domain(&self) -> Domain {
        Domain::Gke
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a CollectContext,
        project: &'a Project,
    ) -> BoxFuture<'a, Result<Assessment>> {
        Box::pin(collect_project(ctx, project))
    }
}

async fn collect_project(ctx: &CollectContext, project: &Project) -> Result<Assessment> {
    let cli = &ctx.cli;
    let project_id = project.project_id.as_str();
    tracing::info!("Assessing GKE for project: {}", project_id);

    let response = cli
        .query(&cli.gcloud([
            "container".to_string(),
            "clusters".to_string(),
            "list".to_string(),
            format!("--project={}", project_id),
            "--format=json".to_string(),
        ]))
        .await;

    let mut assessment = Assessment::new();
    let mut located = Vec::new();
    for cluster in fields::items(&response) {
        let name = fields::text(cluster, "name");
        let location = fields::text(cluster, "location");
        let details = cluster_details(ctx, project_id, &name, &location).await;
        assessment.push("clusters", cluster_record(ctx, project, cluster, &details));
        located.push((name, location));
    }
    cli.pause().await;

    for (name, location) in &located {
        let pools = cli
            .query(&cli.gcloud([
                "container".to_string(),
                "node-pools".to_string(),
                "list".to_string(),
                format!("--cluster={}", name),
                format!("--location={}", location),
                format!("--project={}", project_id),
                "--format=json".to_string(),
            ]))
            .await;
        assessment.extend(
            "node_pools",
            fields::items(&pools)
                .iter()
                .map(|pool| node_pool_record(ctx, project, name, location, pool)),
        );
        cli.pause().await;
    }

    for (name, location) in &located {
        match cluster_workloads(ctx, project, name, location).await {
            Ok(workloads) => assessment.extend("workloads", workloads),
            Err(e) => tracing::warn!("Could not get workloads for cluster {}: {:#}", name, e),
        }
    }

    Ok(assessment)
}

/// Memory in GB, printed the way the machine table types it: whole-number
/// specs print as integers, fractional specs keep a decimal point even when
/// the product is whole (`7.5 x 2` is "15.0").
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryGb {
    value: f64,
    decimal: bool,
}

impl MemoryGb {
    pub fn per_node(spec: f64) -> Self {
        Self {
            value: spec,
            decimal: spec.fract() != 0.0,
        }
    }

    pub fn times(self, nodes: i64) -> Self {
        Self {
            value: self.value * nodes as f64,
            ..self
        }
    }

    pub fn add(&mut self, other: MemoryGb) {
        self.value += other.value;
        self.decimal |= other.decimal;
    }

    pub fn render(self) -> String {
        if self.decimal {
            fields::format_float(self.value)
        } else {
            fields::format_number(self.value)
        }
    }
}

/// Totals derived from `clusters describe`
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterTotals {
    pub total_vcpus: String,
    pub total_memory_gb: String,
    pub node_pools_count: String,
}

impl Default for ClusterTotals {
    fn default() -> Self {
        Self {
            total_vcpus: NOT_AVAILABLE.to_string(),
            total_memory_gb: NOT_AVAILABLE.to_string(),
            node_pools_count: NOT_AVAILABLE.to_string(),
        }
    }
}

impl ClusterTotals {
    /// Sum machine specs times initial node count over the described node pools
    pub fn from_description(details: &Value) -> Self {
        let pools = fields::lookup(details, "nodePools")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let mut vcpus: i64 = 0;
        let mut memory_gb = MemoryGb::default();
        for pool in pools {
            let nodes = fields::integer(pool, "initialNodeCount").unwrap_or(0);
            let machine_type = fields::text_or(pool, "config.machineType", "");
            let (pool_vcpus, pool_memory) = machine_type_specs(&machine_type);
            vcpus += i64::from(pool_vcpus) * nodes;
            memory_gb.add(MemoryGb::per_node(pool_memory).times(nodes));
        }

        Self {
            total_vcpus: vcpus.to_string(),
            total_memory_gb: memory_gb.render(),
            node_pools_count: pools.len().to_string(),
        }
    }
}

async fn cluster_details(ctx: &CollectContext, project_id: &str, name: &str, location: &str) -> ClusterTotals {
    let cli = &ctx.cli;
    let details = cli
        .query(&cli.gcloud([
            "container".to_string(),
            "clusters".to_string(),
            "describe".to_string(),
            name.to_string(),
            format!("--location={}", location),
            format!("--project={}", project_id),
            "--format=json".to_string(),
        ]))
        .await;

    if details.is_object() {
        ClusterTotals::from_description(&details)
    } else {
        ClusterTotals::default()
    }
}

/// First node pool's machine type, else the cluster default node config's
pub fn default_machine_type(cluster: &Value) -> String {
    if fields::count(cluster, "nodePools") > 0 {
        fields::text(cluster, "nodePools.0.config.machineType")
    } else {
        fields::text(cluster, "nodeConfig.machineType")
    }
}

pub fn cluster_record(
    ctx: &CollectContext,
    project: &Project,
    cluster: &Value,
    totals: &ClusterTotals,
) -> Record {
    let workload_identity = fields::lookup(cluster, "workloadIdentityConfig.workloadPool")
        .and_then(Value::as_str)
        .is_some_and(|pool| !pool.is_empty());

    ctx.base_record(project)
        .with("cluster_name", fields::text(cluster, "name"))
        .with("location", fields::text(cluster, "location"))
        .with("location_type", fields::text(cluster, "locationType"))
        .with("status", fields::text(cluster, "status"))
        .with("kubernetes_version", fields::text(cluster, "currentMasterVersion"))
        .with("node_version", fields::text(cluster, "currentNodeVersion"))
        .with("node_count", fields::text_or(cluster, "currentNodeCount", "0"))
        .with("machine_type", default_machine_type(cluster))
        .with("disk_size_gb", fields::text(cluster, "nodeConfig.diskSizeGb"))
        .with("network", fields::text(cluster, "network"))
        .with("subnetwork", fields::text(cluster, "subnetwork"))
        .with("cluster_ipv4_cidr", fields::text(cluster, "clusterIpv4Cidr"))
        .with("services_ipv4_cidr", fields::text(cluster, "servicesIpv4Cidr"))
        .with("autopilot_enabled", fields::flag(cluster, "autopilot.enabled"))
        .with(
            "private_cluster",
            fields::flag(cluster, "privateClusterConfig.enablePrivateNodes"),
        )
        .with(
            "master_authorized_networks",
            fields::count(cluster, "masterAuthorizedNetworksConfig.cidrBlocks").to_string(),
        )
        .with("network_policy_enabled", fields::flag(cluster, "networkPolicy.enabled"))
        .with(
            "pod_security_policy_enabled",
            fields::flag(cluster, "podSecurityPolicyConfig.enabled"),
        )
        .with("workload_identity_enabled", fields::bool_label(workload_identity))
        .with(
            "binary_authorization_enabled",
            fields::flag(cluster, "binaryAuthorization.enabled"),
        )
        .with("shielded_nodes_enabled", fields::flag(cluster, "shieldedNodes.enabled"))
        .with("release_channel", fields::text(cluster, "releaseChannel.channel"))
        .with("maintenance_window", fields::json_object(cluster, "maintenancePolicy"))
        .with("addons_config", fields::json_object(cluster, "addonsConfig"))
        .with("resource_labels", fields::json_object(cluster, "resourceLabels"))
        .with("creation_time", fields::text(cluster, "createTime"))
        .with("endpoint", fields::text(cluster, "endpoint"))
        .with("initial_cluster_version", fields::text(cluster, "initialClusterVersion"))
        .with("total_vcpus", totals.total_vcpus.as_str())
        .with("total_memory_gb", totals.total_memory_gb.as_str())
        .with("node_pools_count", totals.node_pools_count.as_str())
}

pub fn node_pool_record(
    ctx: &CollectContext,
    project: &Project,
    cluster_name: &str,
    cluster_location: &str,
    pool: &Value,
) -> Record {
    let machine_type = fields::text_or(pool, "config.machineType", "");
    let (vcpus, memory_gb) = machine_type_specs(&machine_type);
    let memory_gb = MemoryGb::per_node(memory_gb);
    let nodes = fields::integer(pool, "initialNodeCount").unwrap_or(0);

    ctx.base_record(project)
        .with("cluster_name", cluster_name)
        .with("cluster_location", cluster_location)
        .with("node_pool_name", fields::text(pool, "name"))
        .with("status", fields::text(pool, "status"))
        .with("node_count", nodes.to_string())
        .with("machine_type", fields::text(pool, "config.machineType"))
        .with("disk_size_gb", fields::text(pool, "config.diskSizeGb"))
        .with("disk_type", fields::text(pool, "config.diskType"))
        .with("image_type", fields::text(pool, "config.imageType"))
        .with("vcpus_per_node", vcpus.to_string())
        .with("memory_gb_per_node", memory_gb.render())
        .with("total_vcpus", (i64::from(vcpus) * nodes).to_string())
        .with("total_memory_gb", memory_gb.times(nodes).render())
        .with("preemptible", fields::flag(pool, "config.preemptible"))
        .with("spot", fields::flag(pool, "config.spot"))
        .with("autoscaling_enabled", fields::flag(pool, "autoscaling.enabled"))
        .with("min_node_count", fields::text(pool, "autoscaling.minNodeCount"))
        .with("max_node_count", fields::text(pool, "autoscaling.maxNodeCount"))
        .with("auto_upgrade", fields::flag(pool, "management.autoUpgrade"))
        .with("auto_repair", fields::flag(pool, "management.autoRepair"))
        .with("node_version", fields::text(pool, "version"))
        .with("locations", fields::json_array(pool, "locations"))
        .with("network_tags", fields::json_array(pool, "config.tags"))
        .with("labels", fields::json_object(pool, "config.labels"))
        .with("taints", fields::json_array(pool, "config.taints"))
        .with("service_account", fields::text(pool, "config.serviceAccount"))
        .with("oauth_scopes", fields::json_array(pool, "config.oauthScopes"))
}

/// Fetch credentials into a private kubeconfig, then list every workload kind.
/// Any failure discards the whole cluster's workloads.
async fn cluster_workloads(
    ctx: &CollectContext,
    project: &Project,
    cluster_name: &str,
    location: &str,
) -> Result<Vec<Record>> {
    let cli = &ctx.cli;
    let kube_dir = tempfile::Builder::new()
        .prefix("gcp-assess-kube")
        .tempdir()
        .context("creating kubeconfig directory")?;
    let kubeconfig = kube_dir.path().join("config").to_string_lossy().into_owned();

    let credentials = cli
        .gcloud([
            "container".to_string(),
            "clusters".to_string(),
            "get-credentials".to_string(),
            cluster_name.to_string(),
            format!("--location={}", location),
            format!("--project={}", project.project_id),
        ])
        .env("KUBECONFIG", kubeconfig.as_str())
        .timeout(None);
    cli.text(&credentials).await.map_err(describe_failure)?;

    let mut workloads = Vec::new();
    for (kind, singular) in WORKLOAD_KINDS {
        let listing = cli
            .json(&cli.kubectl([
                "get".to_string(),
                kind.to_string(),
                "--all-namespaces".to_string(),
                "-o".to_string(),
                "json".to_string(),
                format!("--kubeconfig={}", kubeconfig),
            ]))
            .await
            .map_err(describe_failure)?;

        let items = fields::lookup(&listing, "items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        workloads.extend(
            items
                .iter()
                .map(|item| workload_record(ctx, project, cluster_name, location, singular, item)),
        );
    }

    Ok(workloads)
}

fn describe_failure(error: CommandError) -> anyhow::Error {
    match error.detail() {
        Some(detail) => anyhow::anyhow!("{}: {}", error, detail),
        None => anyhow::Error::new(error),
    }
}

pub fn workload_record(
    ctx: &CollectContext,
    project: &Project,
    cluster_name: &str,
    cluster_location: &str,
    resource_type: &str,
    item: &Value,
) -> Record {
    let mut record = ctx
        .base_record(project)
        .with("cluster_name", cluster_name)
        .with("cluster_location", cluster_location)
        .with("resource_type", resource_type)
        .with("resource_name", fields::text(item, "metadata.name"))
        .with("namespace", fields::text(item, "metadata.namespace"))
        .with("creation_timestamp", fields::text(item, "metadata.creationTimestamp"))
        .with("labels", fields::json_object(item, "metadata.labels"))
        .with("annotations", fields::json_object(item, "metadata.annotations"));

    match resource_type {
        "deployment" => {
            record
                .set("replicas", fields::text_or(item, "spec.replicas", "0"))
                .set("ready_replicas", fields::text_or(item, "status.readyReplicas", "0"))
                .set(
                    "available_replicas",
                    fields::text_or(item, "status.availableReplicas", "0"),
                )
                .set("strategy_type", fields::text(item, "spec.strategy.type"));
        }
        "service" => {
            record
                .set("service_type", fields::text(item, "spec.type"))
                .set("cluster_ip", fields::text(item, "spec.clusterIP"))
                .set("external_ip", fields::json_array(item, "spec.externalIPs"))
                .set("ports", fields::json_array(item, "spec.ports"));
        }
        "pod" => {
            record
                .set("phase", fields::text(item, "status.phase"))
                .set("node_name", fields::text(item, "spec.nodeName"))
                .set("restart_policy", fields::text(item, "spec.restartPolicy"))
                .set(
                    "containers_count",
                    fields::count(item, "spec.containers").to_string(),
                );
        }
        _ => {}
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_machine_type_specs() {
        assert_eq!(machine_type_specs("e2-standard-4"), (4, 16.0));
        assert_eq!(machine_type_specs("n1-standard-1"), (1, 3.75));
        assert_eq!(machine_type_specs("a2-highgpu-1g"), (0, 0.0));
    }

    #[test]
    fn test_cluster_totals_from_description() {
        let details = json!({
            "nodePools": [
                {"initialNodeCount": 3, "config": {"machineType": "e2-standard-4"}},
                {"initialNodeCount": 2, "config": {"machineType": "n1-standard-1"}}
            ]
        });
        let totals = ClusterTotals::from_description(&details);
        assert_eq!(totals.total_vcpus, "14");
        assert_eq!(totals.total_memory_gb, "55.5");
        assert_eq!(totals.node_pools_count, "2");
    }

    #[test]
    fn test_memory_keeps_decimal_point_of_fractional_specs() {
        assert_eq!(MemoryGb::per_node(16.0).times(3).render(), "48");
        assert_eq!(MemoryGb::per_node(7.5).times(2).render(), "15.0");
        assert_eq!(MemoryGb::per_node(3.75).times(0).render(), "0.0");
        assert_eq!(MemoryGb::per_node(0.0).render(), "0");

        let details = json!({
            "nodePools": [
                {"initialNodeCount": 1, "config": {"machineType": "e2-standard-2"}},
                {"initialNodeCount": 2, "config": {"machineType": "n1-standard-2"}}
            ]
        });
        assert_eq!(ClusterTotals::from_description(&details).total_memory_gb, "23.0");
        assert_eq!(
            ClusterTotals::from_description(&json!({"nodePools": []})).total_memory_gb,
            "0"
        );
    }

    #[test]
    fn test_default_machine_type_prefers_first_pool() {
        let cluster = json!({
            "nodePools": [{"config": {"machineType": "e2-medium"}}],
            "nodeConfig": {"machineType": "n1-standard-1"}
        });
        assert_eq!(default_machine_type(&cluster), "e2-medium");
        assert_eq!(
            default_machine_type(&json!({"nodeConfig": {"machineType": "n1-standard-1"}})),
            "n1-standard-1"
        );
        assert_eq!(default_machine_type(&json!({})), "N/A");
    }
}
