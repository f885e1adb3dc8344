//! Collectors driven through scripted CLI output

mod common;

use common::{context, project, ScriptedRunner};
use gcp_assess::collect::compute::{ComputeCollector, INVENTORY, UTILIZATION};
use gcp_assess::collect::gke::GkeCollector;
use gcp_assess::collect::networking::NetworkingCollector;
use gcp_assess::collect::storage::StorageCollector;
use gcp_assess::collect::Collector;
use gcp_assess::config::Config;
use std::sync::Arc;

// =============================================================================
// Compute
// =============================================================================

const INSTANCES: &str = r#"[{
  "name": "web-1",
  "zone": "https://www.googleapis.com/compute/v1/projects/p1/zones/us-central1-a",
  "status": "RUNNING",
  "machineType": "https://www.googleapis.com/compute/v1/projects/p1/zones/us-central1-a/machineTypes/e2-standard-2",
  "disks": [
    {"boot": true, "source": "https://www.googleapis.com/compute/v1/projects/p1/zones/us-central1-a/disks/web-1"},
    {"boot": false, "source": "https://www.googleapis.com/compute/v1/projects/p1/zones/us-central1-a/disks/web-1-data"}
  ],
  "networkInterfaces": [{"networkIP": "10.0.0.2", "accessConfigs": [{"natIP": "34.1.2.3"}]}],
  "labels": {"env": "prod"},
  "serviceAccounts": [{"email": "sa@p1.iam.gserviceaccount.com"}]
}, {
  "name": "batch-1",
  "zone": "https://www.googleapis.com/compute/v1/projects/p1/zones/us-central1-b",
  "status": "TERMINATED",
  "machineType": "https://www.googleapis.com/compute/v1/projects/p1/zones/us-central1-b/machineTypes/n1-standard-1"
}]"#;

fn compute_runner() -> ScriptedRunner {
    ScriptedRunner::new()
        .ok("gcloud compute instances list --project=p1 --format=json", INSTANCES)
        .ok(
            "gcloud compute machine-types describe e2-standard-2 --zone=us-central1-a --project=p1 --format=json",
            r#"{"guestCpus": 2, "memoryMb": 8192}"#,
        )
        .ok(
            "gcloud compute disks describe web-1 --zone=us-central1-a --project=p1 --format=json",
            r#"{"sizeGb": "20", "type": "https://x/zones/us-central1-a/diskTypes/pd-balanced",
                "sourceImage": "https://www.googleapis.com/compute/v1/projects/debian-cloud/global/images/debian-12-bookworm-v20240110"}"#,
        )
        .ok(
            "gcloud compute disks describe web-1-data --zone=us-central1-a --project=p1 --format=json",
            r#"{"sizeGb": "100", "type": "https://x/zones/us-central1-a/diskTypes/pd-ssd"}"#,
        )
        .fail(
            "gcloud compute machine-types describe n1-standard-1 --zone=us-central1-b --project=p1 --format=json",
            "ERROR: (gcloud.compute.machine-types.describe) PERMISSION_DENIED",
        )
}

#[tokio::test]
async fn compute_inventory_and_running_utilization() {
    let runner = Arc::new(compute_runner());
    let ctx = context(&runner, Some("123"));

    let assessment = ComputeCollector.collect(&ctx, &project("p1")).await.unwrap();

    let inventory = assessment.records(INVENTORY);
    assert_eq!(inventory.len(), 2);
    let web = &inventory[0];
    assert_eq!(web.get("organization_id"), Some("123"));
    assert_eq!(web.get("instance_name"), Some("web-1"));
    assert_eq!(web.get("zone"), Some("us-central1-a"));
    assert_eq!(web.get("region"), Some("us-central1"));
    assert_eq!(web.get("vcpus"), Some("2"));
    assert_eq!(web.get("memory_gb"), Some("8.0"));
    assert_eq!(web.get("total_storage_gb"), Some("120"));
    assert_eq!(web.get("disk_count"), Some("2"));
    assert_eq!(web.get("storage_types"), Some("pd-balanced,pd-ssd"));
    assert_eq!(web.get("boot_disk_type"), Some("pd-balanced"));
    assert_eq!(web.get("boot_disk_size_gb"), Some("20"));
    assert_eq!(web.get("os_family"), Some("Debian"));
    assert_eq!(web.get("boot_disk_image"), Some("debian-12-bookworm-v20240110"));
    assert_eq!(web.get("external_ip"), Some("34.1.2.3"));
    assert_eq!(web.get("labels"), Some(r#"{"env": "prod"}"#));
    assert_eq!(
        web.get("service_accounts"),
        Some(r#"["sa@p1.iam.gserviceaccount.com"]"#)
    );
    assert_eq!(web.get("runtime_hours_30d"), Some("N/A"));

    let batch = &inventory[1];
    assert_eq!(batch.get("machine_type"), Some("n1-standard-1"));
    assert_eq!(batch.get("vcpus"), Some("N/A"));
    assert_eq!(batch.get("boot_disk_type"), Some("N/A"));
    assert_eq!(batch.get("os_family"), Some("N/A"));

    let utilization = assessment.records(UTILIZATION);
    assert_eq!(utilization.len(), 1);
    assert_eq!(utilization[0].get("instance_name"), Some("web-1"));
    assert_eq!(utilization[0].get("cpu_avg_30d"), Some("N/A"));
}

#[tokio::test]
async fn compute_boot_disk_is_described_once() {
    let runner = Arc::new(compute_runner());
    let ctx = context(&runner, None);

    ComputeCollector.collect(&ctx, &project("p1")).await.unwrap();

    let describes = runner
        .calls()
        .iter()
        .filter(|c| c.starts_with("gcloud compute disks describe web-1 "))
        .count();
    assert_eq!(describes, 1);
}

#[tokio::test]
async fn compute_instance_missing_required_fields_is_skipped() {
    let runner = Arc::new(ScriptedRunner::new().ok(
        "gcloud compute instances list --project=p1 --format=json",
        r#"[{"name": "broken"}]"#,
    ));
    let ctx = context(&runner, None);

    let assessment = ComputeCollector.collect(&ctx, &project("p1")).await.unwrap();
    assert_eq!(assessment.count(INVENTORY), 0);
}

#[tokio::test]
async fn compute_preflight_requires_active_account() {
    let runner = Arc::new(ScriptedRunner::new().ok(
        "gcloud auth list --format=json",
        r#"[{"account": "me@example.com", "status": ""}]"#,
    ));
    let ctx = context(&runner, None);
    assert!(ComputeCollector.preflight(&ctx).await.is_err());

    let runner = Arc::new(
        ScriptedRunner::new()
            .ok(
                "gcloud auth list --format=json",
                r#"[{"account": "me@example.com", "status": "ACTIVE"}]"#,
            )
            .ok(
                "gcloud organizations describe 123 --format=json",
                r#"{"displayName": "example.com"}"#,
            ),
    );
    let ctx = context(&runner, Some("123"));
    ComputeCollector.preflight(&ctx).await.unwrap();
    assert!(runner.called("gcloud organizations describe 123 --format=json"));
}

// =============================================================================
// Storage
// =============================================================================

fn storage_runner() -> ScriptedRunner {
    ScriptedRunner::new()
        .ok(
            "gcloud storage buckets list --project=p1 --format=json",
            r#"[{"name": "logs"}]"#,
        )
        .ok(
            "gcloud storage buckets describe gs://logs --format=json",
            r#"{"name": "logs", "location": "US", "locationType": "multi-region",
                "storageClass": "STANDARD", "versioning": {"enabled": true}}"#,
        )
        .ok(
            "gsutil lifecycle get gs://logs",
            "gs://logs/ has no lifecycle configuration.",
        )
        .ok(
            "gsutil iam get gs://logs",
            r#"{"bindings": [{"role": "roles/storage.admin"}, {"role": "roles/storage.objectViewer"}]}"#,
        )
        .fail("gsutil cors get gs://logs", "AccessDeniedException: 403")
        .ok("gsutil du -s gs://logs", "1610612736  gs://logs\n")
        .ok(
            "gsutil ls -l gs://logs/**",
            "      1024  2024-01-10T10:00:00Z  gs://logs/a.log\n      2048  2024-01-10T10:00:00Z  gs://logs/b.log\nTOTAL: 2 objects, 3072 bytes (3 KiB)\n",
        )
}

#[tokio::test]
async fn storage_non_json_lifecycle_counts_zero_rules() {
    let runner = Arc::new(storage_runner());
    let ctx = context(&runner, None);

    let assessment = StorageCollector.collect(&ctx, &project("p1")).await.unwrap();

    let buckets = assessment.records("buckets");
    assert_eq!(buckets.len(), 1);
    let bucket = &buckets[0];
    assert_eq!(bucket.get("organization_id"), Some("N/A"));
    assert_eq!(bucket.get("lifecycle_rules_count"), Some("0"));
    assert_eq!(bucket.get("iam_members_count"), Some("2"));
    assert_eq!(bucket.get("cors_enabled"), Some("False"));
    assert_eq!(bucket.get("versioning_enabled"), Some("True"));
    assert_eq!(bucket.get("encryption_type"), Some("Google-managed"));
}

#[tokio::test]
async fn storage_usage_from_du_and_listing() {
    let runner = Arc::new(storage_runner());
    let ctx = context(&runner, None);

    let assessment = StorageCollector.collect(&ctx, &project("p1")).await.unwrap();

    let usage = assessment.records("bucket_usage");
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].get("total_size_bytes"), Some("1610612736"));
    assert_eq!(usage[0].get("total_size_gb"), Some("1.5"));
    assert_eq!(usage[0].get("total_size_tb"), Some("0.0015"));
    assert_eq!(usage[0].get("object_count"), Some("2"));
    assert_eq!(usage[0].get("storage_class"), Some("STANDARD"));
    assert_eq!(usage[0].get("assessment_date"), Some(ctx.timestamp().as_str()));
}

// =============================================================================
// Networking
// =============================================================================

fn networking_runner() -> ScriptedRunner {
    ScriptedRunner::new()
        .ok(
            "gcloud compute networks list --project=p1 --format=json",
            r#"[{"name": "default", "autoCreateSubnetworks": true, "routingConfig": {"routingMode": "REGIONAL"}}]"#,
        )
        .ok(
            "gcloud compute firewall-rules list --project=p1 --format=json",
            r#"[{"name": "deny-ssh", "network": "https://x/global/networks/default",
                 "direction": "INGRESS", "priority": 900,
                 "denied": [{"IPProtocol": "tcp", "ports": ["22"]}],
                 "sourceRanges": ["0.0.0.0/0"]}]"#,
        )
        .ok(
            "gcloud compute url-maps list --project=p1 --format=json",
            r#"[{"name": "web-map", "defaultService": "https://x/global/backendServices/web",
                 "hostRules": [{}, {}], "pathMatchers": [{}]}]"#,
        )
        .ok(
            "gcloud compute forwarding-rules list --project=p1 --format=json",
            r#"[{"name": "tcp-lb", "loadBalancingScheme": "EXTERNAL", "IPAddress": "34.9.9.9",
                 "portRange": "80-80", "target": "https://x/regions/us-east1/targetPools/pool"},
                {"name": "ilb-managed", "loadBalancingScheme": "INTERNAL_MANAGED"}]"#,
        )
        .ok(
            "gcloud compute routers list --project=p1 --format=json",
            r#"[{"name": "r1", "region": "https://x/regions/us-east1", "creationTimestamp": "2024-01-01"}]"#,
        )
        .ok(
            "gcloud compute routers describe r1 --region=us-east1 --project=p1 --format=json",
            r#"{"nats": [{"name": "nat-a", "natIpAllocateOption": "AUTO_ONLY"}, {"name": "nat-b"}]}"#,
        )
        .fail(
            "gcloud dns managed-zones list --project=p1 --format=json",
            "ERROR: Cloud DNS API has not been used in project p1 before",
        )
}

#[tokio::test]
async fn networking_maps_every_resource_type() {
    let runner = Arc::new(networking_runner());
    let ctx = context(&runner, Some("123"));

    let assessment = NetworkingCollector.collect(&ctx, &project("p1")).await.unwrap();

    let vpc = &assessment.records("vpcs")[0];
    assert_eq!(vpc.get("vpc_mode"), Some("REGIONAL"));
    assert_eq!(vpc.get("auto_create_subnetworks"), Some("True"));

    let rule = &assessment.records("firewall_rules")[0];
    assert_eq!(rule.get("action"), Some("DENY"));
    assert_eq!(rule.get("network_name"), Some("default"));
    assert_eq!(rule.get("priority"), Some("900"));
    assert_eq!(
        rule.get("protocols_ports"),
        Some(r#"[{"IPProtocol": "tcp", "ports": ["22"]}]"#)
    );

    let lbs = assessment.records("load_balancers");
    assert_eq!(lbs.len(), 2);
    assert_eq!(lbs[0].get("lb_type"), Some("HTTP(S)"));
    assert_eq!(lbs[0].get("host_rules_count"), Some("2"));
    assert_eq!(lbs[0].get("ip_address"), None);
    assert_eq!(lbs[1].get("lb_type"), Some("Network (EXTERNAL)"));
    assert_eq!(lbs[1].get("target"), Some("pool"));

    let nats = assessment.records("nat_gateways");
    assert_eq!(nats.len(), 2);
    assert_eq!(nats[0].get("router_name"), Some("r1"));
    assert_eq!(nats[0].get("region"), Some("us-east1"));
    assert_eq!(nats[1].get("nat_ip_allocate_option"), Some("N/A"));

    assert_eq!(assessment.count("subnets"), 0);
    assert_eq!(assessment.count("dns_zones"), 0);
}

// =============================================================================
// GKE
// =============================================================================

const CREDENTIALS: &str =
    "gcloud container clusters get-credentials c1 --location=us-central1 --project=p1";

fn gke_runner() -> ScriptedRunner {
    ScriptedRunner::new()
        .ok(
            "gcloud container clusters list --project=p1 --format=json",
            r#"[{"name": "c1", "location": "us-central1", "status": "RUNNING", "currentNodeCount": 3,
                 "nodePools": [{"config": {"machineType": "e2-standard-4"}}],
                 "workloadIdentityConfig": {"workloadPool": "p1.svc.id.goog"},
                 "masterAuthorizedNetworksConfig": {"cidrBlocks": [{"cidrBlock": "10.0.0.0/8"}]}}]"#,
        )
        .ok(
            "gcloud container clusters describe c1 --location=us-central1 --project=p1 --format=json",
            r#"{"nodePools": [{"initialNodeCount": 3, "config": {"machineType": "e2-standard-4"}}]}"#,
        )
        .ok(
            "gcloud container node-pools list --cluster=c1 --location=us-central1 --project=p1 --format=json",
            r#"[{"name": "default-pool", "initialNodeCount": 3, "status": "RUNNING",
                 "config": {"machineType": "e2-standard-4", "diskSizeGb": 100},
                 "autoscaling": {"enabled": true, "minNodeCount": 1, "maxNodeCount": 5}}]"#,
        )
}

#[tokio::test]
async fn gke_clusters_and_node_pools() {
    let runner = Arc::new(gke_runner().fail(CREDENTIALS, "ERROR: permission denied"));
    let ctx = context(&runner, None);

    let assessment = GkeCollector.collect(&ctx, &project("p1")).await.unwrap();

    let cluster = &assessment.records("clusters")[0];
    assert_eq!(cluster.get("machine_type"), Some("e2-standard-4"));
    assert_eq!(cluster.get("node_count"), Some("3"));
    assert_eq!(cluster.get("total_vcpus"), Some("12"));
    assert_eq!(cluster.get("total_memory_gb"), Some("48"));
    assert_eq!(cluster.get("node_pools_count"), Some("1"));
    assert_eq!(cluster.get("workload_identity_enabled"), Some("True"));
    assert_eq!(cluster.get("master_authorized_networks"), Some("1"));

    let pool = &assessment.records("node_pools")[0];
    assert_eq!(pool.get("cluster_name"), Some("c1"));
    assert_eq!(pool.get("vcpus_per_node"), Some("4"));
    assert_eq!(pool.get("memory_gb_per_node"), Some("16"));
    assert_eq!(pool.get("total_vcpus"), Some("12"));
    assert_eq!(pool.get("autoscaling_enabled"), Some("True"));
    assert_eq!(pool.get("max_node_count"), Some("5"));

    // Credential failure drops only the workloads
    assert_eq!(assessment.count("workloads"), 0);
}

#[tokio::test]
async fn gke_workloads_use_a_private_kubeconfig() {
    let runner = Arc::new(
        gke_runner()
            .ok(CREDENTIALS, "")
            .ok_prefix(
                "kubectl get deployments --all-namespaces -o json --kubeconfig=",
                r#"{"items": [{"metadata": {"name": "web", "namespace": "default"},
                               "spec": {"replicas": 2, "strategy": {"type": "RollingUpdate"}},
                               "status": {"readyReplicas": 2}}]}"#,
            )
            .ok_prefix(
                "kubectl get services --all-namespaces -o json --kubeconfig=",
                r#"{"items": [{"metadata": {"name": "web-svc", "namespace": "default"},
                               "spec": {"type": "LoadBalancer", "clusterIP": "10.1.0.5", "externalIPs": ["1.2.3.4"]}}]}"#,
            )
            .ok_prefix(
                "kubectl get pods --all-namespaces -o json --kubeconfig=",
                r#"{"items": []}"#,
            ),
    );
    let ctx = context(&runner, None);

    let assessment = GkeCollector.collect(&ctx, &project("p1")).await.unwrap();

    let workloads = assessment.records("workloads");
    assert_eq!(workloads.len(), 2);
    assert_eq!(workloads[0].get("resource_type"), Some("deployment"));
    assert_eq!(workloads[0].get("ready_replicas"), Some("2"));
    assert_eq!(workloads[0].get("service_type"), None);
    assert_eq!(workloads[1].get("resource_type"), Some("service"));
    assert_eq!(workloads[1].get("external_ip"), Some(r#"["1.2.3.4"]"#));

    let kubeconfigs: Vec<String> = runner
        .calls()
        .iter()
        .filter(|c| c.starts_with("kubectl "))
        .filter_map(|c| c.split("--kubeconfig=").nth(1).map(str::to_string))
        .collect();
    assert_eq!(kubeconfigs.len(), 3);
    assert!(kubeconfigs.iter().all(|k| k == &kubeconfigs[0]));

    // Credentials land in that same file and are fetched without a deadline
    let credentials = runner.invocation(CREDENTIALS).unwrap();
    assert_eq!(
        credentials.env,
        vec![("KUBECONFIG".to_string(), kubeconfigs[0].clone())]
    );
    assert_eq!(credentials.timeout, None);

    let data_timeout = Some(Config::default().command_timeout());
    for invocation in runner.invocations() {
        if invocation.program == "kubectl" {
            assert_eq!(invocation.timeout, data_timeout);
            assert!(invocation.env.is_empty());
        }
    }
    assert_eq!(
        runner.invocation("gcloud container clusters list").unwrap().timeout,
        data_timeout
    );
}

#[tokio::test]
async fn gke_workload_failure_discards_partial_results() {
    let runner = Arc::new(
        gke_runner()
            .ok(CREDENTIALS, "")
            .ok_prefix(
                "kubectl get deployments --all-namespaces -o json --kubeconfig=",
                r#"{"items": [{"metadata": {"name": "web"}}]}"#,
            )
            .fail_prefix(
                "kubectl get services",
                "error: You must be logged in to the server (Unauthorized)",
            ),
    );
    let ctx = context(&runner, None);

    let assessment = GkeCollector.collect(&ctx, &project("p1")).await.unwrap();

    assert_eq!(assessment.count("clusters"), 1);
    assert_eq!(assessment.count("workloads"), 0);
    assert!(runner.calls().iter().all(|c| !c.starts_with("kubectl get pods")));
}
