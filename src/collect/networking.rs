//! Networking collector
//!
//! VPCs, subnets, firewall rules, load balancers (URL maps plus network
//! forwarding rules), Cloud NAT, VPN gateways and Cloud DNS zones.

use super::{CollectContext, Collector};
use crate::gcp::projects::Project;
use crate::resource::fields::{self, NOT_AVAILABLE};
use crate::resource::{Assessment, Domain, Record};
use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::Value;

/// Forwarding-rule schemes reported as network load balancers
const NETWORK_LB_SCHEMES: &[&str] = &["EXTERNAL", "INTERNAL"];

pub struct NetworkingCollector;

impl Collector for NetworkingCollector {
    fn domain(&self) -> Domain {
        Domain::Networking
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
    tracing::info!("Assessing networking for project: {}", project.project_id);
    let mut assessment = Assessment::new();

    let vpcs = list(ctx, project, &["compute", "networks", "list"]).await;
    assessment.extend("vpcs", vpcs.iter().map(|n| vpc_record(ctx, project, n)));

    let subnets = list(ctx, project, &["compute", "networks", "subnets", "list"]).await;
    assessment.extend("subnets", subnets.iter().map(|s| subnet_record(ctx, project, s)));

    let rules = list(ctx, project, &["compute", "firewall-rules", "list"]).await;
    assessment.extend(
        "firewall_rules",
        rules.iter().map(|r| firewall_record(ctx, project, r)),
    );

    assessment.extend("load_balancers", load_balancers(ctx, project).await);
    assessment.extend("nat_gateways", nat_gateways(ctx, project).await);

    let vpn = list(ctx, project, &["compute", "vpn-gateways", "list"]).await;
    assessment.extend("vpn_gateways", vpn.iter().map(|g| vpn_record(ctx, project, g)));

    let zones = list(ctx, project, &["dns", "managed-zones", "list"]).await;
    assessment.extend("dns_zones", zones.iter().map(|z| dns_record(ctx, project, z)));

    Ok(assessment)
}

/// `gcloud <command> --project=<p> --format=json`, then the rate-limit pause
async fn list(ctx: &CollectContext, project: &Project, command: &[&str]) -> Vec<Value> {
    let response = query_list(ctx, project, command).await;
    ctx.cli.pause().await;
    response
}

async fn query_list(ctx: &CollectContext, project: &Project, command: &[&str]) -> Vec<Value> {
    let cli = &ctx.cli;
    let mut args: Vec<String> = command.iter().map(|s| s.to_string()).collect();
    args.push(format!("--project={}", project.project_id));
    args.push("--format=json".to_string());
    fields::items(&cli.query(&cli.gcloud(args)).await).to_vec()
}

pub fn vpc_record(ctx: &CollectContext, project: &Project, network: &Value) -> Record {
    ctx.base_record(project)
        .with("vpc_name", fields::text(network, "name"))
        .with("vpc_mode", fields::text(network, "routingConfig.routingMode"))
        .with(
            "auto_create_subnetworks",
            fields::flag(network, "autoCreateSubnetworks"),
        )
        .with("mtu", fields::text(network, "mtu"))
        .with("creation_timestamp", fields::text(network, "creationTimestamp"))
        .with("description", fields::text(network, "description"))
}

pub fn subnet_record(ctx: &CollectContext, project: &Project, subnet: &Value) -> Record {
    ctx.base_record(project)
        .with("subnet_name", fields::text(subnet, "name"))
        .with("network_name", fields::short_text(subnet, "network"))
        .with("region", fields::short_text(subnet, "region"))
        .with("ip_cidr_range", fields::text(subnet, "ipCidrRange"))
        .with("gateway_address", fields::text(subnet, "gatewayAddress"))
        .with(
            "private_ip_google_access",
            fields::flag(subnet, "privateIpGoogleAccess"),
        )
        .with("secondary_ranges", fields::json_array(subnet, "secondaryIpRanges"))
        .with("creation_timestamp", fields::text(subnet, "creationTimestamp"))
        .with("description", fields::text(subnet, "description"))
}

pub fn firewall_record(ctx: &CollectContext, project: &Project, rule: &Value) -> Record {
    let allowed = fields::lookup(rule, "allowed");
    let action = if allowed.and_then(Value::as_array).is_some_and(|a| !a.is_empty()) {
        "ALLOW"
    } else {
        "DENY"
    };
    let protocols_ports = allowed
        .or_else(|| fields::lookup(rule, "denied"))
        .map(fields::json_text)
        .unwrap_or_else(|| "[]".to_string());

    ctx.base_record(project)
        .with("rule_name", fields::text(rule, "name"))
        .with("network_name", fields::short_text(rule, "network"))
        .with("direction", fields::text(rule, "direction"))
        .with("priority", fields::text(rule, "priority"))
        .with("action", action)
        .with("source_ranges", fields::json_array(rule, "sourceRanges"))
        .with("destination_ranges", fields::json_array(rule, "destinationRanges"))
        .with("source_tags", fields::json_array(rule, "sourceTags"))
        .with("target_tags", fields::json_array(rule, "targetTags"))
        .with("protocols_ports", protocols_ports)
        .with("disabled", fields::flag(rule, "disabled"))
        .with("creation_timestamp", fields::text(rule, "creationTimestamp"))
        .with("description", fields::text(rule, "description"))
}

/// HTTP(S) load balancers from URL maps, network ones from forwarding rules
async fn load_balancers(ctx: &CollectContext, project: &Project) -> Vec<Record> {
    let url_maps = query_list(ctx, project, &["compute", "url-maps", "list"]).await;
    let forwarding_rules = query_list(ctx, project, &["compute", "forwarding-rules", "list"]).await;
    ctx.cli.pause().await;

    let mut records: Vec<Record> = url_maps
        .iter()
        .map(|m| url_map_record(ctx, project, m))
        .collect();
    records.extend(
        forwarding_rules
            .iter()
            .filter_map(|r| forwarding_rule_record(ctx, project, r)),
    );
    records
}

pub fn url_map_record(ctx: &CollectContext, project: &Project, url_map: &Value) -> Record {
    ctx.base_record(project)
        .with("lb_name", fields::text(url_map, "name"))
        .with("lb_type", "HTTP(S)")
        .with("default_service", fields::short_text(url_map, "defaultService"))
        .with(
            "host_rules_count",
            fields::count(url_map, "hostRules").to_string(),
        )
        .with(
            "path_matchers_count",
            fields::count(url_map, "pathMatchers").to_string(),
        )
        .with("creation_timestamp", fields::text(url_map, "creationTimestamp"))
        .with("description", fields::text(url_map, "description"))
}

/// Network load balancer record; `None` for schemes other than EXTERNAL/INTERNAL
pub fn forwarding_rule_record(ctx: &CollectContext, project: &Project, rule: &Value) -> Option<Record> {
    let scheme = fields::lookup(rule, "loadBalancingScheme").and_then(Value::as_str)?;
    if !NETWORK_LB_SCHEMES.contains(&scheme) {
        return None;
    }

    let target = fields::lookup(rule, "target")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(|t| fields::short_name(t).to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    Some(
        ctx.base_record(project)
            .with("lb_name", fields::text(rule, "name"))
            .with("lb_type", format!("Network ({})", scheme))
            .with("ip_address", fields::text(rule, "IPAddress"))
            .with("port_range", fields::text(rule, "portRange"))
            .with("target", target)
            .with("creation_timestamp", fields::text(rule, "creationTimestamp"))
            .with("description", fields::text(rule, "description")),
    )
}

/// Cloud NAT configs live on routers; one record per `nats[]` entry
async fn nat_gateways(ctx: &CollectContext, project: &Project) -> Vec<Record> {
    let cli = &ctx.cli;
    let routers = query_list(ctx, project, &["compute", "routers", "list"]).await;
    let mut records = Vec::new();

    for router in &routers {
        let router_name = fields::text_or(router, "name", "");
        let region = fields::short_name(&fields::text_or(router, "region", "")).to_string();

        let details = cli
            .query(&cli.gcloud([
                "compute".to_string(),
                "routers".to_string(),
                "describe".to_string(),
                router_name.clone(),
                format!("--region={}", region),
                format!("--project={}", project.project_id),
                "--format=json".to_string(),
            ]))
            .await;

        for nat in fields::lookup(&details, "nats")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
        {
            records.push(nat_record(ctx, project, router, &router_name, &region, nat));
        }
    }

    cli.pause().await;
    records
}

pub fn nat_record(
    ctx: &CollectContext,
    project: &Project,
    router: &Value,
    router_name: &str,
    region: &str,
    nat: &Value,
) -> Record {
    ctx.base_record(project)
        .with("nat_name", fields::text(nat, "name"))
        .with("router_name", router_name)
        .with("region", region)
        .with(
            "source_subnetwork_ip_ranges",
            fields::text(nat, "sourceSubnetworkIpRangesToNat"),
        )
        .with("nat_ip_allocate_option", fields::text(nat, "natIpAllocateOption"))
        .with("min_ports_per_vm", fields::text(nat, "minPortsPerVm"))
        .with("creation_timestamp", fields::text(router, "creationTimestamp"))
}

pub fn vpn_record(ctx: &CollectContext, project: &Project, gateway: &Value) -> Record {
    ctx.base_record(project)
        .with("vpn_gateway_name", fields::text(gateway, "name"))
        .with("region", fields::short_text(gateway, "region"))
        .with("network", fields::short_text(gateway, "network"))
        .with(
            "vpn_interfaces_count",
            fields::count(gateway, "vpnInterfaces").to_string(),
        )
        .with("creation_timestamp", fields::text(gateway, "creationTimestamp"))
        .with("description", fields::text(gateway, "description"))
}

pub fn dns_record(ctx: &CollectContext, project: &Project, zone: &Value) -> Record {
    ctx.base_record(project)
        .with("zone_name", fields::text(zone, "name"))
        .with("dns_name", fields::text(zone, "dnsName"))
        .with("visibility", fields::text(zone, "visibility"))
        .with("dnssec_state", fields::text(zone, "dnssecConfig.state"))
        .with("name_servers", fields::json_array(zone, "nameServers"))
        .with("creation_time", fields::text(zone, "creationTime"))
        .with("description", fields::text(zone, "description"))
}
