//! Assessment domains and the resource types each one exports

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// One category of resources being inventoried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Compute,
    Networking,
    Storage,
    Gke,
}

impl Domain {
    /// Every domain, in report order
    pub const ALL: [Domain; 4] = [
        Domain::Compute,
        Domain::Networking,
        Domain::Storage,
        Domain::Gke,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Domain::Compute => "compute",
            Domain::Networking => "networking",
            Domain::Storage => "storage",
            Domain::Gke => "gke",
        }
    }

    /// Human-readable name for log banners
    pub fn title(self) -> &'static str {
        match self {
            Domain::Compute => "Compute Engine",
            Domain::Networking => "Networking",
            Domain::Storage => "Storage",
            Domain::Gke => "GKE",
        }
    }

    /// Registry keys of the resource types this domain exports, in export order
    pub fn resource_keys(self) -> &'static [&'static str] {
        match self {
            Domain::Compute => &["compute-inventory", "compute-utilization"],
            Domain::Networking => &[
                "vpcs",
                "subnets",
                "firewall_rules",
                "load_balancers",
                "nat_gateways",
                "vpn_gateways",
                "dns_zones",
            ],
            Domain::Storage => &["buckets", "bucket_usage"],
            Domain::Gke => &["clusters", "node_pools", "workloads"],
        }
    }

    /// Default CSV file prefix (`gcp_<domain>`)
    pub fn default_prefix(self) -> String {
        format!("gcp_{}", self.name())
    }

    /// Log file written by a single-domain run
    pub fn log_file(self) -> String {
        format!("gcp_{}_assessment.log", self.name())
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Domain::ALL
            .into_iter()
            .find(|d| d.name() == wanted)
            .ok_or_else(|| format!("unknown service '{}'", s.trim()))
    }
}

/// Parse a comma-separated service list. Returns the unknown names on failure.
pub fn parse_services(raw: &str) -> Result<Vec<Domain>, Vec<String>> {
    let mut services = Vec::new();
    let mut invalid = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match name.parse::<Domain>() {
            Ok(domain) => services.push(domain),
            Err(_) => invalid.push(name.to_lowercase()),
        }
    }
    if invalid.is_empty() {
        Ok(services)
    } else {
        Err(invalid)
    }
}
