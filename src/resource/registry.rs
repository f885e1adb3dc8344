//! Resource-type registry
//!
//! Each exported resource type is declared once, in the embedded JSON file of
//! its domain: display name, file suffix and the ordered CSV columns. The
//! exporter writes headers from these declarations, never from the records.

use super::domain::Domain;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/compute.json"),
    include_str!("../resources/networking.json"),
    include_str!("../resources/storage.json"),
    include_str!("../resources/gke.json"),
];

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    pub display_name: String,
    pub domain: Domain,
    /// Inserted between the output prefix and the run timestamp
    pub file_suffix: String,
    /// CSV header, in output order
    pub columns: Vec<String>,
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub resources: HashMap<String, ResourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<ResourceConfig> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ResourceConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = ResourceConfig {
            resources: HashMap::new(),
        };

        for content in RESOURCE_FILES {
            let partial: ResourceConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded resource JSON: {}", e));
            final_config.resources.extend(partial.resources);
        }

        final_config
    })
}

/// Get a resource definition by key
pub fn get_resource(key: &str) -> Option<&'static ResourceDef> {
    get_registry().resources.get(key)
}

/// Resource definitions of one domain, in export order
pub fn domain_resources(domain: Domain) -> Vec<(&'static str, &'static ResourceDef)> {
    domain
        .resource_keys()
        .iter()
        .filter_map(|key| get_resource(key).map(|def| (*key, def)))
        .collect()
}
