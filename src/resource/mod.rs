//! Resource abstraction layer
//!
//! Resource types are data-driven: each one is a CSV schema declared in an
//! embedded JSON file and looked up by key, so adding a column is a JSON edit.
//!
//! # Architecture
//!
//! - [`domain`] - Assessment domains and the resource keys each exports
//! - [`registry`] - Loads and caches resource definitions from embedded JSON
//! - [`record`] - Flat records and per-type record lists
//! - [`fields`] - Helpers mapping CLI JSON onto string columns
//!
//! # Resource Definitions
//!
//! Resources are defined in JSON files under `src/resources/`:
//! - `compute.json` - VM inventory and utilization
//! - `networking.json` - VPCs, subnets, firewall rules, load balancers, NAT, VPN, DNS
//! - `storage.json` - Cloud Storage buckets and usage
//! - `gke.json` - GKE clusters, node pools, workloads

pub mod domain;
pub mod fields;
pub mod record;
pub mod registry;

pub use domain::Domain;
pub use record::{Assessment, Record};
pub use registry::{domain_resources, get_resource, ResourceDef};
