//! # gcp-assess
//!
//! Organization-wide inventory of Google Cloud resources, exported to CSV.
//!
//! Every assessment drives the `gcloud`, `gsutil` and `kubectl` command-line
//! tools as black-box processes: arguments in, JSON or text out, exit status
//! as the success signal.
//!
//! ## Pipeline
//!
//! 1. [`gcp::projects`] resolves the scope (explicit projects, folder,
//!    organization, or everything visible) into ACTIVE projects.
//! 2. [`collect::dispatch`] runs one domain [`collect::Collector`] per project
//!    on a bounded worker pool.
//! 3. [`export`] writes one CSV per resource type using the column schemas in
//!    [`resource`].
//! 4. [`orchestrator`] runs several domains as separate processes and writes a
//!    plain-text summary.

pub mod assessment;
pub mod collect;
pub mod config;
pub mod export;
pub mod gcp;
pub mod orchestrator;
pub mod resource;
pub mod validate;

/// Version injected at compile time via GCP_ASSESS_VERSION env var (set by CI/CD),
/// or the crate version for local builds.
pub const VERSION: &str = match option_env!("GCP_ASSESS_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
