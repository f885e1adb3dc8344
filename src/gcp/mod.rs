//! GCP CLI interaction module
//!
//! Everything that talks to the cloud goes through external command-line
//! tools run as child processes.
//!
//! # Module Structure
//!
//! - [`runner`] - Process execution with timeouts and a typed error
//! - [`client`] - `gcloud`/`gsutil`/`kubectl` invocation builders and JSON decoding
//! - [`projects`] - Scope resolution into ACTIVE projects
//!
//! # Example
//!
//! ```ignore
//! use gcp_assess::gcp::{client::GcpCli, projects, runner::SystemRunner};
//!
//! async fn example(config: &gcp_assess::config::Config) {
//!     let cli = GcpCli::new(std::sync::Arc::new(SystemRunner), config);
//!     let scope = projects::Scope::Organization("123456789012".into());
//!     let active = projects::resolve_projects(&cli, &scope).await;
//! }
//! ```

pub mod client;
pub mod projects;
pub mod runner;
