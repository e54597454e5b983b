//!
//! Power BI connector for Turnstile
//!
//! Authenticates a service principal against the tenant, resolves workspaces
//! and their datasets, and applies the configured group permissions.

mod consts;

pub mod apply;
pub mod creds;
pub mod rest;

pub use apply::{PermissionApplier, RunReport, WorkspaceOutcome};
pub use creds::PowerBiCredentials;
pub use rest::{GrantRequest, PowerBiRestClient, PowerBiRestConfig, ServiceError};
