//! Turnstile CLI
//!
//! Invoked by the CI workflow runner after a deployment: given the list of
//! changed files, a tenant id, and the dataset-permissions config, it applies
//! the configured group permissions to every affected Power BI workspace.

#![deny(missing_docs)]

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use turnstile_core::{
    changes,
    config::PermissionConfig,
    logging::{self, info, LevelFilter},
};
use turnstile_powerbi::{
    apply::PermissionApplier,
    creds::PowerBiCredentials,
    rest::{PowerBiRestClient, PowerBiRestConfig},
};

/// Turnstile: assign Power BI dataset group permissions from CI
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Separator-delimited list of files changed by the deployment.
    #[clap(long)]
    files: String,
    /// Tenant the service principal authenticates against (GUID or domain).
    #[clap(long = "tenant_id")]
    tenant_id: String,
    /// Path to the dataset-permissions YAML document.
    #[clap(long)]
    config: PathBuf,
    /// Root folder that changed files must sit under to be considered.
    #[clap(long)]
    folder: Option<String>,
    /// Separator used in --files.
    #[clap(long, default_value = ",")]
    separator: String,
    #[clap(short, long)]
    log_level: Option<LevelFilter>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup(args.log_level);

    let config = PermissionConfig::read_from_file(&args.config)
        .context("loading the permission configuration")?;

    let targets = changes::resolve_targets(
        &args.files,
        &args.separator,
        args.folder.as_deref(),
        &config,
    );
    if targets.is_empty() {
        // Unrelated file changes are a normal CI outcome, not an error.
        info!("no changed files map to a configured workspace; nothing to do");
        return Ok(());
    }
    info!(
        "resolved {} target workspace(s): {}",
        targets.len(),
        targets.iter().cloned().collect::<Vec<_>>().join(", ")
    );

    let credentials = PowerBiCredentials {
        tenant_id: args.tenant_id,
        client_id: env::var("CLIENT_ID")
            .context("the CLIENT_ID environment variable must be set")?,
        client_secret: env::var("CLIENT_SECRET")
            .context("the CLIENT_SECRET environment variable must be set")?,
    };

    let client = PowerBiRestClient::new(&credentials, PowerBiRestConfig::default())
        .await
        .context("authenticating to the Power BI service")?;

    let applier = PermissionApplier::new(&client, &config);
    let report = applier.apply_all(&targets).await;

    info!(
        "applied {} grant(s) across {} workspace(s)",
        report.grants_applied(),
        report.outcomes.len()
    );
    if report.failed() {
        bail!(
            "permission assignment failed for workspace(s): {}",
            report.failed_workspaces().join(", ")
        );
    }
    Ok(())
}
