//! Sequential permission application across the targeted workspaces
//!
//! Workspaces are processed one at a time, datasets within a workspace one
//! at a time, grants one at a time. A failure on one workspace is recorded
//! and the run moves on; the caller inspects the [`RunReport`] to decide the
//! exit code.

use std::collections::BTreeSet;

use turnstile_core::logging::{error, info};
use turnstile_core::PermissionConfig;

use crate::rest::{GrantRequest, PowerBiRestClient, ServiceError};

/// Applies the configured group permissions to every dataset in the
/// targeted workspaces.
pub struct PermissionApplier<'a> {
    client: &'a PowerBiRestClient,
    config: &'a PermissionConfig,
}

/// What happened to one workspace during the run.
#[derive(Debug)]
pub struct WorkspaceOutcome {
    pub workspace: String,
    pub grants_applied: usize,
    pub failures: Vec<ServiceError>,
}

impl WorkspaceOutcome {
    fn new(workspace: &str) -> Self {
        Self {
            workspace: workspace.to_owned(),
            grants_applied: 0,
            failures: Vec::new(),
        }
    }

    /// Whether everything for this workspace went through.
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Aggregate of the whole run, one outcome per targeted workspace.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<WorkspaceOutcome>,
}

impl RunReport {
    /// True if any workspace recorded a failure.
    pub fn failed(&self) -> bool {
        self.outcomes.iter().any(|outcome| !outcome.succeeded())
    }

    /// Total grants applied across all workspaces.
    pub fn grants_applied(&self) -> usize {
        self.outcomes.iter().map(|o| o.grants_applied).sum()
    }

    /// Names of the workspaces that recorded at least one failure.
    pub fn failed_workspaces(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.succeeded())
            .map(|outcome| outcome.workspace.as_str())
            .collect()
    }
}

impl<'a> PermissionApplier<'a> {
    pub fn new(client: &'a PowerBiRestClient, config: &'a PermissionConfig) -> Self {
        Self { client, config }
    }

    /// Apply permissions for every targeted workspace, in order. Never
    /// returns early; failures are collected in the report.
    pub async fn apply_all(&self, targets: &BTreeSet<String>) -> RunReport {
        let mut report = RunReport::default();
        for workspace in targets {
            report.outcomes.push(self.apply_workspace(workspace).await);
        }
        report
    }

    async fn apply_workspace(&self, workspace: &str) -> WorkspaceOutcome {
        let mut outcome = WorkspaceOutcome::new(workspace);

        // Targets are produced by intersecting against the config, so a
        // missing entry here means the caller skipped that step.
        let grants = match self.config.workspace(workspace) {
            Some(grants) => grants,
            None => {
                error!("workspace {workspace} has no configuration entry; skipping");
                return outcome;
            }
        };

        let workspace_id = match self.client.workspace_id(workspace).await {
            Ok(id) => id,
            Err(e) => {
                error!("resolving workspace {workspace}: {e}");
                outcome.failures.push(e);
                return outcome;
            }
        };

        let datasets = match self.client.datasets(&workspace_id).await {
            Ok(datasets) => datasets,
            Err(e) => {
                error!("listing datasets for workspace {workspace}: {e}");
                outcome.failures.push(e);
                return outcome;
            }
        };
        info!(
            "workspace {workspace}: applying permissions to {} dataset(s)",
            datasets.len()
        );

        for dataset in &datasets {
            for (level, groups) in &grants.group_permissions {
                for group in groups {
                    let grant = GrantRequest {
                        workspace_name: workspace.to_owned(),
                        workspace_id: workspace_id.to_owned(),
                        dataset_id: dataset.id.to_owned(),
                        group_id: group.to_owned(),
                        permission_level: *level,
                    };
                    match self.client.assign_group_access(&grant).await {
                        Ok(()) => {
                            info!(
                                "granted {level} to group {group} on dataset {} in {workspace}",
                                dataset.name
                            );
                            outcome.grants_applied += 1;
                        }
                        Err(e) => {
                            error!("workspace {workspace}: {e}");
                            outcome.failures.push(e);
                        }
                    }
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::creds::PowerBiCredentials;
    use crate::rest::PowerBiRestConfig;

    const TENANT: &str = "3f6d537e-ff34-4363-a1a4-9b6e2a9df2a4";
    const SALES_GROUP: &str = "b47b0f32-3c17-4b3f-a9a5-5c893a74cf2a";

    fn config() -> PermissionConfig {
        PermissionConfig::from_yaml(
            r#"
"Dataset Permissions":
  "Sales":
    "group_permissions":
      "Read": ["b47b0f32-3c17-4b3f-a9a5-5c893a74cf2a"]
  "Finance":
    "group_permissions":
      "ReadWrite": ["7c9e6679-7425-40de-944b-e07fc1f90ae7"]
"#,
        )
        .unwrap()
    }

    async fn client_for(server: &MockServer) -> PowerBiRestClient {
        Mock::given(method("POST"))
            .and(path(format!("/{TENANT}/oauth2/token")))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"access_token": "FAKE_TOKEN"}"#),
            )
            .mount(server)
            .await;
        PowerBiRestClient::new(
            &PowerBiCredentials {
                tenant_id: TENANT.to_owned(),
                client_id: "client".to_owned(),
                client_secret: "secret".to_owned(),
            },
            PowerBiRestConfig {
                authority_url: server.uri(),
                api_url: server.uri(),
                retry: false,
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    async fn mount_workspace(server: &MockServer, name: &str, id: &str) {
        Mock::given(method("GET"))
            .and(path("/v1.0/myorg/groups"))
            .and(wiremock::matchers::query_param(
                "$filter",
                format!("name eq '{name}'"),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"value": [{{"id": "{id}", "name": "{name}"}}]}}"#
            )))
            .mount(server)
            .await;
    }

    async fn mount_datasets(server: &MockServer, workspace_id: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/v1.0/myorg/groups/{workspace_id}/datasets")))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(format!(r#"{{"value": {body}}}"#)),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn single_workspace_grant_goes_through() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        mount_workspace(&server, "Sales", "ws-sales").await;
        mount_datasets(&server, "ws-sales", r#"[{"id": "ds-1", "name": "Pipeline"}]"#).await;
        Mock::given(method("POST"))
            .and(path("/v1.0/myorg/groups/ws-sales/datasets/ds-1/users"))
            .and(body_json(serde_json::json!({
                "identifier": SALES_GROUP,
                "principalType": "Group",
                "datasetUserAccessRight": "Read"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = config();
        let applier = PermissionApplier::new(&client, &config);
        let targets = BTreeSet::from(["Sales".to_owned()]);
        let report = applier.apply_all(&targets).await;

        assert!(!report.failed());
        assert_eq!(report.grants_applied(), 1);
        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].succeeded());
    }

    #[tokio::test]
    async fn missing_workspace_does_not_block_the_others() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        // Finance is not known to the tenant.
        Mock::given(method("GET"))
            .and(path("/v1.0/myorg/groups"))
            .and(wiremock::matchers::query_param(
                "$filter",
                "name eq 'Finance'",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"value": []}"#))
            .mount(&server)
            .await;
        mount_workspace(&server, "Sales", "ws-sales").await;
        mount_datasets(&server, "ws-sales", r#"[{"id": "ds-1", "name": "Pipeline"}]"#).await;
        Mock::given(method("POST"))
            .and(path("/v1.0/myorg/groups/ws-sales/datasets/ds-1/users"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = config();
        let applier = PermissionApplier::new(&client, &config);
        let targets = BTreeSet::from(["Finance".to_owned(), "Sales".to_owned()]);
        let report = applier.apply_all(&targets).await;

        // The run failed overall, but Sales still got its grant.
        assert!(report.failed());
        assert_eq!(report.failed_workspaces(), vec!["Finance"]);
        assert_eq!(report.grants_applied(), 1);
        let finance = report
            .outcomes
            .iter()
            .find(|o| o.workspace == "Finance")
            .unwrap();
        assert!(matches!(
            finance.failures[0],
            ServiceError::WorkspaceNotFound(_)
        ));
    }

    #[tokio::test]
    async fn reapplying_the_same_grant_is_a_no_op() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        mount_workspace(&server, "Sales", "ws-sales").await;
        mount_datasets(&server, "ws-sales", r#"[{"id": "ds-1", "name": "Pipeline"}]"#).await;
        // The service upserts; both runs get a clean 200.
        Mock::given(method("POST"))
            .and(path("/v1.0/myorg/groups/ws-sales/datasets/ds-1/users"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let config = config();
        let applier = PermissionApplier::new(&client, &config);
        let targets = BTreeSet::from(["Sales".to_owned()]);

        let first = applier.apply_all(&targets).await;
        let second = applier.apply_all(&targets).await;
        assert!(!first.failed());
        assert!(!second.failed());
        assert_eq!(first.grants_applied(), second.grants_applied());
    }

    #[tokio::test]
    async fn rejected_grant_is_isolated_to_its_dataset() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        mount_workspace(&server, "Sales", "ws-sales").await;
        mount_datasets(
            &server,
            "ws-sales",
            r#"[{"id": "ds-1", "name": "Pipeline"}, {"id": "ds-2", "name": "Orders"}]"#,
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/v1.0/myorg/groups/ws-sales/datasets/ds-1/users"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad principal"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1.0/myorg/groups/ws-sales/datasets/ds-2/users"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = config();
        let applier = PermissionApplier::new(&client, &config);
        let targets = BTreeSet::from(["Sales".to_owned()]);
        let report = applier.apply_all(&targets).await;

        assert!(report.failed());
        assert_eq!(report.grants_applied(), 1);
        assert!(matches!(
            report.outcomes[0].failures[0],
            ServiceError::PermissionApply { .. }
        ));
    }
}
