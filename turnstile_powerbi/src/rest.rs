//! Rest API interface for Power BI
//!

use std::collections::HashMap;
use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};

use turnstile_core::PermissionLevel;

use crate::{consts, creds::PowerBiCredentials};

/// Failures surfaced by the service layer. Auth failures abort the run;
/// everything else is isolated to the workspace or grant it concerns.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The client-credentials grant was rejected.
    #[error("authentication against the tenant failed: {0}")]
    Auth(String),
    /// The named workspace does not exist in the tenant.
    #[error("workspace {0:?} was not found in the tenant")]
    WorkspaceNotFound(String),
    /// Network failure or 5xx after retries were exhausted.
    #[error("service request failed: {0}")]
    Transient(String),
    /// The service rejected one specific grant.
    #[error("grant of {level} to group {group} on dataset {dataset} was rejected: {reason}")]
    PermissionApply {
        dataset: String,
        group: String,
        level: PermissionLevel,
        reason: String,
    },
    /// The service answered with something the client can't interpret.
    #[error("unexpected service response: {0}")]
    Api(String),
}

/// One unit of permission work: grant `permission_level` to `group_id` on
/// `dataset_id`. Constructed fresh per run, never persisted.
#[derive(Debug, Clone)]
pub struct GrantRequest {
    pub workspace_name: String,
    pub workspace_id: String,
    pub dataset_id: String,
    pub group_id: String,
    pub permission_level: PermissionLevel,
}

/// A dataset as returned by the workspace dataset listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct Workspace {
    id: String,
    name: String,
}

/// The service wraps every collection response in a `value` array.
#[derive(Deserialize)]
struct ValueEnvelope<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupAccess<'a> {
    identifier: &'a str,
    principal_type: &'a str,
    dataset_user_access_right: PermissionLevel,
}

/// Knobs for the rest client. The URLs exist so tests can point the client
/// at a mock server; production runs use the defaults.
pub struct PowerBiRestConfig {
    /// Identity endpoint host issuing bearer tokens.
    pub authority_url: String,
    /// API root.
    pub api_url: String,
    /// Enable/disable retry logic.
    pub retry: bool,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl Default for PowerBiRestConfig {
    fn default() -> Self {
        Self {
            authority_url: consts::DEFAULT_AUTHORITY_URL.to_owned(),
            api_url: consts::DEFAULT_API_URL.to_owned(),
            retry: true,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Wrapper struct for http functionality
///
/// Construction performs the client-credentials grant; the resulting bearer
/// token is read-only for the rest of the run.
pub struct PowerBiRestClient {
    http_client: ClientWithMiddleware,
    api_url: String,
    token: String,
}

impl PowerBiRestClient {
    pub async fn new(
        credentials: &PowerBiCredentials,
        config: PowerBiRestConfig,
    ) -> Result<Self, ServiceError> {
        credentials.validate()?;
        let base_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::Api(format!("building http client: {e}")))?;
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let mut client_builder = ClientBuilder::new(base_client);
        if config.retry {
            client_builder =
                client_builder.with(RetryTransientMiddleware::new_with_policy(retry_policy))
        }
        let http_client = client_builder.build();

        let token = fetch_token(&http_client, credentials, &config.authority_url).await?;
        Ok(Self {
            http_client,
            api_url: config.api_url,
            token,
        })
    }

    /// Resolve a workspace display name to its service-side id. The filter
    /// narrows the listing server-side; the exact-name check happens here
    /// so near-misses never count as a match.
    pub async fn workspace_id(&self, name: &str) -> Result<String, ServiceError> {
        let filter = urlencoding::encode(&format!("name eq '{name}'")).into_owned();
        let url = format!("{}/v1.0/myorg/groups?$filter={filter}", self.api_url);
        let response = self.send(self.build_request(reqwest::Method::GET, &url)).await?;
        let response = check_status(response, "listing workspaces")?;
        let workspaces = response
            .json::<ValueEnvelope<Workspace>>()
            .await
            .map_err(|e| ServiceError::Api(format!("parsing workspace listing: {e}")))?;

        workspaces
            .value
            .into_iter()
            .find(|workspace| workspace.name == name)
            .map(|workspace| workspace.id)
            .ok_or_else(|| ServiceError::WorkspaceNotFound(name.to_owned()))
    }

    /// List the datasets published in a workspace.
    pub async fn datasets(&self, workspace_id: &str) -> Result<Vec<Dataset>, ServiceError> {
        let url = format!("{}/v1.0/myorg/groups/{workspace_id}/datasets", self.api_url);
        let response = self.send(self.build_request(reqwest::Method::GET, &url)).await?;
        let response = check_status(response, "listing datasets")?;
        let datasets = response
            .json::<ValueEnvelope<Dataset>>()
            .await
            .map_err(|e| ServiceError::Api(format!("parsing dataset listing: {e}")))?;
        Ok(datasets.value)
    }

    /// Set a group's access right on a dataset. The service upserts, so
    /// re-applying an identical grant is a no-op and a different configured
    /// level overwrites the existing one.
    pub async fn assign_group_access(&self, grant: &GrantRequest) -> Result<(), ServiceError> {
        let url = format!(
            "{}/v1.0/myorg/groups/{}/datasets/{}/users",
            self.api_url, grant.workspace_id, grant.dataset_id
        );
        let body = GroupAccess {
            identifier: &grant.group_id,
            principal_type: "Group",
            dataset_user_access_right: grant.permission_level,
        };
        let response = self
            .send(self.build_request(reqwest::Method::POST, &url).json(&body))
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ServiceError::Transient(format!(
                "granting access returned {status}"
            )));
        }
        if !status.is_success() {
            let reason = match response.text().await {
                Ok(text) if !text.is_empty() => format!("{status}: {text}"),
                _ => status.to_string(),
            };
            return Err(ServiceError::PermissionApply {
                dataset: grant.dataset_id.to_owned(),
                group: grant.group_id.to_owned(),
                level: grant.permission_level,
                reason,
            });
        }
        Ok(())
    }

    /// Builds an authenticated request against the API.
    fn build_request(&self, method: reqwest::Method, url: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header(consts::AUTH_HEADER, format!("Bearer {}", self.token))
            .header(consts::ACCEPT_HEADER, "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ServiceError> {
        request
            .send()
            .await
            .map_err(|e| ServiceError::Transient(e.to_string()))
    }
}

/// Client-credentials grant against the tenant's identity endpoint. A
/// rejection here is fatal for the whole run.
async fn fetch_token(
    http_client: &ClientWithMiddleware,
    credentials: &PowerBiCredentials,
    authority_url: &str,
) -> Result<String, ServiceError> {
    let url = format!("{authority_url}/{}/oauth2/token", credentials.tenant_id);
    let mut payload = HashMap::new();
    payload.insert("grant_type", "client_credentials");
    payload.insert("resource", consts::POWER_BI_RESOURCE);
    payload.insert("client_id", credentials.client_id.as_str());
    payload.insert("client_secret", credentials.client_secret.as_str());

    let response = http_client
        .post(url)
        .form(&payload)
        .header(consts::ACCEPT_HEADER, "application/json")
        .send()
        .await
        .map_err(|e| ServiceError::Auth(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ServiceError::Auth(format!(
            "token endpoint returned {status}"
        )));
    }

    // The token itself must never be logged.
    response
        .json::<TokenResponse>()
        .await
        .map(|token| token.access_token)
        .map_err(|e| ServiceError::Auth(format!("parsing token response: {e}")))
}

fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_server_error() {
        Err(ServiceError::Transient(format!("{what} returned {status}")))
    } else if !status.is_success() {
        Err(ServiceError::Api(format!("{what} returned {status}")))
    } else {
        Ok(response)
    }
}
