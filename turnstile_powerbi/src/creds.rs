use serde::Deserialize;

use crate::rest::ServiceError;

/// Credentials for the service principal the pipeline runs as.
///
/// The tenant id comes from the CLI; client id and secret come from the
/// environment. The secret is never logged or persisted.
#[derive(Deserialize, Default, Clone)]
pub struct PowerBiCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl PowerBiCredentials {
    /// Perform simple field validation to catch bad input before a network
    /// call is attempted.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.tenant_id.is_empty() || self.client_id.is_empty() || self.client_secret.is_empty()
        {
            return Err(ServiceError::Auth(
                "credentials are missing; tenant_id, CLIENT_ID, and CLIENT_SECRET must all be set"
                    .to_owned(),
            ));
        }
        Ok(())
    }
}

// The secret must never reach logs, so Debug is written by hand.
impl std::fmt::Debug for PowerBiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerBiCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}
