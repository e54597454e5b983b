pub(crate) const AUTH_HEADER: &str = "Authorization";
pub(crate) const ACCEPT_HEADER: &str = "Accept";

pub(crate) const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";
pub(crate) const DEFAULT_API_URL: &str = "https://api.powerbi.com";
pub(crate) const POWER_BI_RESOURCE: &str = "https://analysis.windows.net/powerbi/api";
