//! Fixed protocol constants for Azure AD token acquisition

/// OAuth scope identifying the Azure Monitor managed Prometheus audience.
pub const PROMETHEUS_SCOPE: &str = "https://prometheus.monitor.azure.com/.default";

/// Prefix of the tenant-scoped authority URL.
pub const AUTHORITY_PREFIX: &str = "https://login.microsoftonline.com/";

/// Mount path of the platform-issued workload identity token file.
pub const WORKLOAD_IDENTITY_TOKEN_PATH: &str =
    "/var/run/secrets/azure/tokens/azure-identity-token";

/// Sentinel left behind when deployment templating fails to resolve the
/// client id (e.g. an unrendered Helm value).
pub const CLIENT_ID_PLACEHOLDER: &str = "<no value>";

/// Environment variable consulted when the configured client id is
/// missing or unresolved at process start.
pub const CLIENT_ID_ENV: &str = "AZURE_CLIENT_ID";
