//! Token endpoint wire protocol
//!
//! Both credential strategies ultimately POST a form to the tenant's
//! `/oauth2/v2.0/token` endpoint; they differ only in how the client proves
//! its identity (shared secret vs. platform-issued assertion).

use serde::Deserialize;

use crate::constants::AUTHORITY_PREFIX;
use crate::error::{Error, Result};

/// Assertion type for the federated (workload identity) exchange.
pub(crate) const CLIENT_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Response from the token endpoint.
///
/// `expires_in` is a delta in seconds from the response time; the
/// confidential client converts it to an absolute instant when caching.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default)]
    pub expires_in: u64,
}

/// Build the tenant-scoped authority URL
/// (`https://login.microsoftonline.com/<tenant>`).
pub fn authority_url(tenant_id: &str) -> Result<String> {
    if tenant_id.is_empty() || tenant_id.contains(['/', '?', '#']) || tenant_id.trim() != tenant_id
    {
        return Err(Error::CredentialConstruction(format!(
            "malformed tenant id: {tenant_id:?}"
        )));
    }
    Ok(format!("{AUTHORITY_PREFIX}{tenant_id}"))
}

/// Token endpoint under an authority URL.
pub(crate) fn token_endpoint(authority: &str) -> String {
    format!("{}/oauth2/v2.0/token", authority.trim_end_matches('/'))
}

/// Authorities must be absolute http(s) URLs. Tests point this at a
/// loopback server, which is why plain http is allowed.
pub(crate) fn validate_authority(authority: &str) -> Result<()> {
    if authority.starts_with("https://") || authority.starts_with("http://") {
        Ok(())
    } else {
        Err(Error::CredentialConstruction(format!(
            "authority must be an http(s) URL, got: {authority}"
        )))
    }
}

/// POST a credential grant to the token endpoint and parse the response.
///
/// Transport failures and non-2xx responses both map to `UpstreamAuth`:
/// the identity provider either could not be reached or rejected the
/// exchange, and neither is retried here.
pub(crate) async fn request_token(
    client: &reqwest::Client,
    endpoint: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse> {
    let response = client
        .post(endpoint)
        .form(form)
        .send()
        .await
        .map_err(|e| Error::UpstreamAuth(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::UpstreamAuth(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::UpstreamAuth(format!("invalid token response: {e}")))
}
