//! Authentication client seam
//!
//! [`AuthClient`] is the only interface the forwarding path depends on.
//! Swapping identity providers means implementing this trait; nothing
//! Azure-specific leaks past it.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn AuthClient>` shared across request tasks).

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use common::Secret;
use tracing::{debug, error, info};

use crate::confidential::ConfidentialClient;
use crate::constants::{CLIENT_ID_ENV, CLIENT_ID_PLACEHOLDER, WORKLOAD_IDENTITY_TOKEN_PATH};
use crate::error::{Error, Result};
use crate::token;
use crate::workload::WorkloadIdentityCredential;

/// One header to attach to the outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHeader {
    pub key: String,
    pub value: String,
}

/// Abstraction over credential backends.
///
/// The forwarding handler calls `get_headers` per request and attaches the
/// result verbatim; it never sees tokens, strategies, or provider errors
/// beyond this crate's [`Error`].
pub trait AuthClient: Send + Sync {
    /// Produce a bearer token for one outbound request. May be served from
    /// a cache; each request gets its own value.
    fn acquire_token(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;

    /// Headers required to authenticate one outbound request. Propagates
    /// acquisition errors untouched.
    fn get_headers(&self) -> Pin<Box<dyn Future<Output = Result<Vec<ClientHeader>>> + Send + '_>> {
        Box::pin(async move {
            let token = self.acquire_token().await?;
            Ok(vec![ClientHeader {
                key: "Authorization".to_string(),
                value: format!("Bearer {token}"),
            }])
        })
    }
}

/// The credential strategy established at startup. Exactly one of the two
/// modes is active for the process lifetime.
enum CredentialStrategy {
    AppSecret(ConfidentialClient),
    WorkloadIdentity(WorkloadIdentityCredential),
}

/// Azure AD credential client.
///
/// Construct with [`AzureClient::new`], call [`AzureClient::init_client`]
/// exactly once before serving traffic, then share as `Arc<dyn AuthClient>`.
pub struct AzureClient {
    tenant_id: String,
    client_id: String,
    client_secret: Option<Secret<String>>,
    http: reqwest::Client,
    strategy: Option<CredentialStrategy>,
}

impl AzureClient {
    pub fn new(tenant_id: &str, client_id: &str, client_secret: Option<Secret<String>>) -> Self {
        Self {
            tenant_id: tenant_id.to_owned(),
            client_id: client_id.to_owned(),
            client_secret,
            http: reqwest::Client::new(),
            strategy: None,
        }
    }

    /// Choose and construct the credential strategy.
    ///
    /// A configured, non-empty client secret selects shared-secret mode;
    /// otherwise federated workload identity is used. Construction failures
    /// are fatal — the caller must not begin serving.
    pub fn init_client(&mut self) -> Result<()> {
        info!(
            client_id = %self.client_id,
            tenant_id = %self.tenant_id,
            "using azure client for authentication"
        );

        let authority = token::authority_url(&self.tenant_id)?;

        let strategy = match &self.client_secret {
            Some(secret) if !secret.expose().is_empty() => {
                debug!(
                    client_id = %self.client_id,
                    tenant_id = %self.tenant_id,
                    "creating new confidential client"
                );
                CredentialStrategy::AppSecret(ConfidentialClient::new(
                    self.http.clone(),
                    &authority,
                    &self.client_id,
                    secret.clone(),
                )?)
            }
            _ => {
                // Workload identity bootstrapping can leave the id
                // unresolved at process start; try the environment before
                // giving up.
                if !validate_client_id(&self.client_id) {
                    self.refresh_client_id()?;
                }
                debug!(
                    client_id = %self.client_id,
                    tenant_id = %self.tenant_id,
                    "creating new workload identity credential"
                );
                CredentialStrategy::WorkloadIdentity(WorkloadIdentityCredential::new(
                    self.http.clone(),
                    &authority,
                    &self.client_id,
                    PathBuf::from(WORKLOAD_IDENTITY_TOKEN_PATH),
                )?)
            }
        };

        self.strategy = Some(strategy);
        Ok(())
    }

    /// Replace the in-memory client id from the environment.
    fn refresh_client_id(&mut self) -> Result<()> {
        let client_id = std::env::var(CLIENT_ID_ENV).unwrap_or_default();
        if !validate_client_id(&client_id) {
            error!(client_id = %client_id, "AZURE_CLIENT_ID environment variable is unset");
            return Err(Error::UnsetClientId);
        }

        self.client_id = client_id;
        Ok(())
    }
}

/// A usable client id is non-empty and not the templating placeholder.
pub fn validate_client_id(client_id: &str) -> bool {
    !(client_id.is_empty() || client_id == CLIENT_ID_PLACEHOLDER)
}

impl AuthClient for AzureClient {
    fn acquire_token(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            match &self.strategy {
                Some(CredentialStrategy::AppSecret(client)) => client.acquire_token().await,
                Some(CredentialStrategy::WorkloadIdentity(cred)) => cred.get_token().await,
                None => Err(Error::NotInitialized),
            }
        })
    }
}
