//! Error types for credential acquisition

/// Errors from credential construction and token acquisition.
///
/// Construction-time variants (`CredentialConstruction`, `UnsetClientId`)
/// are fatal at startup — the process must not begin serving. The
/// acquisition-time variants surface per-request at the forwarding handler
/// boundary as a 500 response.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A token was requested before `init_client` established a strategy.
    #[error("azure client not initialized")]
    NotInitialized,

    /// Malformed secret, authority, or identifier at construction time.
    #[error("credential construction failed: {0}")]
    CredentialConstruction(String),

    /// Federated mode could not resolve a usable client id.
    #[error("environment variable AZURE_CLIENT_ID is unset")]
    UnsetClientId,

    /// The identity provider was reachable but rejected or failed the
    /// exchange (includes failures reading the workload assertion file).
    #[error("token acquisition failed: {0}")]
    UpstreamAuth(String),

    /// The provider returned a technically-successful but empty token.
    /// Such a token must never be forwarded.
    #[error("empty authentication token")]
    EmptyToken,
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
