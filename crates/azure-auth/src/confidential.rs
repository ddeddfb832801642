//! Confidential client credential (shared-secret mode)
//!
//! Mirrors the app-registration flow: a silent, cache-backed lookup first,
//! then a full client-credentials exchange when the cache cannot satisfy the
//! request. Cache-first ordering keeps identity-provider calls off the hot
//! path; the cache's expiry skew keeps near-expiry tokens out of circulation.

use std::time::{Duration, Instant};

use common::Secret;
use tokio::sync::RwLock;
use tracing::debug;

use crate::constants::PROMETHEUS_SCOPE;
use crate::error::{Error, Result};
use crate::token;

/// Cached tokens within this window of expiry are treated as misses.
const EXPIRY_SKEW: Duration = Duration::from_secs(120);

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// OAuth2 confidential client holding a shared secret.
///
/// The token cache is internal and safe for concurrent acquisition; request
/// tasks share one instance with no external locking.
pub struct ConfidentialClient {
    http: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    client_secret: Secret<String>,
    cache: RwLock<Option<CachedToken>>,
}

impl ConfidentialClient {
    /// Construct from a tenant authority URL, client id, and secret.
    pub fn new(
        http: reqwest::Client,
        authority: &str,
        client_id: &str,
        client_secret: Secret<String>,
    ) -> Result<Self> {
        token::validate_authority(authority)?;
        if client_id.is_empty() {
            return Err(Error::CredentialConstruction("client id is empty".into()));
        }
        if client_secret.expose().is_empty() {
            return Err(Error::CredentialConstruction(
                "client secret is empty".into(),
            ));
        }

        Ok(Self {
            http,
            token_endpoint: token::token_endpoint(authority),
            client_id: client_id.to_owned(),
            client_secret,
            cache: RwLock::new(None),
        })
    }

    /// Silent acquisition: consult the cache without touching the identity
    /// provider. `None` when no token is cached or the cached token is
    /// within the expiry skew.
    pub async fn acquire_token_silent(&self) -> Option<String> {
        let cache = self.cache.read().await;
        match cache.as_ref() {
            Some(cached) if cached.expires_at > Instant::now() + EXPIRY_SKEW => {
                Some(cached.token.clone())
            }
            _ => None,
        }
    }

    /// Full client-credentials exchange against the fixed scope. Updates
    /// the cache on success.
    pub async fn acquire_token_by_credential(&self) -> Result<String> {
        let response = token::request_token(
            &self.http,
            &self.token_endpoint,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("client_secret", self.client_secret.expose()),
                ("scope", PROMETHEUS_SCOPE),
            ],
        )
        .await?;

        if response.access_token.is_empty() {
            return Err(Error::EmptyToken);
        }

        // expires_in is untrusted provider input; an absurd value would
        // overflow Instant arithmetic. Skip caching instead of panicking.
        if let Some(expires_at) =
            Instant::now().checked_add(Duration::from_secs(response.expires_in))
        {
            let mut cache = self.cache.write().await;
            *cache = Some(CachedToken {
                token: response.access_token.clone(),
                expires_at,
            });
        }

        Ok(response.access_token)
    }

    /// Acquire a token, preferring the cache and falling back to a full
    /// exchange. An empty final token is never returned as success.
    pub async fn acquire_token(&self) -> Result<String> {
        debug!(client_id = %self.client_id, "acquiring azure token using app registration credentials");

        if let Some(cached) = self.acquire_token_silent().await {
            debug!("acquired azure token using cache");
            return Ok(cached);
        }

        debug!("token cache miss, acquiring a new token");
        let acquired = self.acquire_token_by_credential().await?;
        debug!("acquired azure token successfully");
        Ok(acquired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use axum::Json;
    use axum::http::StatusCode;
    use tokio::net::TcpListener;

    /// Start a loopback token endpoint returning a fixed response, counting
    /// how many exchanges actually hit the provider.
    async fn start_token_server(
        status: StatusCode,
        body: serde_json::Value,
    ) -> (String, Arc<AtomicU64>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = calls.clone();

        tokio::spawn(async move {
            let app = axum::Router::new().route(
                "/oauth2/v2.0/token",
                axum::routing::post(move || {
                    let calls = calls_clone.clone();
                    let body = body.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        (status, Json(body))
                    }
                }),
            );
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), calls)
    }

    fn client_for(authority: &str) -> ConfidentialClient {
        ConfidentialClient::new(
            reqwest::Client::new(),
            authority,
            "client-1",
            Secret::new("s3cret".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_empty_secret() {
        let result = ConfidentialClient::new(
            reqwest::Client::new(),
            "https://login.microsoftonline.com/t1",
            "client-1",
            Secret::new(String::new()),
        );
        assert!(matches!(result, Err(Error::CredentialConstruction(_))));
    }

    #[test]
    fn new_rejects_empty_client_id() {
        let result = ConfidentialClient::new(
            reqwest::Client::new(),
            "https://login.microsoftonline.com/t1",
            "",
            Secret::new("s3cret".to_string()),
        );
        assert!(matches!(result, Err(Error::CredentialConstruction(_))));
    }

    #[test]
    fn new_rejects_malformed_authority() {
        let result = ConfidentialClient::new(
            reqwest::Client::new(),
            "not-a-url",
            "client-1",
            Secret::new("s3cret".to_string()),
        );
        assert!(matches!(result, Err(Error::CredentialConstruction(_))));
    }

    #[tokio::test]
    async fn cold_cache_performs_exactly_one_exchange() {
        let (authority, calls) = start_token_server(
            StatusCode::OK,
            serde_json::json!({"access_token": "tok-1", "expires_in": 3600}),
        )
        .await;

        let client = client_for(&authority);
        assert!(client.acquire_token_silent().await.is_none());

        let token = client.acquire_token().await.unwrap();
        assert_eq!(token, "tok-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_token_skips_the_identity_provider() {
        let (authority, calls) = start_token_server(
            StatusCode::OK,
            serde_json::json!({"access_token": "tok-1", "expires_in": 3600}),
        )
        .await;

        let client = client_for(&authority);
        client.acquire_token().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Second acquisition must come from cache with no exchange call
        let token = client.acquire_token().await.unwrap();
        assert_eq!(token, "tok-1");
        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "cached token must not trigger a credential exchange"
        );
    }

    #[tokio::test]
    async fn token_expiring_within_skew_triggers_new_exchange() {
        // expires_in below the 120s skew: treated as a miss on the next call
        let (authority, calls) = start_token_server(
            StatusCode::OK,
            serde_json::json!({"access_token": "tok-1", "expires_in": 30}),
        )
        .await;

        let client = client_for(&authority);
        client.acquire_token().await.unwrap();
        client.acquire_token().await.unwrap();
        assert_eq!(
            calls.load(Ordering::SeqCst),
            2,
            "near-expiry cached token must fall back to a fresh exchange"
        );
    }

    #[tokio::test]
    async fn provider_rejection_surfaces_as_upstream_auth() {
        let (authority, _calls) = start_token_server(
            StatusCode::UNAUTHORIZED,
            serde_json::json!({"error": "invalid_client", "error_description": "AADSTS7000215"}),
        )
        .await;

        let client = client_for(&authority);
        let err = client.acquire_token().await.unwrap_err();
        match err {
            Error::UpstreamAuth(msg) => {
                assert!(msg.contains("401"), "got: {msg}");
            }
            other => panic!("expected UpstreamAuth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_access_token_is_never_returned_as_success() {
        let (authority, _calls) = start_token_server(
            StatusCode::OK,
            serde_json::json!({"access_token": "", "expires_in": 3600}),
        )
        .await;

        let client = client_for(&authority);
        let err = client.acquire_token().await.unwrap_err();
        assert!(matches!(err, Error::EmptyToken));
        // And an empty token is never cached
        assert!(client.acquire_token_silent().await.is_none());
    }

    #[tokio::test]
    async fn absurd_expiry_skips_the_cache_without_panicking() {
        let (authority, calls) = start_token_server(
            StatusCode::OK,
            serde_json::json!({"access_token": "tok-1", "expires_in": u64::MAX}),
        )
        .await;

        let client = client_for(&authority);
        let token = client.acquire_token().await.unwrap();
        assert_eq!(token, "tok-1");

        // The token is still returned but never cached, so the next
        // acquisition performs a fresh exchange.
        assert!(client.acquire_token_silent().await.is_none());
        client.acquire_token().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_provider_surfaces_as_upstream_auth() {
        let client = client_for("http://127.0.0.1:1");
        let err = client.acquire_token().await.unwrap_err();
        assert!(matches!(err, Error::UpstreamAuth(_)));
    }
}
