//! Workload identity credential (federated mode)
//!
//! Exchanges a platform-mounted service account token for a backend-scoped
//! access token using the client-assertion grant. No secret is stored in the
//! process; the assertion file is re-read on every acquisition so rotated
//! tokens are picked up without a restart.

use std::path::PathBuf;

use tracing::debug;

use crate::constants::PROMETHEUS_SCOPE;
use crate::error::{Error, Result};
use crate::token;

pub struct WorkloadIdentityCredential {
    http: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    token_file: PathBuf,
}

impl WorkloadIdentityCredential {
    /// Construct from a tenant authority URL, client id, and the path of
    /// the platform-issued token file.
    pub fn new(
        http: reqwest::Client,
        authority: &str,
        client_id: &str,
        token_file: PathBuf,
    ) -> Result<Self> {
        token::validate_authority(authority)?;
        if client_id.is_empty() {
            return Err(Error::CredentialConstruction("client id is empty".into()));
        }

        Ok(Self {
            http,
            token_endpoint: token::token_endpoint(authority),
            client_id: client_id.to_owned(),
            token_file,
        })
    }

    /// Read the federated assertion and exchange it directly for an access
    /// token against the fixed scope. No cache sits in front of this path.
    pub async fn get_token(&self) -> Result<String> {
        debug!(client_id = %self.client_id, "acquiring azure token using workload identity credentials");

        let assertion = tokio::fs::read_to_string(&self.token_file)
            .await
            .map_err(|e| {
                Error::UpstreamAuth(format!(
                    "failed to read workload identity token file {}: {e}",
                    self.token_file.display()
                ))
            })?;

        let response = token::request_token(
            &self.http,
            &self.token_endpoint,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("client_assertion_type", token::CLIENT_ASSERTION_TYPE),
                ("client_assertion", assertion.trim()),
                ("scope", PROMETHEUS_SCOPE),
            ],
        )
        .await?;

        if response.access_token.is_empty() {
            return Err(Error::EmptyToken);
        }

        debug!("acquired azure token successfully");
        Ok(response.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use axum::Json;
    use axum::http::StatusCode;
    use tokio::net::TcpListener;

    type FormCapture = Arc<Mutex<Option<HashMap<String, String>>>>;

    /// Loopback token endpoint that records the submitted grant form.
    async fn start_token_server(
        status: StatusCode,
        body: serde_json::Value,
    ) -> (String, FormCapture) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured: FormCapture = Arc::new(Mutex::new(None));
        let captured_clone = captured.clone();

        tokio::spawn(async move {
            let app = axum::Router::new().route(
                "/oauth2/v2.0/token",
                axum::routing::post(
                    move |axum::Form(form): axum::Form<HashMap<String, String>>| {
                        let captured = captured_clone.clone();
                        let body = body.clone();
                        async move {
                            *captured.lock().unwrap() = Some(form);
                            (status, Json(body))
                        }
                    },
                ),
            );
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), captured)
    }

    fn write_assertion_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn new_rejects_empty_client_id() {
        let result = WorkloadIdentityCredential::new(
            reqwest::Client::new(),
            "https://login.microsoftonline.com/t1",
            "",
            PathBuf::from("/nonexistent"),
        );
        assert!(matches!(result, Err(Error::CredentialConstruction(_))));
    }

    #[tokio::test]
    async fn exchanges_file_assertion_for_access_token() {
        let (authority, captured) = start_token_server(
            StatusCode::OK,
            serde_json::json!({"access_token": "federated-tok", "expires_in": 3600}),
        )
        .await;
        let assertion_file = write_assertion_file("eyJhbGciOiJSUzI1NiJ9.assertion\n");

        let cred = WorkloadIdentityCredential::new(
            reqwest::Client::new(),
            &authority,
            "client-wi",
            assertion_file.path().to_path_buf(),
        )
        .unwrap();

        let token = cred.get_token().await.unwrap();
        assert_eq!(token, "federated-tok");

        let form = captured.lock().unwrap().clone().expect("form captured");
        assert_eq!(form["grant_type"], "client_credentials");
        assert_eq!(form["client_id"], "client-wi");
        assert_eq!(
            form["client_assertion_type"],
            "urn:ietf:params:oauth:client-assertion-type:jwt-bearer"
        );
        // File contents are trimmed before submission
        assert_eq!(form["client_assertion"], "eyJhbGciOiJSUzI1NiJ9.assertion");
        assert_eq!(form["scope"], crate::constants::PROMETHEUS_SCOPE);
    }

    #[tokio::test]
    async fn missing_token_file_surfaces_as_upstream_auth() {
        let (authority, _captured) = start_token_server(
            StatusCode::OK,
            serde_json::json!({"access_token": "unused"}),
        )
        .await;

        let cred = WorkloadIdentityCredential::new(
            reqwest::Client::new(),
            &authority,
            "client-wi",
            PathBuf::from("/nonexistent/azure-identity-token"),
        )
        .unwrap();

        let err = cred.get_token().await.unwrap_err();
        match err {
            Error::UpstreamAuth(msg) => assert!(msg.contains("token file"), "got: {msg}"),
            other => panic!("expected UpstreamAuth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_rejection_surfaces_as_upstream_auth() {
        let (authority, _captured) = start_token_server(
            StatusCode::BAD_REQUEST,
            serde_json::json!({"error": "invalid_request"}),
        )
        .await;
        let assertion_file = write_assertion_file("assertion");

        let cred = WorkloadIdentityCredential::new(
            reqwest::Client::new(),
            &authority,
            "client-wi",
            assertion_file.path().to_path_buf(),
        )
        .unwrap();

        assert!(matches!(
            cred.get_token().await,
            Err(Error::UpstreamAuth(_))
        ));
    }

    #[tokio::test]
    async fn empty_access_token_fails_with_empty_token() {
        let (authority, _captured) = start_token_server(
            StatusCode::OK,
            serde_json::json!({"access_token": "", "expires_in": 3600}),
        )
        .await;
        let assertion_file = write_assertion_file("assertion");

        let cred = WorkloadIdentityCredential::new(
            reqwest::Client::new(),
            &authority,
            "client-wi",
            assertion_file.path().to_path_buf(),
        )
        .unwrap();

        assert!(matches!(cred.get_token().await, Err(Error::EmptyToken)));
    }
}
