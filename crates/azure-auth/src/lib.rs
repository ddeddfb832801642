//! Azure AD authentication for the Prometheus proxy
//!
//! Implements the two mutually exclusive credential strategies the proxy can
//! run with, selected once at startup:
//!
//! 1. App registration (shared secret): a confidential client that prefers a
//!    cached token and falls back to a full client-credentials exchange.
//! 2. Workload identity (federated): a platform-mounted service account token
//!    exchanged directly for a backend-scoped access token; no stored secret.
//!
//! The forwarding path depends only on the [`AuthClient`] trait — provider
//! specifics never cross this crate's boundary, so alternative credential
//! backends can be substituted without touching the proxy.

pub mod client;
pub mod confidential;
pub mod constants;
pub mod error;
pub mod token;
pub mod workload;

pub use client::{AuthClient, AzureClient, ClientHeader};
pub use confidential::ConfidentialClient;
pub use error::{Error, Result};
pub use workload::WorkloadIdentityCredential;
