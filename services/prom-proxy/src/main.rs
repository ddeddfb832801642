//! Prometheus authentication proxy
//!
//! Single-binary service that:
//! 1. Acquires Azure AD tokens (client secret or federated workload identity)
//! 2. Listens for Prometheus API requests
//! 3. Injects `Authorization: Bearer <token>` headers
//! 4. Forwards to an Azure Monitor managed Prometheus endpoint

mod config;
mod metrics;
mod proxy;
mod status;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use azure_auth::AzureClient;

use crate::config::Config;
use crate::proxy::ProxyState;
use crate::status::{BuildInfoData, RuntimeInfoData, config_data, success};

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    proxy: ProxyState,
    runtime_info: Arc<RuntimeInfoData>,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// The proxied Prometheus API surface is registered path by path so that
/// anything unrecognized falls through to the 404 handler instead of
/// reaching the upstream unauthenticated paths.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/status/config", get(status_config_handler))
        .route("/api/v1/status/buildinfo", get(status_buildinfo_handler))
        .route("/api/v1/status/runtimeinfo", get(status_runtimeinfo_handler))
        .route("/api/v1/query", any(api_handler))
        .route("/api/v1/query_range", any(api_handler))
        .route("/api/v1/series", any(api_handler))
        .route("/api/v1/labels", any(api_handler))
        .route("/api/v1/label/{name}/values", any(api_handler))
        .route("/api/v1/metadata", any(api_handler))
        .route("/api/v1/format_query", any(api_handler))
        .route("/api/v1/parse_query", any(api_handler))
        .fallback(not_found_handler)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    // Initialize tracing with JSON output; LOG_LEVEL / RUST_LOG override
    // the configured level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new(&config.proxy.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting prometheus-proxy");
    info!(
        path = %config_path.display(),
        listen_addr = %config.proxy.listen_addr,
        prometheus_url = %config.proxy.prometheus_url,
        "configuration loaded"
    );

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // Credential init is fatal on failure: a proxy that cannot
    // authenticate must not accept traffic.
    let mut azure = AzureClient::new(
        &config.azure.tenant_id,
        &config.azure.client_id,
        config.azure.client_secret.clone(),
    );
    azure
        .init_client()
        .context("failed to initialize azure credential")?;

    let proxy_state = ProxyState {
        client: reqwest::Client::new(),
        prometheus_url: config.proxy.prometheus_url.clone(),
        auth: Arc::new(azure),
    };

    let app_state = AppState {
        proxy: proxy_state,
        runtime_info: Arc::new(RuntimeInfoData::new()),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.proxy.max_connections);

    let listener = TcpListener::bind(config.proxy.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.proxy.listen_addr))?;

    info!(addr = %config.proxy.listen_addr, "accepting requests");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

/// Liveness endpoint for Kubernetes probes.
async fn healthz_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

async fn status_config_handler() -> impl IntoResponse {
    axum::Json(success(config_data()))
}

async fn status_buildinfo_handler() -> impl IntoResponse {
    axum::Json(success(BuildInfoData::new()))
}

async fn status_runtimeinfo_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(success(state.runtime_info.snapshot()))
}

/// Handler behind every proxied Prometheus API route.
async fn api_handler(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    proxy::forward_request(&state.proxy, request, request_id).await
}

/// Unregistered paths never reach the upstream.
async fn not_found_handler(request: axum::http::Request<axum::body::Body>) -> impl IntoResponse {
    warn!(method = %request.method(), path = %request.uri().path(), "unhandled path");
    (
        axum::http::StatusCode::NOT_FOUND,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "error": {
                "type": "proxy_error",
                "message": format!("no handler for {}", request.uri().path()),
            }
        })
        .to_string(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
