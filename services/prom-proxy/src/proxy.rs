//! Authenticated forwarding to the upstream Prometheus API
//!
//! Receives inbound requests, builds the upstream URL, captures POST bodies,
//! attaches the bearer headers produced by the auth client, and relays the
//! upstream response verbatim (including error status codes from upstream).
//!
//! Inbound request headers are NOT copied upstream — the managed backend
//! only needs the injected Authorization header, and forwarding
//! client-supplied headers has caused content-negotiation surprises.
//! Failures before dispatch produce a local 500; transport failures map to
//! 502/504. There is no retry at this layer; callers re-issue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use tracing::{debug, error, info, instrument, warn};

use azure_auth::AuthClient;

/// Marker substituted for sensitive header values in debug logs.
const REDACTION_MARKER: &str = "[REDACTED]";

/// Cap on buffered POST bodies.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state passed to the proxy handler via axum State extractor
#[derive(Clone)]
pub struct ProxyState {
    pub client: reqwest::Client,
    pub prometheus_url: String,
    pub auth: Arc<dyn AuthClient>,
}

/// JSON error response: {"error":{"type":"proxy_error","message":"...","request_id":"req_..."}}
fn error_response(status: StatusCode, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": "proxy_error",
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Build the upstream URL from the configured base and the inbound request.
/// The raw query string rides along only for GET; POST carries its
/// parameters in the body.
pub fn build_upstream_url(prometheus_url: &str, method: &Method, uri: &Uri) -> String {
    let mut upstream_url = format!("{}{}", prometheus_url.trim_end_matches('/'), uri.path());
    if *method == Method::GET {
        if let Some(query) = uri.query() {
            upstream_url = format!("{upstream_url}?{query}");
        }
    }
    upstream_url
}

/// Log-safe copy of headers: values under Authorization and Cookie are
/// masked, everything else passes through preserving multi-value
/// semantics. Used only for debug logging of the outbound request.
pub fn redact_headers(headers: &HeaderMap) -> HeaderMap {
    let mut redacted = HeaderMap::new();
    for (name, value) in headers {
        if name == header::AUTHORIZATION || name == header::COOKIE {
            redacted.insert(name.clone(), HeaderValue::from_static(REDACTION_MARKER));
        } else {
            redacted.append(name.clone(), value.clone());
        }
    }
    redacted
}

/// Forward one inbound request to the upstream Prometheus server and relay
/// the response.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn forward_request(
    state: &ProxyState,
    request: Request<Body>,
    request_id: String,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|connect| connect.0.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    info!(url = %uri, remote_addr = %remote_addr, "processing request");

    let upstream_url = build_upstream_url(&state.prometheus_url, &method, &uri);

    // Capture the body for POST so it can be both logged and forwarded;
    // all other methods forward no body.
    let body_bytes = if method == Method::POST {
        match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!(error = %e, "failed to read request body");
                crate::metrics::record_request(500, method.as_str(), started.elapsed().as_secs_f64());
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &format!("failed to read request body: {e}"),
                    &request_id,
                );
            }
        }
    } else {
        None
    };

    // Inbound headers are not copied upstream; only injected auth headers
    // (plus the form content type for POST) are attached.
    let mut headers = HeaderMap::new();
    if body_bytes.is_some() {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
    }

    let client_headers = match state.auth.get_headers().await {
        Ok(client_headers) => client_headers,
        Err(e) => {
            error!(error = %e, "failed to create client headers");
            crate::metrics::record_upstream_error("auth");
            crate::metrics::record_request(500, method.as_str(), started.elapsed().as_secs_f64());
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("failed to create client headers: {e}"),
                &request_id,
            );
        }
    };
    for client_header in &client_headers {
        let name = match HeaderName::from_bytes(client_header.key.as_bytes()) {
            Ok(name) => name,
            Err(e) => {
                warn!(header = %client_header.key, error = %e, "skipping invalid header name");
                continue;
            }
        };
        let value = match HeaderValue::from_str(&client_header.value) {
            Ok(value) => value,
            Err(e) => {
                warn!(header = %client_header.key, error = %e, "skipping invalid header value");
                continue;
            }
        };
        headers.insert(name, value);
    }

    debug!(
        url = %upstream_url,
        headers = ?redact_headers(&headers),
        body = %body_bytes
            .as_ref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default(),
        "forwarding request to upstream prometheus"
    );

    let mut outbound = state
        .client
        .request(method.clone(), &upstream_url)
        .headers(headers);
    if let Some(bytes) = body_bytes {
        outbound = outbound.body(bytes);
    }

    // Runs inside the inbound request's task: a caller disconnect drops
    // this future and aborts the upstream call with it.
    let upstream = match outbound.send().await {
        Ok(upstream) => upstream,
        Err(e) => {
            let (status, error_type) = if e.is_timeout() {
                (StatusCode::GATEWAY_TIMEOUT, "timeout")
            } else {
                (StatusCode::BAD_GATEWAY, "connection")
            };
            error!(error = %e, "failed to call upstream");
            crate::metrics::record_upstream_error(error_type);
            crate::metrics::record_request(
                status.as_u16(),
                method.as_str(),
                started.elapsed().as_secs_f64(),
            );
            return error_response(
                status,
                &format!("failed to call upstream: {e}"),
                &request_id,
            );
        }
    };

    // Relay the upstream response verbatim: all headers, the status code
    // (4xx/5xx included), and the body byte-for-byte.
    let status = upstream.status();
    let mut response = Response::builder().status(status);
    for (name, value) in upstream.headers() {
        response = response.header(name, value);
    }

    info!(status_code = status.as_u16(), "request completed");
    crate::metrics::record_request(
        status.as_u16(),
        method.as_str(),
        started.elapsed().as_secs_f64(),
    );

    // A mid-stream copy failure can only be logged; the status line is
    // already committed.
    let body_stream = upstream
        .bytes_stream()
        .inspect_err(|e| error!(error = %e, "failed to copy response body"));

    response
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|e| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("response build error: {e}"),
                &request_id,
            )
        })
}
