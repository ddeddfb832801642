//! Mock Prometheus status payloads
//!
//! Consumers like Kiali probe `/api/v1/status/*` before issuing queries.
//! The managed backend does not serve these, so the proxy answers locally
//! with fixed payloads. Field names mirror the upstream server's API schema
//! (including its Go runtime fields); the values are static placeholders.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Envelope matching the Prometheus API response shape.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse<T: Serialize> {
    pub status: &'static str,
    pub data: T,
}

pub fn success<T: Serialize>(data: T) -> StatusResponse<T> {
    StatusResponse {
        status: "success",
        data,
    }
}

/// Payload for `/api/v1/status/config`: a minimal scrape config blob.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigData {
    pub yaml: &'static str,
}

pub fn config_data() -> ConfigData {
    ConfigData {
        yaml: "global:\n  scrape_interval: 15s\n",
    }
}

/// Payload for `/api/v1/status/buildinfo`, mimicking Prometheus 3.4.1.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfoData {
    version: &'static str,
    revision: &'static str,
    branch: &'static str,
    build_user: &'static str,
    build_date: String,
    go_version: &'static str,
}

impl Default for BuildInfoData {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildInfoData {
    pub fn new() -> Self {
        Self {
            // https://github.com/prometheus/prometheus/releases/tag/v3.4.1
            version: "3.4.1",
            revision: "aea6503d9bbaad6c5faff3ecf6f1025213356c92",
            branch: "main",
            build_user: "prombot@github",
            build_date: Utc::now().format("%Y%m%d-%H:%M:%S").to_string(),
            go_version: "go1.24.4",
        }
    }
}

/// Payload for `/api/v1/status/runtimeinfo`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfoData {
    start_time: String,
    #[serde(rename = "CWD")]
    cwd: &'static str,
    reload_config_success: bool,
    last_config_time: String,
    time_series_count: i64,
    corruption_count: i64,
    goroutine_count: i64,
    #[serde(rename = "GOMAXPROCS")]
    gomaxprocs: i64,
    #[serde(rename = "GOGC")]
    gogc: &'static str,
    #[serde(rename = "GODEBUG")]
    godebug: &'static str,
    storage_retention: &'static str,
}

impl Default for RuntimeInfoData {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeInfoData {
    pub fn new() -> Self {
        Self {
            start_time: rfc3339_now(),
            cwd: "/",
            reload_config_success: true,
            last_config_time: rfc3339_now(),
            time_series_count: 0,
            corruption_count: 0,
            goroutine_count: 0,
            gomaxprocs: 1,
            gogc: "",
            godebug: "",
            // Kiali rejects an empty retention string
            storage_retention: "30d",
        }
    }

    /// Per-request view: identical to the startup data except for a
    /// freshened last-config timestamp.
    pub fn snapshot(&self) -> Self {
        let mut snapshot = self.clone();
        snapshot.last_config_time = rfc3339_now();
        snapshot
    }
}

fn rfc3339_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}
