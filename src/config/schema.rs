//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Upstream listener the relay forwards to.
    pub upstream: UpstreamConfig,

    /// Readiness probing of the upstream.
    pub readiness: ReadinessConfig,

    /// Path and header rewrites applied to forwarded requests.
    pub routing: RoutingConfig,

    /// Reply size limits imposed by the trigger protocol.
    pub limits: LimitsConfig,

    /// Upstream connection pool.
    pub pool: PoolConfig,

    /// Inbound invocation driver.
    pub invoke: InvokeConfig,

    /// Function identity reported to the upstream in the invocation context.
    pub function: FunctionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Upstream listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream host (e.g., "127.0.0.1").
    pub host: String,

    /// Upstream port.
    pub port: u16,

    /// Maximum wait for a full upstream response, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            timeout_ms: 30_000,
        }
    }
}

impl UpstreamConfig {
    /// Base URL of the upstream, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Protocol used to decide whether the upstream is up.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessProtocol {
    #[default]
    Http,
    Tcp,
}

impl std::str::FromStr for ReadinessProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "tcp" => Ok(Self::Tcp),
            other => Err(format!("unknown readiness protocol: {}", other)),
        }
    }
}

/// Readiness check configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Port to check. Falls back to the upstream port when unset.
    pub port: Option<u16>,

    /// Path requested by HTTP readiness checks.
    pub path: String,

    pub protocol: ReadinessProtocol,

    /// Lowest HTTP status treated as "not ready".
    pub min_unhealthy_status: u16,

    /// Let the upstream boot in the background if the startup check runs long.
    pub async_init: bool,

    /// Delay between checks in milliseconds.
    pub interval_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            port: None,
            path: "/".to_string(),
            protocol: ReadinessProtocol::Http,
            min_unhealthy_status: 500,
            async_init: false,
            interval_ms: 10,
        }
    }
}

/// Rewrites applied on the way upstream.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RoutingConfig {
    /// Prefix stripped from every inbound path.
    pub remove_base_path: Option<String>,

    /// Path that non-HTTP events are POSTed to.
    pub pass_through_path: String,

    /// Header renamed to `authorization` before forwarding.
    pub authorization_source: Option<String>,

    /// Upstream statuses reported to the runtime as failed invocations,
    /// e.g. "500,502-504".
    pub error_status_codes: Option<String>,

    /// Compress upstream responses when the event's `accept-encoding`
    /// allows it.
    pub compression: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            remove_base_path: None,
            pass_through_path: "/events".to_string(),
            authorization_source: None,
            error_status_codes: None,
            compression: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest upstream body that fits into a reply.
    pub max_response_bytes: usize,

    /// Largest event accepted on the local invoke endpoint.
    pub max_event_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_response_bytes: 6 * 1024 * 1024, // 6MB
            max_event_bytes: 6 * 1024 * 1024,
        }
    }
}

/// Upstream connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrent upstream requests.
    pub max_connections: usize,

    /// Idle keep-alive connections kept per host.
    pub max_idle_per_host: usize,

    pub idle_timeout_secs: u64,

    /// TCP keepalive in seconds (0 disables it).
    pub keepalive_secs: u64,

    pub nodelay: bool,

    /// Talk HTTP/2 with prior knowledge instead of HTTP/1.1.
    pub http2_only: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 64,
            max_idle_per_host: 32,
            idle_timeout_secs: 60,
            keepalive_secs: 30,
            nodelay: true,
            http2_only: false,
        }
    }
}

/// Where invocations come from.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvokeMode {
    /// Poll the hosting runtime's invocation API.
    #[default]
    RuntimeApi,
    /// Serve a local HTTP invoke endpoint.
    Local,
}

impl std::str::FromStr for InvokeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "runtime_api" | "runtime-api" => Ok(Self::RuntimeApi),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown invoke mode: {}", other)),
        }
    }
}

/// Inbound driver configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct InvokeConfig {
    pub mode: InvokeMode,

    /// Runtime API authority (e.g., "127.0.0.1:9001").
    pub runtime_api: Option<String>,

    /// Bind address of the local invoke endpoint.
    pub bind_address: String,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            mode: InvokeMode::RuntimeApi,
            runtime_api: None,
            bind_address: "127.0.0.1:9000".to_string(),
        }
    }
}

/// Function settings published by the hosting runtime.
///
/// Field names match the `env_config` object of the invocation context.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct FunctionConfig {
    pub function_name: String,

    /// Memory size in MB.
    pub memory: i32,

    pub version: String,

    pub log_stream: String,

    pub log_group: String,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
