//! Configuration loading from disk and the environment.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::{InvokeMode, RelayConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {key}")]
    Env { key: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the startup configuration: optional file, then process environment,
/// then the command-line mode, then validation.
pub fn load_from_env(path: Option<&Path>, mode: Option<InvokeMode>) -> Result<RelayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => RelayConfig::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    if let Some(mode) = mode {
        config.invoke.mode = mode;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Overlay environment variables onto `config`.
///
/// `lookup` resolves a variable name; `AWS_LWA_`-prefixed names win over the
/// bare legacy names.
pub fn apply_env_overrides<F>(config: &mut RelayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |primary: &str, legacy: Option<&str>| {
        lookup(primary).or_else(|| legacy.and_then(|name| lookup(name)))
    };

    if let Some(host) = get("AWS_LWA_HOST", Some("HOST")) {
        config.upstream.host = host;
    }
    if let Some(port) = get("AWS_LWA_PORT", Some("PORT")) {
        config.upstream.port = parse_env("AWS_LWA_PORT", port)?;
    }
    if let Some(timeout) = get("AWS_LWA_TIMEOUT_MS", None) {
        config.upstream.timeout_ms = parse_env("AWS_LWA_TIMEOUT_MS", timeout)?;
    }

    if let Some(port) = get("AWS_LWA_READINESS_CHECK_PORT", Some("READINESS_CHECK_PORT")) {
        config.readiness.port = Some(parse_env("AWS_LWA_READINESS_CHECK_PORT", port)?);
    }
    if let Some(path) = get("AWS_LWA_READINESS_CHECK_PATH", Some("READINESS_CHECK_PATH")) {
        config.readiness.path = path;
    }
    if let Some(protocol) = get("AWS_LWA_READINESS_CHECK_PROTOCOL", Some("READINESS_CHECK_PROTOCOL")) {
        config.readiness.protocol = parse_env("AWS_LWA_READINESS_CHECK_PROTOCOL", protocol)?;
    }
    if let Some(status) = get("AWS_LWA_READINESS_CHECK_MIN_UNHEALTHY_STATUS", None) {
        config.readiness.min_unhealthy_status =
            parse_env("AWS_LWA_READINESS_CHECK_MIN_UNHEALTHY_STATUS", status)?;
    }
    if let Some(async_init) = get("AWS_LWA_ASYNC_INIT", Some("ASYNC_INIT")) {
        config.readiness.async_init = parse_env("AWS_LWA_ASYNC_INIT", async_init)?;
    }

    if let Some(base) = get("AWS_LWA_REMOVE_BASE_PATH", Some("REMOVE_BASE_PATH")) {
        config.routing.remove_base_path = Some(base);
    }
    if let Some(path) = get("AWS_LWA_PASS_THROUGH_PATH", None) {
        config.routing.pass_through_path = path;
    }
    if let Some(source) = get("AWS_LWA_AUTHORIZATION_SOURCE", None) {
        config.routing.authorization_source = Some(source);
    }
    if let Some(codes) = get("AWS_LWA_ERROR_STATUS_CODES", None) {
        config.routing.error_status_codes = Some(codes);
    }
    if let Some(compression) = get("AWS_LWA_ENABLE_COMPRESSION", None) {
        config.routing.compression = parse_env("AWS_LWA_ENABLE_COMPRESSION", compression)?;
    }

    if let Some(keepalive) = get("AWS_LWA_HTTP_KEEPALIVE_SEC", None) {
        config.pool.keepalive_secs = parse_env("AWS_LWA_HTTP_KEEPALIVE_SEC", keepalive)?;
    }
    if let Some(nodelay) = get("AWS_LWA_HTTP_NODELAY", None) {
        config.pool.nodelay = parse_env("AWS_LWA_HTTP_NODELAY", nodelay)?;
    }
    if let Some(idle) = get("AWS_LWA_HTTP_POOL_IDLE_TIMEOUT_SEC", None) {
        config.pool.idle_timeout_secs = parse_env("AWS_LWA_HTTP_POOL_IDLE_TIMEOUT_SEC", idle)?;
    }
    if let Some(max_idle) = get("AWS_LWA_HTTP_POOL_MAX_IDLE", None) {
        config.pool.max_idle_per_host = parse_env("AWS_LWA_HTTP_POOL_MAX_IDLE", max_idle)?;
    }
    if let Some(http2_only) = get("AWS_LWA_HTTP_HTTP2_ONLY", None) {
        config.pool.http2_only = parse_env("AWS_LWA_HTTP_HTTP2_ONLY", http2_only)?;
    }

    if let Some(api) = get("AWS_LAMBDA_RUNTIME_API", None) {
        config.invoke.runtime_api = Some(api);
    }
    if let Some(mode) = get("AWS_LWA_INVOKE_MODE", None) {
        if !mode.trim().eq_ignore_ascii_case("buffered") {
            tracing::warn!(mode = %mode, "Response streaming is not supported, replies stay buffered");
        }
    }

    // Runtime-published; a malformed memory size reads as 0.
    let function = &mut config.function;
    if let Some(name) = get("AWS_LAMBDA_FUNCTION_NAME", None) {
        function.function_name = name;
    }
    if let Some(memory) = get("AWS_LAMBDA_FUNCTION_MEMORY_SIZE", None) {
        function.memory = memory.trim().parse().unwrap_or_default();
    }
    if let Some(version) = get("AWS_LAMBDA_FUNCTION_VERSION", None) {
        function.version = version;
    }
    if let Some(stream) = get("AWS_LAMBDA_LOG_STREAM_NAME", None) {
        function.log_stream = stream;
    }
    if let Some(group) = get("AWS_LAMBDA_LOG_GROUP_NAME", None) {
        function.log_group = group;
    }

    Ok(())
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ReadinessProtocol;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn prefixed_names_win_over_legacy() {
        let mut config = RelayConfig::default();
        apply_env_overrides(&mut config, lookup(&[("PORT", "3000"), ("AWS_LWA_PORT", "4000")])).unwrap();
        assert_eq!(config.upstream.port, 4000);

        let mut config = RelayConfig::default();
        apply_env_overrides(&mut config, lookup(&[("PORT", "3000")])).unwrap();
        assert_eq!(config.upstream.port, 3000);
    }

    #[test]
    fn overrides_every_section() {
        let mut config = RelayConfig::default();
        apply_env_overrides(
            &mut config,
            lookup(&[
                ("AWS_LWA_TIMEOUT_MS", "1500"),
                ("AWS_LWA_READINESS_CHECK_PROTOCOL", "TCP"),
                ("AWS_LWA_READINESS_CHECK_PATH", "/healthz"),
                ("AWS_LWA_ASYNC_INIT", "true"),
                ("AWS_LWA_REMOVE_BASE_PATH", "/prod"),
                ("AWS_LWA_AUTHORIZATION_SOURCE", "x-api-auth"),
                ("AWS_LWA_ERROR_STATUS_CODES", "500-599"),
                ("AWS_LAMBDA_RUNTIME_API", "127.0.0.1:9001"),
            ]),
        )
        .unwrap();

        assert_eq!(config.upstream.timeout_ms, 1500);
        assert_eq!(config.readiness.protocol, ReadinessProtocol::Tcp);
        assert_eq!(config.readiness.path, "/healthz");
        assert!(config.readiness.async_init);
        assert_eq!(config.routing.remove_base_path.as_deref(), Some("/prod"));
        assert_eq!(config.routing.authorization_source.as_deref(), Some("x-api-auth"));
        assert_eq!(config.routing.error_status_codes.as_deref(), Some("500-599"));
        assert_eq!(config.invoke.runtime_api.as_deref(), Some("127.0.0.1:9001"));
    }

    #[test]
    fn overrides_http_client_settings() {
        let mut config = RelayConfig::default();
        apply_env_overrides(
            &mut config,
            lookup(&[
                ("AWS_LWA_HTTP_KEEPALIVE_SEC", "60"),
                ("AWS_LWA_HTTP_NODELAY", "false"),
                ("AWS_LWA_HTTP_POOL_IDLE_TIMEOUT_SEC", "120"),
                ("AWS_LWA_HTTP_POOL_MAX_IDLE", "8"),
                ("AWS_LWA_HTTP_HTTP2_ONLY", "true"),
                ("AWS_LWA_ENABLE_COMPRESSION", "true"),
            ]),
        )
        .unwrap();

        assert_eq!(config.pool.keepalive_secs, 60);
        assert!(!config.pool.nodelay);
        assert_eq!(config.pool.idle_timeout_secs, 120);
        assert_eq!(config.pool.max_idle_per_host, 8);
        assert!(config.pool.http2_only);
        assert!(config.routing.compression);
    }

    #[test]
    fn http_client_defaults_survive_empty_environment() {
        let mut config = RelayConfig::default();
        apply_env_overrides(&mut config, lookup(&[])).unwrap();
        assert_eq!(config.pool, crate::config::PoolConfig::default());
        assert!(!config.routing.compression);
    }

    #[test]
    fn streaming_invoke_mode_is_ignored() {
        let mut config = RelayConfig::default();
        apply_env_overrides(&mut config, lookup(&[("AWS_LWA_INVOKE_MODE", "response_stream")])).unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn bad_boolean_is_reported() {
        let mut config = RelayConfig::default();
        let err = apply_env_overrides(&mut config, lookup(&[("AWS_LWA_HTTP_NODELAY", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: "AWS_LWA_HTTP_NODELAY", .. }));
    }

    #[test]
    fn function_identity_comes_from_runtime_variables() {
        let mut config = RelayConfig::default();
        apply_env_overrides(
            &mut config,
            lookup(&[
                ("AWS_LAMBDA_FUNCTION_NAME", "orders"),
                ("AWS_LAMBDA_FUNCTION_MEMORY_SIZE", "1024"),
                ("AWS_LAMBDA_FUNCTION_VERSION", "$LATEST"),
                ("AWS_LAMBDA_LOG_STREAM_NAME", "2024/01/01/[$LATEST]abc"),
                ("AWS_LAMBDA_LOG_GROUP_NAME", "/aws/lambda/orders"),
            ]),
        )
        .unwrap();

        assert_eq!(config.function.function_name, "orders");
        assert_eq!(config.function.memory, 1024);
        assert_eq!(config.function.version, "$LATEST");
        assert_eq!(config.function.log_stream, "2024/01/01/[$LATEST]abc");
        assert_eq!(config.function.log_group, "/aws/lambda/orders");
    }

    #[test]
    fn bad_number_is_reported() {
        let mut config = RelayConfig::default();
        let err = apply_env_overrides(&mut config, lookup(&[("AWS_LWA_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: "AWS_LWA_PORT", .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_from_env(Some(Path::new("/nonexistent/relay.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
