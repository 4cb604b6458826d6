//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check paths and status code lists are well-formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{InvokeMode, RelayConfig};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be zero")]
    Zero { field: &'static str },

    #[error("{field} must start with '/': {value:?}")]
    RelativePath { field: &'static str, value: String },

    #[error("invalid status code entry {0:?} in routing.error_status_codes")]
    StatusCode(String),

    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("invoke.runtime_api is required in runtime_api mode")]
    MissingRuntimeApi,
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.upstream.port == 0 {
        errors.push(ValidationError::Zero { field: "upstream.port" });
    }
    if config.upstream.timeout_ms == 0 {
        errors.push(ValidationError::Zero { field: "upstream.timeout_ms" });
    }
    if config.readiness.port == Some(0) {
        errors.push(ValidationError::Zero { field: "readiness.port" });
    }
    if config.readiness.interval_ms == 0 {
        errors.push(ValidationError::Zero { field: "readiness.interval_ms" });
    }
    if config.pool.max_connections == 0 {
        errors.push(ValidationError::Zero { field: "pool.max_connections" });
    }
    if config.limits.max_response_bytes == 0 {
        errors.push(ValidationError::Zero { field: "limits.max_response_bytes" });
    }

    check_path(&mut errors, "readiness.path", &config.readiness.path);
    check_path(&mut errors, "routing.pass_through_path", &config.routing.pass_through_path);
    if let Some(base) = &config.routing.remove_base_path {
        check_path(&mut errors, "routing.remove_base_path", base);
    }

    if let Some(codes) = &config.routing.error_status_codes {
        for part in codes.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if !is_valid_status_entry(part) {
                errors.push(ValidationError::StatusCode(part.to_string()));
            }
        }
    }

    match config.invoke.mode {
        InvokeMode::RuntimeApi => {
            if config.invoke.runtime_api.as_deref().map_or(true, str::is_empty) {
                errors.push(ValidationError::MissingRuntimeApi);
            }
        }
        InvokeMode::Local => {
            if config.invoke.bind_address.parse::<std::net::SocketAddr>().is_err() {
                errors.push(ValidationError::BindAddress(config.invoke.bind_address.clone()));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_path(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if !value.starts_with('/') {
        errors.push(ValidationError::RelativePath {
            field,
            value: value.to_string(),
        });
    }
}

fn is_valid_status_entry(part: &str) -> bool {
    let in_range = |code: u16| (100..=599).contains(&code);
    match part.split_once('-') {
        Some((start, end)) => match (start.trim().parse::<u16>(), end.trim().parse::<u16>()) {
            (Ok(start), Ok(end)) => in_range(start) && in_range(end) && start <= end,
            _ => false,
        },
        None => part.parse::<u16>().map(in_range).unwrap_or(false),
    }
}

/// Expand a status code list such as "500,502-504" into individual codes.
///
/// Unparseable entries are skipped with a warning.
pub fn parse_status_codes(input: &str) -> Vec<u16> {
    input
        .split(',')
        .map(str::trim)
        .flat_map(|part| {
            if let Some((start, end)) = part.split_once('-') {
                if let (Ok(start), Ok(end)) = (start.trim().parse::<u16>(), end.trim().parse::<u16>()) {
                    return (start..=end).collect::<Vec<_>>();
                }
                tracing::warn!(entry = %part, "Failed to parse status code range");
                Vec::new()
            } else {
                match part.parse::<u16>() {
                    Ok(code) => vec![code],
                    Err(_) => {
                        if !part.is_empty() {
                            tracing::warn!(entry = %part, "Failed to parse status code");
                        }
                        Vec::new()
                    }
                }
            }
        })
        .collect()
}
