//! Invocation failure taxonomy.

use axum::http::StatusCode;
use thiserror::Error;

/// Why an invocation did not produce a plain upstream reply.
///
/// Every variant is converted into a reply at the adapter boundary; none of
/// them escape to the trigger.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The inbound event could not be turned into an HTTP request.
    #[error("protocol translation failed: {0}")]
    ProtocolTranslation(String),

    /// Nothing is listening on the upstream port.
    #[error("upstream connection refused at {0}")]
    ConnectionRefused(String),

    /// No full upstream response arrived within the budget.
    #[error("upstream did not respond within {0} ms")]
    UpstreamTimeout(u64),

    /// Any other transport failure talking to the upstream.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// The upstream body does not fit into a reply.
    #[error("upstream response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    /// The upstream answered with a status configured as an error.
    #[error("request failed with configured error status code: {0}")]
    UpstreamErrorStatus(u16),
}

impl AdapterError {
    /// Reply status for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            AdapterError::ProtocolTranslation(_) => StatusCode::BAD_REQUEST,
            AdapterError::ConnectionRefused(_) => StatusCode::BAD_GATEWAY,
            AdapterError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AdapterError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AdapterError::ResponseTooLarge { .. } => StatusCode::BAD_GATEWAY,
            AdapterError::UpstreamErrorStatus(code) => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }

    /// Short machine-readable name, used in reply bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::ProtocolTranslation(_) => "ProtocolTranslationError",
            AdapterError::ConnectionRefused(_) => "ConnectionRefused",
            AdapterError::UpstreamTimeout(_) => "UpstreamTimeoutError",
            AdapterError::Upstream(_) => "UpstreamError",
            AdapterError::ResponseTooLarge { .. } => "ResponseTooLarge",
            AdapterError::UpstreamErrorStatus(_) => "UpstreamErrorStatus",
        }
    }

    /// Translation errors are built from whatever failed to parse.
    pub fn translation(err: impl std::fmt::Display) -> Self {
        AdapterError::ProtocolTranslation(err.to_string())
    }
}

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(AdapterError::translation("no method").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AdapterError::ConnectionRefused("127.0.0.1:1".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(AdapterError::UpstreamTimeout(100).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            AdapterError::ResponseTooLarge { limit: 10 }.status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(AdapterError::UpstreamErrorStatus(503).status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_error_display() {
        let err = AdapterError::UpstreamTimeout(250);
        assert_eq!(err.to_string(), "upstream did not respond within 250 ms");
        assert_eq!(err.kind(), "UpstreamTimeoutError");
    }
}
