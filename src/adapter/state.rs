//! Invocation state machine.
//!
//! # States
//! - Idle: no invocation running
//! - Forwarding: upstream request issued, waiting for the full response
//! - Succeeded / Failed(kind): terminal, always paired with a reply
//!
//! # State Transitions
//! ```text
//! Idle → Forwarding: event translated into a ForwardedRequest
//! Idle → Failed(ProtocolError): event could not be translated
//! Forwarding → Succeeded: full response collected
//! Forwarding → Failed(..): timeout, refused, transport error, oversize, error status
//! terminal → Idle: reply handed to the driver
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::error::AdapterError;
use crate::event::EventKind;
use crate::http::response::InvocationResponse;

/// Why an invocation ended in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    ProtocolError,
    ConnectionRefused,
    Upstream,
    ResponseTooLarge,
    ErrorStatus,
}

impl From<&AdapterError> for FailureKind {
    fn from(err: &AdapterError) -> Self {
        match err {
            AdapterError::ProtocolTranslation(_) => FailureKind::ProtocolError,
            AdapterError::ConnectionRefused(_) => FailureKind::ConnectionRefused,
            AdapterError::UpstreamTimeout(_) => FailureKind::Timeout,
            AdapterError::Upstream(_) => FailureKind::Upstream,
            AdapterError::ResponseTooLarge { .. } => FailureKind::ResponseTooLarge,
            AdapterError::UpstreamErrorStatus(_) => FailureKind::ErrorStatus,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Idle,
    Forwarding,
    Succeeded,
    Failed(FailureKind),
}

impl InvocationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationState::Succeeded | InvocationState::Failed(_))
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            InvocationState::Idle => "idle",
            InvocationState::Forwarding => "forwarding",
            InvocationState::Succeeded => "succeeded",
            InvocationState::Failed(FailureKind::Timeout) => "timeout",
            InvocationState::Failed(FailureKind::ProtocolError) => "protocol_error",
            InvocationState::Failed(FailureKind::ConnectionRefused) => "connection_refused",
            InvocationState::Failed(FailureKind::Upstream) => "upstream_error",
            InvocationState::Failed(FailureKind::ResponseTooLarge) => "response_too_large",
            InvocationState::Failed(FailureKind::ErrorStatus) => "error_status",
        }
    }
}

/// Terminal result of one invocation: the reply plus how it ended.
#[derive(Debug)]
pub struct Reply {
    pub kind: EventKind,
    pub response: InvocationResponse,
    pub state: InvocationState,
    pub error: Option<AdapterError>,
}

/// What goes back to the trigger on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReplyPayload {
    /// Gateway and load balancer triggers get the HTTP envelope.
    Http(InvocationResponse),
    /// Other triggers get the upstream body itself.
    Raw(Value),
}

impl Reply {
    pub fn succeeded(kind: EventKind, response: InvocationResponse) -> Self {
        Self {
            kind,
            response,
            state: InvocationState::Succeeded,
            error: None,
        }
    }

    pub fn failed(kind: EventKind, response: InvocationResponse, error: AdapterError) -> Self {
        Self {
            kind,
            response,
            state: InvocationState::Failed(FailureKind::from(&error)),
            error: Some(error),
        }
    }

    /// Whether the runtime should record this invocation as an error.
    ///
    /// Only configured error statuses count; other failures already carry
    /// a complete 4xx/5xx reply for the caller.
    pub fn is_runtime_error(&self) -> bool {
        self.state == InvocationState::Failed(FailureKind::ErrorStatus)
    }

    /// Wire form for the trigger that sent the event.
    pub fn payload(&self) -> ReplyPayload {
        match self.kind {
            EventKind::PassThrough => ReplyPayload::Raw(self.response.pass_through_value()),
            _ => ReplyPayload::Http(self.response.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use bytes::Bytes;
    use crate::http::response::ForwardedResponse;

    fn upstream(body: &'static str) -> InvocationResponse {
        InvocationResponse::from_upstream(EventKind::PassThrough, ForwardedResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        })
    }

    #[test]
    fn failure_kinds_map_from_errors() {
        let err = AdapterError::UpstreamTimeout(10);
        assert_eq!(FailureKind::from(&err), FailureKind::Timeout);
        let err = AdapterError::translation("bad");
        assert_eq!(FailureKind::from(&err), FailureKind::ProtocolError);
    }

    #[test]
    fn replies_are_terminal() {
        let err = AdapterError::ConnectionRefused("127.0.0.1:1".into());
        let response = InvocationResponse::from_error(EventKind::HttpApi, &err, None);
        let reply = Reply::failed(EventKind::HttpApi, response, err);
        assert!(reply.state.is_terminal());
        assert_eq!(reply.state.label(), "connection_refused");
        assert!(!reply.is_runtime_error());
        assert!(!InvocationState::Forwarding.is_terminal());
    }

    #[test]
    fn pass_through_payload_is_the_upstream_json() {
        let reply = Reply::succeeded(EventKind::PassThrough, upstream(r#"{"batchItemFailures":[]}"#));
        let wire = serde_json::to_value(reply.payload()).unwrap();
        assert_eq!(wire, serde_json::json!({ "batchItemFailures": [] }));
    }

    #[test]
    fn pass_through_payload_is_null_for_non_json() {
        let reply = Reply::succeeded(EventKind::PassThrough, upstream("plain words"));
        assert_eq!(reply.payload(), ReplyPayload::Raw(Value::Null));

        let reply = Reply::succeeded(EventKind::PassThrough, upstream(""));
        assert_eq!(reply.payload(), ReplyPayload::Raw(Value::Null));
    }

    #[test]
    fn http_payload_keeps_the_envelope() {
        let response = InvocationResponse::from_upstream(EventKind::HttpApi, ForwardedResponse {
            status: StatusCode::CREATED,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"{}"),
        });
        let reply = Reply::succeeded(EventKind::HttpApi, response);
        let wire = serde_json::to_value(reply.payload()).unwrap();
        assert_eq!(wire["statusCode"], 201);
        assert_eq!(wire["body"], "{}");
    }
}
