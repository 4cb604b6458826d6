//! Per-invocation metadata supplied by the hosting runtime.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::FunctionConfig;

/// What the runtime told us about one invocation.
///
/// Forwarded to the upstream as JSON in `x-amzn-lambda-context`, with the
/// field names runtime clients already read (`request_id`, `deadline`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvocationContext {
    pub request_id: String,

    /// Deadline in milliseconds since the Unix epoch; 0 when unknown.
    pub deadline: u64,

    pub invoked_function_arn: String,

    pub xray_trace_id: Option<String>,

    /// Mobile SDK client context, as sent by the runtime.
    pub client_context: Option<Value>,

    /// Cognito identity, as sent by the runtime.
    pub identity: Option<Value>,

    pub env_config: FunctionConfig,
}

impl InvocationContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Default::default()
        }
    }

    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.deadline = deadline_ms;
        self
    }

    pub fn with_env_config(mut self, env_config: FunctionConfig) -> Self {
        self.env_config = env_config;
        self
    }

    /// Time left until the deadline, if one was given. Zero once passed.
    pub fn remaining(&self) -> Option<Duration> {
        if self.deadline == 0 {
            return None;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Some(Duration::from_millis(self.deadline.saturating_sub(now)))
    }
}

/// Milliseconds since the Unix epoch, `offset` from now.
pub fn deadline_from_now(offset: Duration) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now + offset).as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_is_none_without_deadline() {
        assert_eq!(InvocationContext::new("id").remaining(), None);
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let ctx = InvocationContext::new("id").with_deadline_ms(1);
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));

        let ctx = InvocationContext::new("id").with_deadline_ms(deadline_from_now(Duration::from_secs(60)));
        let left = ctx.remaining().unwrap();
        assert!(left > Duration::from_secs(58) && left <= Duration::from_secs(60));
    }

    #[test]
    fn serializes_runtime_field_names() {
        let function = FunctionConfig {
            function_name: "orders".into(),
            memory: 512,
            version: "$LATEST".into(),
            log_stream: "2024/01/01/[$LATEST]abc".into(),
            log_group: "/aws/lambda/orders".into(),
        };
        let ctx = InvocationContext::new("abc")
            .with_deadline_ms(42)
            .with_env_config(function);
        let json = serde_json::to_value(&ctx).unwrap();

        assert_eq!(json["request_id"], "abc");
        assert_eq!(json["deadline"], 42);
        assert_eq!(json["invoked_function_arn"], "");
        assert!(json["xray_trace_id"].is_null());
        assert!(json["client_context"].is_null());
        assert!(json["identity"].is_null());
        assert_eq!(json["env_config"]["function_name"], "orders");
        assert_eq!(json["env_config"]["memory"], 512);
        assert_eq!(json["env_config"]["log_group"], "/aws/lambda/orders");
        assert!(json.get("requestId").is_none());
    }
}
