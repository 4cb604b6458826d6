//! Request translation and rewriting.
//!
//! # Responsibilities
//! - Turn flattened event parts into the ForwardedRequest
//! - Strip the configured base path
//! - Add context headers (request context, invocation context, request ID)
//! - Drop hop-by-hop headers, rename the authorization source header
//!
//! # Design Decisions
//! - Method, path, query and body are forwarded untouched otherwise
//! - Content-Length is recomputed from the decoded body
//! - The inbound Host header is preserved

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Uri};
use serde_json::Value;
use url::Url;

use crate::config::{RoutingConfig, UpstreamConfig};
use crate::error::{AdapterError, AdapterResult};
use crate::event::{HttpParts, InvocationContext};

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_AMZN_REQUEST_CONTEXT: &str = "x-amzn-request-context";
pub const X_AMZN_LAMBDA_CONTEXT: &str = "x-amzn-lambda-context";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Connection-scoped headers that never cross the adapter.
pub const HOP_BY_HOP_HEADERS: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
];

/// Remove hop-by-hop headers in place.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Fixed rewrite rules, built once from configuration.
#[derive(Debug, Clone)]
pub struct RequestRewrite {
    base_url: Url,
    remove_base_path: Option<String>,
    authorization_source: Option<HeaderName>,
}

impl RequestRewrite {
    pub fn from_config(upstream: &UpstreamConfig, routing: &RoutingConfig) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(&upstream.base_url())?;
        let authorization_source = routing
            .authorization_source
            .as_deref()
            .and_then(|name| match HeaderName::from_bytes(name.to_lowercase().as_bytes()) {
                Ok(name) => Some(name),
                Err(e) => {
                    tracing::warn!(header = %name, error = %e, "Ignoring invalid authorization source header");
                    None
                }
            });

        Ok(Self {
            base_url,
            remove_base_path: routing
                .remove_base_path
                .clone()
                .filter(|base| !base.is_empty() && base != "/"),
            authorization_source,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Strip the base path when it is a whole-segment prefix of `path`.
    pub fn strip_base_path<'a>(&self, path: &'a str) -> &'a str {
        let Some(base) = self.remove_base_path.as_deref() else {
            return path;
        };
        match path.strip_prefix(base.trim_end_matches('/')) {
            Some("") => "/",
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        }
    }

    /// Build the request sent to the upstream.
    pub fn forward_request(
        &self,
        parts: HttpParts,
        context: Option<&InvocationContext>,
    ) -> AdapterResult<Request<Body>> {
        let mut url = self.base_url.clone();
        url.set_path(self.strip_base_path(&parts.path));
        url.set_query(parts.query.as_deref());
        let uri: Uri = url.as_str().parse().map_err(AdapterError::translation)?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);

        if let Some(source) = &self.authorization_source {
            match headers.remove(source) {
                Some(value) => {
                    headers.insert(header::AUTHORIZATION, value);
                }
                None => {
                    tracing::warn!(header = %source, "Authorization source header not found in request headers");
                }
            }
        }

        if !parts.request_context.is_null() {
            headers.insert(X_AMZN_REQUEST_CONTEXT, json_header(&parts.request_context)?);
        }
        if let Some(context) = context {
            let value = serde_json::to_value(context).map_err(AdapterError::translation)?;
            headers.insert(X_AMZN_LAMBDA_CONTEXT, json_header(&value)?);
        }

        let request_id = context
            .map(|c| c.request_id.as_str())
            .filter(|id| !id.is_empty())
            .or(parts.request_id.as_deref());
        if let (Some(id), false) = (request_id, headers.contains_key(X_REQUEST_ID)) {
            headers.insert(X_REQUEST_ID, HeaderValue::from_str(id).map_err(AdapterError::translation)?);
        }

        if let (Some(ip), false) = (parts.source_ip.as_deref(), headers.contains_key(X_FORWARDED_FOR)) {
            headers.insert(X_FORWARDED_FOR, HeaderValue::from_str(ip).map_err(AdapterError::translation)?);
        }

        let mut builder = Request::builder().method(parts.method).uri(uri);
        if let Some(target) = builder.headers_mut() {
            target.extend(headers);
        }
        builder
            .body(Body::from(parts.body))
            .map_err(AdapterError::translation)
    }
}

fn json_header(value: &Value) -> AdapterResult<HeaderValue> {
    let json = serde_json::to_string(value).map_err(AdapterError::translation)?;
    HeaderValue::from_bytes(json.as_bytes()).map_err(AdapterError::translation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use bytes::Bytes;
    use serde_json::json;

    fn rewrite(routing: RoutingConfig) -> RequestRewrite {
        RequestRewrite::from_config(&UpstreamConfig::default(), &routing).unwrap()
    }

    fn parts(path: &str) -> HttpParts {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("api.example.com"));
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("content-length", HeaderValue::from_static("999"));
        HttpParts {
            method: Method::POST,
            path: path.to_string(),
            query: Some("a=1&b=%20x".to_string()),
            headers,
            body: Bytes::from_static(b"payload"),
            request_context: json!({ "requestId": "ctx-id", "stage": "prod" }),
            source_ip: Some("10.1.2.3".to_string()),
            request_id: Some("ctx-id".to_string()),
        }
    }

    #[test]
    fn base_path_is_stripped_on_segment_boundary() {
        let rw = rewrite(RoutingConfig {
            remove_base_path: Some("/prod".into()),
            ..Default::default()
        });
        assert_eq!(rw.strip_base_path("/prod/users"), "/users");
        assert_eq!(rw.strip_base_path("/prod"), "/");
        assert_eq!(rw.strip_base_path("/production"), "/production");
        assert_eq!(rw.strip_base_path("/other"), "/other");
    }

    #[test]
    fn forwards_to_upstream_with_context_headers() {
        let rw = rewrite(RoutingConfig::default());
        let ctx = InvocationContext::new("invoke-1").with_deadline_ms(10);
        let req = rw.forward_request(parts("/orders/1"), Some(&ctx)).unwrap();

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri().to_string(), "http://127.0.0.1:8080/orders/1?a=1&b=%20x");
        assert_eq!(req.headers()["host"], "api.example.com");
        assert!(req.headers().get("connection").is_none());
        assert!(req.headers().get("content-length").is_none());
        assert_eq!(req.headers()[X_REQUEST_ID], "invoke-1");
        assert_eq!(req.headers()[X_FORWARDED_FOR], "10.1.2.3");

        let request_context: Value =
            serde_json::from_slice(req.headers()[X_AMZN_REQUEST_CONTEXT].as_bytes()).unwrap();
        assert_eq!(request_context["stage"], "prod");
        let lambda_context: Value =
            serde_json::from_slice(req.headers()[X_AMZN_LAMBDA_CONTEXT].as_bytes()).unwrap();
        assert_eq!(lambda_context["request_id"], "invoke-1");
    }

    #[test]
    fn existing_forwarding_headers_win() {
        let rw = rewrite(RoutingConfig::default());
        let mut p = parts("/");
        p.headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9"));
        p.headers.insert(X_REQUEST_ID, HeaderValue::from_static("client-id"));
        let req = rw.forward_request(p, None).unwrap();
        assert_eq!(req.headers()[X_FORWARDED_FOR], "203.0.113.9");
        assert_eq!(req.headers()[X_REQUEST_ID], "client-id");
        assert!(req.headers().get(X_AMZN_LAMBDA_CONTEXT).is_none());
    }

    #[test]
    fn authorization_source_is_renamed() {
        let rw = rewrite(RoutingConfig {
            authorization_source: Some("X-Api-Auth".into()),
            ..Default::default()
        });
        let mut p = parts("/");
        p.headers.insert("x-api-auth", HeaderValue::from_static("Bearer t0k3n"));
        let req = rw.forward_request(p, None).unwrap();
        assert_eq!(req.headers()[header::AUTHORIZATION], "Bearer t0k3n");
        assert!(req.headers().get("x-api-auth").is_none());
    }

    #[test]
    fn authorization_source_missing_leaves_headers_alone() {
        let rw = rewrite(RoutingConfig {
            authorization_source: Some("x-api-auth".into()),
            ..Default::default()
        });
        let req = rw.forward_request(parts("/"), None).unwrap();
        assert!(req.headers().get(header::AUTHORIZATION).is_none());
    }
}
