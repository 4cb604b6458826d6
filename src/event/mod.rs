//! Inbound invocation events.
//!
//! # Data Flow
//! ```text
//! raw event bytes (runtime API body / local invoke body)
//!     → InvocationEvent::from_slice (shape detection)
//!     → InvocationEvent::into_parts (method, path, query, headers, body)
//!     → http::request (rewrites, ForwardedRequest)
//! ```
//!
//! # Shapes
//! - HTTP API / function URL (payload 2.0): `rawPath`, `requestContext.http`
//! - REST API (payload 1.0): `httpMethod`, `path`, `multiValueHeaders`
//! - Load balancer: REST shape with `requestContext.elb`
//! - Anything else is a pass-through event, POSTed upstream as JSON

pub mod context;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

pub use context::InvocationContext;

use crate::error::{AdapterError, AdapterResult};

/// Reply format expected by the trigger that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    HttpApi,
    RestApi,
    Alb { multi_value_headers: bool },
    PassThrough,
}

/// Payload 2.0 event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpApiEvent {
    pub version: Option<String>,
    pub raw_path: Option<String>,
    pub raw_query_string: Option<String>,
    pub cookies: Option<Vec<String>>,
    pub headers: Option<HashMap<String, String>>,
    pub request_context: Value,
    pub body: Option<String>,
    pub is_base64_encoded: Option<bool>,
}

/// Payload 1.0 event, also used by load balancer targets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestApiEvent {
    pub http_method: Option<String>,
    pub path: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub multi_value_headers: Option<HashMap<String, Vec<String>>>,
    pub query_string_parameters: Option<HashMap<String, String>>,
    pub multi_value_query_string_parameters: Option<HashMap<String, Vec<String>>>,
    pub request_context: Value,
    pub body: Option<String>,
    pub is_base64_encoded: Option<bool>,
}

/// One inbound invocation, consumed exactly once.
#[derive(Debug, Clone)]
pub enum InvocationEvent {
    HttpApi(HttpApiEvent),
    RestApi(RestApiEvent),
    Alb(RestApiEvent),
    PassThrough(Value),
}

/// HTTP view of an event, before any rewrites.
#[derive(Debug, Clone)]
pub struct HttpParts {
    pub method: Method,
    pub path: String,
    /// Already percent-encoded query string, without the leading `?`.
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub request_context: Value,
    pub source_ip: Option<String>,
    pub request_id: Option<String>,
}

impl InvocationEvent {
    /// Parse an event from its JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> AdapterResult<Self> {
        let value: Value = serde_json::from_slice(bytes).map_err(AdapterError::translation)?;
        Self::from_value(value)
    }

    /// Detect the event shape and deserialize it.
    pub fn from_value(value: Value) -> AdapterResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| AdapterError::translation("event is not a JSON object"))?;
        let context = object.get("requestContext");
        let has = |key: &str| object.contains_key(key);
        let context_has = |key: &str| context.and_then(|c| c.get(key)).is_some();

        if has("rawPath") || context_has("http") {
            let event: HttpApiEvent =
                serde_json::from_value(value).map_err(AdapterError::translation)?;
            return Ok(InvocationEvent::HttpApi(event));
        }

        if has("httpMethod") || has("path") || has("multiValueHeaders") || context_has("elb") {
            let alb = context_has("elb");
            let event: RestApiEvent =
                serde_json::from_value(value).map_err(AdapterError::translation)?;
            return Ok(if alb {
                InvocationEvent::Alb(event)
            } else {
                InvocationEvent::RestApi(event)
            });
        }

        Ok(InvocationEvent::PassThrough(value))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            InvocationEvent::HttpApi(_) => EventKind::HttpApi,
            InvocationEvent::RestApi(_) => EventKind::RestApi,
            InvocationEvent::Alb(event) => EventKind::Alb {
                multi_value_headers: event.multi_value_headers.is_some(),
            },
            InvocationEvent::PassThrough(_) => EventKind::PassThrough,
        }
    }

    /// Flatten the event into HTTP parts.
    ///
    /// Pass-through events become `POST pass_through_path` with the event
    /// JSON as body.
    pub fn into_parts(self, pass_through_path: &str) -> AdapterResult<HttpParts> {
        match self {
            InvocationEvent::HttpApi(event) => http_api_parts(event),
            InvocationEvent::RestApi(event) => rest_api_parts(event, false),
            InvocationEvent::Alb(event) => rest_api_parts(event, true),
            InvocationEvent::PassThrough(value) => {
                let body = serde_json::to_vec(&value).map_err(AdapterError::translation)?;
                let mut headers = HeaderMap::new();
                headers.insert(
                    axum::http::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                Ok(HttpParts {
                    method: Method::POST,
                    path: pass_through_path.to_string(),
                    query: None,
                    headers,
                    body: Bytes::from(body),
                    request_context: Value::Null,
                    source_ip: None,
                    request_id: None,
                })
            }
        }
    }
}

fn http_api_parts(event: HttpApiEvent) -> AdapterResult<HttpParts> {
    let http = event.request_context.get("http");
    let method = http
        .and_then(|h| h.get("method"))
        .and_then(Value::as_str)
        .ok_or_else(|| AdapterError::translation("event is missing the HTTP method"))?;
    let method = parse_method(method)?;

    let path = event
        .raw_path
        .clone()
        .or_else(|| http.and_then(|h| h.get("path")).and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| "/".to_string());

    let mut headers = HeaderMap::new();
    for (name, value) in event.headers.iter().flatten() {
        append_header(&mut headers, name, value)?;
    }
    // Payload 2.0 moves cookies out of the headers.
    if let Some(cookies) = event.cookies.as_ref().filter(|c| !c.is_empty()) {
        let joined = cookies.join("; ");
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_str(&joined).map_err(AdapterError::translation)?,
        );
    }

    let source_ip = http
        .and_then(|h| h.get("sourceIp"))
        .and_then(Value::as_str)
        .map(String::from);
    let request_id = context_request_id(&event.request_context);
    let body = decode_body(event.body, event.is_base64_encoded.unwrap_or(false))?;

    Ok(HttpParts {
        method,
        path,
        query: event.raw_query_string.filter(|q| !q.is_empty()),
        headers,
        body,
        request_context: event.request_context,
        source_ip,
        request_id,
    })
}

fn rest_api_parts(event: RestApiEvent, alb: bool) -> AdapterResult<HttpParts> {
    let method = event
        .http_method
        .as_deref()
        .ok_or_else(|| AdapterError::translation("event is missing the HTTP method"))?;
    let method = parse_method(method)?;
    let path = event.path.clone().unwrap_or_else(|| "/".to_string());

    let mut headers = HeaderMap::new();
    match &event.multi_value_headers {
        Some(multi) if !multi.is_empty() => {
            for (name, values) in multi {
                for value in values {
                    append_header(&mut headers, name, value)?;
                }
            }
        }
        _ => {
            for (name, value) in event.headers.iter().flatten() {
                append_header(&mut headers, name, value)?;
            }
        }
    }

    // Load balancers hand over the query exactly as received; REST API
    // decodes it, so it has to be re-encoded.
    let query = match (&event.multi_value_query_string_parameters, &event.query_string_parameters) {
        (Some(multi), _) if !multi.is_empty() => {
            let pairs = multi
                .iter()
                .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())));
            Some(encode_query(pairs, alb))
        }
        (_, Some(single)) if !single.is_empty() => {
            let pairs = single.iter().map(|(k, v)| (k.as_str(), v.as_str()));
            Some(encode_query(pairs, alb))
        }
        _ => None,
    };

    let source_ip = event
        .request_context
        .get("identity")
        .and_then(|i| i.get("sourceIp"))
        .and_then(Value::as_str)
        .map(String::from);
    let request_id = context_request_id(&event.request_context);
    let body = decode_body(event.body, event.is_base64_encoded.unwrap_or(false))?;

    Ok(HttpParts {
        method,
        path,
        query,
        headers,
        body,
        request_context: event.request_context,
        source_ip,
        request_id,
    })
}

fn parse_method(method: &str) -> AdapterResult<Method> {
    Method::from_bytes(method.to_uppercase().as_bytes()).map_err(AdapterError::translation)
}

fn append_header(headers: &mut HeaderMap, name: &str, value: &str) -> AdapterResult<()> {
    let name = HeaderName::from_bytes(name.as_bytes()).map_err(AdapterError::translation)?;
    let value = HeaderValue::from_str(value).map_err(AdapterError::translation)?;
    headers.append(name, value);
    Ok(())
}

fn context_request_id(context: &Value) -> Option<String> {
    context
        .get("requestId")
        .and_then(Value::as_str)
        .map(String::from)
}

fn decode_body(body: Option<String>, base64_encoded: bool) -> AdapterResult<Bytes> {
    match body {
        None => Ok(Bytes::new()),
        Some(body) if base64_encoded => base64::engine::general_purpose::STANDARD
            .decode(body.as_bytes())
            .map(Bytes::from)
            .map_err(AdapterError::translation),
        Some(body) => Ok(Bytes::from(body)),
    }
}

fn encode_query<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>, raw: bool) -> String {
    if raw {
        return pairs
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
    }
    let mut sorted: Vec<_> = pairs.collect();
    sorted.sort();
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(sorted)
        .finish()
}
