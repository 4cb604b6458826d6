//! Response translation.
//!
//! # Responsibilities
//! - Turn the upstream response into the reply the trigger expects
//! - Remove hop-by-hop headers (transfer-encoding, connection, ...)
//! - Encode binary bodies as base64
//! - Map adapter errors to well-formed replies
//!
//! # Design Decisions
//! - The reply shape follows the inbound event shape
//! - Upstream timeouts result in 504 Gateway Timeout
//! - Unreachable upstream results in 502 Bad Gateway

use axum::http::{header, HeaderMap, StatusCode};
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AdapterError;
use crate::event::EventKind;
use crate::http::request::strip_hop_by_hop;

/// Status, headers and collected body received from the upstream.
#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Reply delivered back to the trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_value_headers: Option<BTreeMap<String, Vec<String>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<Vec<String>>,

    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl InvocationResponse {
    /// Mirror an upstream response in the shape `kind` expects.
    pub fn from_upstream(kind: EventKind, mut upstream: ForwardedResponse) -> Self {
        strip_hop_by_hop(&mut upstream.headers);

        let (body, is_base64_encoded) = encode_body(&upstream.headers, upstream.body);
        let mut reply = Self {
            status_code: upstream.status.as_u16(),
            status_description: None,
            headers: BTreeMap::new(),
            multi_value_headers: None,
            cookies: None,
            body,
            is_base64_encoded,
        };

        match kind {
            EventKind::HttpApi | EventKind::PassThrough => {
                let cookies: Vec<String> = upstream
                    .headers
                    .get_all(header::SET_COOKIE)
                    .iter()
                    .filter_map(|v| v.to_str().ok().map(String::from))
                    .collect();
                upstream.headers.remove(header::SET_COOKIE);
                if !cookies.is_empty() {
                    reply.cookies = Some(cookies);
                }
                reply.headers = joined_headers(&upstream.headers);
            }
            EventKind::RestApi => {
                reply.headers = last_value_headers(&upstream.headers);
                reply.multi_value_headers = Some(multi_value_headers(&upstream.headers));
            }
            EventKind::Alb { multi_value_headers: multi } => {
                reply.status_description = Some(status_description(upstream.status));
                if multi {
                    reply.multi_value_headers = Some(multi_value_headers(&upstream.headers));
                } else {
                    reply.headers = last_value_headers(&upstream.headers);
                }
            }
        }

        reply
    }

    /// Well-formed reply for a failed invocation.
    ///
    /// Errors with an upstream body (configured error statuses) keep it.
    pub fn from_error(kind: EventKind, error: &AdapterError, upstream: Option<ForwardedResponse>) -> Self {
        if let Some(upstream) = upstream {
            return Self::from_upstream(kind, upstream);
        }

        let status = error.status();
        let body = serde_json::json!({
            "message": error.to_string(),
            "error": error.kind(),
        })
        .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        Self::from_upstream(
            kind,
            ForwardedResponse {
                status,
                headers,
                body: Bytes::from(body),
            },
        )
    }

    /// Decoded body bytes.
    pub fn body_bytes(&self) -> Result<Bytes, base64::DecodeError> {
        if self.is_base64_encoded {
            base64::engine::general_purpose::STANDARD
                .decode(self.body.as_bytes())
                .map(Bytes::from)
        } else {
            Ok(Bytes::from(self.body.clone()))
        }
    }

    /// The body as raw JSON, for triggers that are not HTTP. Binary and
    /// non-JSON bodies become `null`.
    pub fn pass_through_value(&self) -> serde_json::Value {
        if self.is_base64_encoded {
            return serde_json::Value::Null;
        }
        serde_json::from_str(&self.body).unwrap_or_default()
    }

    /// Header lookup across both header maps, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .get(&name)
            .map(String::as_str)
            .or_else(|| {
                self.multi_value_headers
                    .as_ref()
                    .and_then(|m| m.get(&name))
                    .and_then(|v| v.last())
                    .map(String::as_str)
            })
    }
}

fn joined_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    multi_value_headers(headers)
        .into_iter()
        .map(|(name, values)| (name, values.join(", ")))
        .collect()
}

fn last_value_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    multi_value_headers(headers)
        .into_iter()
        .filter_map(|(name, mut values)| values.pop().map(|v| (name, v)))
        .collect()
}

fn multi_value_headers(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        let value = match value.to_str() {
            Ok(value) => value.to_string(),
            Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
        };
        map.entry(name.as_str().to_string()).or_default().push(value);
    }
    map
}

fn status_description(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

/// Text bodies stay text; everything else is base64.
fn encode_body(headers: &HeaderMap, body: Bytes) -> (String, bool) {
    if body.is_empty() {
        return (String::new(), false);
    }
    let encoded = headers.contains_key(header::CONTENT_ENCODING);
    let textual = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(true, is_text_content_type);

    if !encoded && textual {
        if let Ok(text) = std::str::from_utf8(&body) {
            return (text.to_string(), false);
        }
    }
    (base64::engine::general_purpose::STANDARD.encode(&body), true)
}

fn is_text_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    mime.starts_with("text/")
        || mime.ends_with("+json")
        || mime.ends_with("+xml")
        || matches!(
            mime.as_str(),
            "application/json"
                | "application/xml"
                | "application/javascript"
                | "application/x-www-form-urlencoded"
                | "application/graphql"
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn upstream(content_type: &str, body: &'static [u8]) -> ForwardedResponse {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        ForwardedResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn http_api_reply_moves_cookies_and_drops_transfer_encoding() {
        let reply = InvocationResponse::from_upstream(EventKind::HttpApi, upstream("text/plain", b"ok"));
        assert_eq!(reply.status_code, 200);
        assert_eq!(reply.body, "ok");
        assert!(!reply.is_base64_encoded);
        assert_eq!(reply.cookies, Some(vec!["a=1".to_string(), "b=2".to_string()]));
        assert!(reply.header("set-cookie").is_none());
        assert!(reply.header("transfer-encoding").is_none());
        assert_eq!(reply.header("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn rest_reply_keeps_every_value() {
        let reply = InvocationResponse::from_upstream(EventKind::RestApi, upstream("application/json", b"{}"));
        let multi = reply.multi_value_headers.as_ref().unwrap();
        assert_eq!(multi["set-cookie"], vec!["a=1", "b=2"]);
        assert_eq!(reply.headers["set-cookie"], "b=2");
        assert!(reply.cookies.is_none());
    }

    #[test]
    fn alb_reply_has_status_description() {
        let reply = InvocationResponse::from_upstream(
            EventKind::Alb { multi_value_headers: false },
            upstream("text/html; charset=utf-8", b"<p>hi</p>"),
        );
        assert_eq!(reply.status_description.as_deref(), Some("200 OK"));
        assert!(reply.multi_value_headers.is_none());
    }

    #[test]
    fn binary_body_is_base64() {
        let reply = InvocationResponse::from_upstream(
            EventKind::HttpApi,
            upstream("image/png", &[0x89, 0x50, 0x4e, 0x47]),
        );
        assert!(reply.is_base64_encoded);
        assert_eq!(reply.body_bytes().unwrap(), Bytes::from_static(&[0x89, 0x50, 0x4e, 0x47]));
    }

    #[test]
    fn error_reply_is_json() {
        let err = AdapterError::UpstreamTimeout(100);
        let reply = InvocationResponse::from_error(EventKind::RestApi, &err, None);
        assert_eq!(reply.status_code, 504);
        assert_eq!(reply.header("content-type"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(body["error"], "UpstreamTimeoutError");
    }

    #[test]
    fn serializes_camel_case_without_empty_fields() {
        let reply = InvocationResponse::from_upstream(EventKind::HttpApi, ForwardedResponse {
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        });
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["statusCode"], 204);
        assert_eq!(json["isBase64Encoded"], false);
        assert!(json.get("headers").is_none());
        assert!(json.get("multiValueHeaders").is_none());
    }

    #[test]
    fn opaque_header_values_are_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-disposition",
            HeaderValue::from_bytes("attachment; filename=\"r\u{e9}sum\u{e9}.pdf\"".as_bytes()).unwrap(),
        );
        let reply = InvocationResponse::from_upstream(EventKind::HttpApi, ForwardedResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::new(),
        });
        assert_eq!(
            reply.header("content-disposition"),
            Some("attachment; filename=\"r\u{e9}sum\u{e9}.pdf\"")
        );
    }

    #[test]
    fn pass_through_value_parses_text_json_only() {
        let reply = InvocationResponse::from_upstream(EventKind::PassThrough, upstream("application/json", b"[1,2]"));
        assert_eq!(reply.pass_through_value(), serde_json::json!([1, 2]));

        let reply = InvocationResponse::from_upstream(EventKind::PassThrough, upstream("image/png", &[0x89, 0x50]));
        assert!(reply.pass_through_value().is_null());
    }
}
