//! Runtime API polling loop.

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::adapter::{Adapter, Reply};
use crate::config::FunctionConfig;
use crate::event::InvocationContext;

const API_VERSION: &str = "2018-06-01";
const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
const DEADLINE_HEADER: &str = "lambda-runtime-deadline-ms";
const FUNCTION_ARN_HEADER: &str = "lambda-runtime-invoked-function-arn";
const TRACE_ID_HEADER: &str = "lambda-runtime-trace-id";
const CLIENT_CONTEXT_HEADER: &str = "lambda-runtime-client-context";
const COGNITO_IDENTITY_HEADER: &str = "lambda-runtime-cognito-identity";

/// Delay before polling again after the runtime API itself failed.
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Errors talking to the runtime API.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime API request failed: {0}")]
    Http(#[from] hyper_util::client::legacy::Error),

    #[error("runtime API body error: {0}")]
    Body(#[from] hyper::Error),

    #[error("runtime API returned {0}")]
    Status(StatusCode),

    #[error("runtime API response is missing the {0} header")]
    MissingHeader(&'static str),

    #[error("failed to build runtime API request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("failed to encode reply: {0}")]
    Json(#[from] serde_json::Error),
}

/// One event handed out by `/invocation/next`.
#[derive(Debug)]
pub struct NextInvocation {
    pub context: InvocationContext,
    pub body: bytes::Bytes,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorPayload {
    error_message: String,
    error_type: String,
}

/// Pulls invocations from the hosting runtime and answers them.
///
/// The protocol hands out one invocation at a time; each is answered before
/// the next is requested.
pub struct RuntimeApiDriver {
    adapter: Adapter,
    client: Client<HttpConnector, Body>,
    base_url: String,
}

impl RuntimeApiDriver {
    /// `runtime_api` is the host:port authority of the runtime API.
    pub fn new(adapter: Adapter, runtime_api: &str) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            adapter,
            client,
            base_url: format!("http://{}/{}/runtime", runtime_api, API_VERSION),
        }
    }

    /// Poll until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(runtime_api = %self.base_url, "Runtime API driver starting");

        loop {
            let next = tokio::select! {
                next = self.next_invocation() => next,
                _ = shutdown.recv() => {
                    tracing::info!("Runtime API driver received shutdown signal, exiting loop");
                    break;
                }
            };

            match next {
                Ok(invocation) => {
                    if let Err(e) = self.process(invocation).await {
                        tracing::error!(error = %e, "Failed to deliver invocation reply");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to fetch next invocation");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Long-poll the next invocation.
    pub async fn next_invocation(&self) -> Result<NextInvocation, RuntimeError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("{}/invocation/next", self.base_url))
            .body(Body::empty())?;
        let response = self.client.request(request).await?;
        if response.status() != StatusCode::OK {
            return Err(RuntimeError::Status(response.status()));
        }

        let context = context_from_headers(response.headers(), self.adapter.function())?;
        let body = response.into_body().collect().await?.to_bytes();
        Ok(NextInvocation { context, body })
    }

    /// Forward one invocation and post its reply.
    pub async fn process(&self, invocation: NextInvocation) -> Result<(), RuntimeError> {
        let request_id = invocation.context.request_id.clone();
        let reply = self
            .adapter
            .handle_bytes(&invocation.body, Some(invocation.context))
            .await;
        self.post_reply(&request_id, &reply).await
    }

    async fn post_reply(&self, request_id: &str, reply: &Reply) -> Result<(), RuntimeError> {
        let runtime_error = reply.error.as_ref().filter(|_| reply.is_runtime_error());
        let (path, payload) = match runtime_error {
            Some(err) => (
                "error",
                serde_json::to_vec(&ErrorPayload {
                    error_message: err.to_string(),
                    error_type: err.kind().to_string(),
                })?,
            ),
            None => ("response", serde_json::to_vec(&reply.payload())?),
        };

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(format!("{}/invocation/{}/{}", self.base_url, request_id, path))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(err) = runtime_error {
            builder = builder.header("lambda-runtime-function-error-type", err.kind());
        }
        let request = builder.body(Body::from(payload))?;

        let response = self.client.request(request).await?;
        let status = response.status();
        // Drain so the connection goes back to the pool.
        let _ = response.into_body().collect().await;
        if !status.is_success() {
            return Err(RuntimeError::Status(status));
        }

        tracing::debug!(request_id = %request_id, endpoint = path, "Reply delivered to runtime API");
        Ok(())
    }
}

fn context_from_headers(headers: &HeaderMap, function: &FunctionConfig) -> Result<InvocationContext, RuntimeError> {
    let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(String::from);

    let request_id = text(REQUEST_ID_HEADER).ok_or(RuntimeError::MissingHeader(REQUEST_ID_HEADER))?;
    Ok(InvocationContext {
        deadline: text(DEADLINE_HEADER).and_then(|d| d.parse().ok()).unwrap_or_default(),
        invoked_function_arn: text(FUNCTION_ARN_HEADER).unwrap_or_default(),
        xray_trace_id: text(TRACE_ID_HEADER),
        client_context: json_header(headers, CLIENT_CONTEXT_HEADER),
        identity: json_header(headers, COGNITO_IDENTITY_HEADER),
        env_config: function.clone(),
        request_id,
    })
}

fn json_header(headers: &HeaderMap, name: &'static str) -> Option<serde_json::Value> {
    let value = headers.get(name)?;
    match serde_json::from_slice(value.as_bytes()) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(header = name, error = %e, "Ignoring malformed runtime context header");
            None
        }
    }
}
