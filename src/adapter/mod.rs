//! Request forwarding adapter.
//!
//! # Data Flow
//! ```text
//! InvocationEvent
//!     → event::into_parts (translation, 400 on failure)
//!     → http::request (rewrites → ForwardedRequest)
//!     → net::connection (bounded slot checkout)
//!     → hyper client → upstream listener
//!     → bounded body collection (ForwardedResponse)
//!     → http::response (InvocationResponse)
//! ```
//!
//! The whole upstream leg runs under one deadline. Dropping the invocation
//! future drops the upstream request and releases its slot.

pub mod state;

use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::time;
use tower::{Layer, Service, ServiceExt};
use tower_http::compression::CompressionLayer;

pub use state::{FailureKind, InvocationState, Reply, ReplyPayload};

use crate::config::validation::parse_status_codes;
use crate::config::{FunctionConfig, PoolConfig, RelayConfig};
use crate::error::{AdapterError, AdapterResult};
use crate::event::{EventKind, InvocationContext, InvocationEvent};
use crate::health::ReadinessCheck;
use crate::http::request::RequestRewrite;
use crate::http::response::{ForwardedResponse, InvocationResponse};
use crate::net::{SlotId, UpstreamSlots};
use crate::observability::metrics;
use crate::resilience::timeouts::invocation_budget;

/// Pooled HTTP client used for every upstream call.
pub type UpstreamClient = Client<HttpConnector, Body>;

/// Build the upstream client from pool settings.
pub fn build_client(pool: &PoolConfig) -> UpstreamClient {
    let mut connector = HttpConnector::new();
    if pool.keepalive_secs > 0 {
        connector.set_keepalive(Some(Duration::from_secs(pool.keepalive_secs)));
    }
    connector.set_nodelay(pool.nodelay);

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(pool.idle_timeout_secs))
        .pool_max_idle_per_host(pool.max_idle_per_host)
        .http2_only(pool.http2_only)
        .build(connector)
}

/// Forwards invocations to the upstream listener.
///
/// Cheap to clone; clones share the client, slots and readiness state.
#[derive(Clone)]
pub struct Adapter {
    client: UpstreamClient,
    rewrite: Arc<RequestRewrite>,
    pass_through_path: Arc<str>,
    error_status_codes: Arc<[u16]>,
    function: Arc<FunctionConfig>,
    compression: bool,
    timeout: Duration,
    max_response_bytes: usize,
    slots: UpstreamSlots,
    readiness: ReadinessCheck,
}

impl Adapter {
    /// Create a new adapter with the given configuration.
    pub fn new(config: &RelayConfig) -> Result<Self, url::ParseError> {
        let client = build_client(&config.pool);
        let rewrite = RequestRewrite::from_config(&config.upstream, &config.routing)?;
        let error_status_codes = config
            .routing
            .error_status_codes
            .as_deref()
            .map(parse_status_codes)
            .unwrap_or_default();

        tracing::info!(
            upstream = %rewrite.base_url(),
            timeout_ms = config.upstream.timeout_ms,
            max_connections = config.pool.max_connections,
            pool_max_idle = config.pool.max_idle_per_host,
            http2_only = config.pool.http2_only,
            compression = config.routing.compression,
            "Adapter configured"
        );

        Ok(Self {
            readiness: ReadinessCheck::new(config, client.clone()),
            client,
            rewrite: Arc::new(rewrite),
            pass_through_path: Arc::from(config.routing.pass_through_path.as_str()),
            error_status_codes: Arc::from(error_status_codes),
            function: Arc::new(config.function.clone()),
            compression: config.routing.compression,
            timeout: config.upstream.timeout(),
            max_response_bytes: config.limits.max_response_bytes,
            slots: UpstreamSlots::new(config.pool.max_connections),
        })
    }

    pub fn readiness(&self) -> &ReadinessCheck {
        &self.readiness
    }

    /// Function identity attached to every invocation context.
    pub fn function(&self) -> &FunctionConfig {
        &self.function
    }

    /// Upstream requests currently running.
    pub fn in_flight(&self) -> u64 {
        self.slots.in_flight()
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available()
    }

    /// Forward one event and return its reply in HTTP form.
    pub async fn handle(&self, event: InvocationEvent) -> InvocationResponse {
        self.invoke(event, None).await.response
    }

    /// Parse raw event JSON and forward it. Unparseable events get a 400 reply.
    pub async fn handle_bytes(&self, bytes: &[u8], context: Option<InvocationContext>) -> Reply {
        match InvocationEvent::from_slice(bytes) {
            Ok(event) => self.invoke(event, context).await,
            Err(err) => self.finish(EventKind::HttpApi, Err(err), context.as_ref(), Instant::now()),
        }
    }

    /// Forward one event with optional runtime context.
    pub async fn invoke(&self, event: InvocationEvent, context: Option<InvocationContext>) -> Reply {
        let start = Instant::now();
        let kind = event.kind();

        let request = match event
            .into_parts(&self.pass_through_path)
            .and_then(|parts| self.rewrite.forward_request(parts, context.as_ref()))
        {
            Ok(request) => request,
            Err(err) => return self.finish(kind, Err(err), context.as_ref(), start),
        };

        let budget = invocation_budget(self.timeout, context.as_ref().and_then(InvocationContext::remaining));
        tracing::debug!(
            request_id = request_id(context.as_ref()),
            method = %request.method(),
            uri = %request.uri(),
            budget_ms = budget.as_millis() as u64,
            state = InvocationState::Forwarding.label(),
            "Sending request to upstream"
        );

        let result = match time::timeout(budget, self.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::UpstreamTimeout(budget.as_millis() as u64)),
        };
        self.finish(kind, result, context.as_ref(), start)
    }

    async fn send(&self, request: Request<Body>) -> AdapterResult<ForwardedResponse> {
        if self.readiness.async_init() {
            self.readiness.ensure_ready().await;
        }

        let slot = self
            .slots
            .checkout()
            .await
            .ok_or_else(|| AdapterError::Upstream("upstream slots closed".to_string()))?;

        if self.compression {
            let service = CompressionLayer::new().layer(tower::service_fn(|req| self.client.request(req)));
            let response = service
                .oneshot(request)
                .await
                .map_err(|e| self.transport_error(slot.id(), e))?;
            self.collect(response).await
        } else {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| self.transport_error(slot.id(), e))?;
            self.collect(response).await
        }
    }

    fn transport_error(&self, slot: SlotId, err: hyper_util::client::legacy::Error) -> AdapterError {
        tracing::debug!(slot = %slot, error = ?err, "Upstream request failed");
        if err.is_connect() {
            AdapterError::ConnectionRefused(self.rewrite.base_url().to_string())
        } else {
            AdapterError::Upstream(err.to_string())
        }
    }

    /// Read the whole body, failing once it passes `max_response_bytes`.
    async fn collect<B>(&self, response: Response<B>) -> AdapterResult<ForwardedResponse>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = response.into_parts();
        let body = Limited::new(body, self.max_response_bytes)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<LengthLimitError>() {
                    AdapterError::ResponseTooLarge {
                        limit: self.max_response_bytes,
                    }
                } else {
                    AdapterError::Upstream(e.to_string())
                }
            })?
            .to_bytes();

        Ok(ForwardedResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    fn finish(
        &self,
        kind: EventKind,
        result: AdapterResult<ForwardedResponse>,
        context: Option<&InvocationContext>,
        start: Instant,
    ) -> Reply {
        let reply = match result {
            Ok(upstream) if self.error_status_codes.contains(&upstream.status.as_u16()) => {
                let err = AdapterError::UpstreamErrorStatus(upstream.status.as_u16());
                Reply::failed(kind, InvocationResponse::from_error(kind, &err, Some(upstream)), err)
            }
            Ok(upstream) => Reply::succeeded(kind, InvocationResponse::from_upstream(kind, upstream)),
            Err(err) => Reply::failed(kind, InvocationResponse::from_error(kind, &err, None), err),
        };

        let status = reply.response.status_code;
        match &reply.error {
            None => tracing::debug!(
                request_id = request_id(context),
                status,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Responding to invocation"
            ),
            Some(err) => tracing::warn!(
                request_id = request_id(context),
                status,
                outcome = reply.state.label(),
                error = %err,
                "Invocation failed"
            ),
        }
        metrics::record_invocation(reply.state.label(), status, start);
        reply
    }
}

fn request_id(context: Option<&InvocationContext>) -> &str {
    context.map(|c| c.request_id.as_str()).unwrap_or("-")
}

/// `tower::Service` view of the adapter. Failures are replies, so the
/// service never errors.
impl Service<InvocationEvent> for Adapter {
    type Response = InvocationResponse;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: InvocationEvent) -> Self::Future {
        let adapter = self.clone();
        Box::pin(async move { Ok(adapter.handle(event).await) })
    }
}
