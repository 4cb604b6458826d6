//! Local invoke endpoint.
//!
//! # Responsibilities
//! - Create Axum Router with the invoke and health handlers
//! - Wire up middleware (tracing, body limit, request ID)
//! - Bind server to listener, stop on shutdown signal
//! - Hand each event body to the adapter and return its wire payload as JSON

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::adapter::{Adapter, ReplyPayload};
use crate::event::InvocationContext;
use crate::http::request::X_REQUEST_ID;

/// Optional absolute deadline (ms since epoch) for a local invocation.
pub const X_RELAY_DEADLINE_MS: &str = "x-relay-deadline-ms";

/// Path the runtime interface emulator uses for invocations.
pub const EMULATOR_INVOKE_PATH: &str = "/2015-03-31/functions/function/invocations";

/// HTTP server that accepts raw events and answers with replies.
pub struct InvokeServer {
    router: Router,
}

impl InvokeServer {
    pub fn new(adapter: Adapter, max_event_bytes: usize) -> Self {
        Self {
            router: Self::build_router(adapter, max_event_bytes),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(adapter: Adapter, max_event_bytes: usize) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);
        Router::new()
            .route(EMULATOR_INVOKE_PATH, post(invoke_handler))
            .route("/invoke", post(invoke_handler))
            .route("/health", get(health_handler))
            .with_state(adapter)
            .layer(RequestBodyLimitLayer::new(max_event_bytes))
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }

    /// The router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until the shutdown signal fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Invoke endpoint starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Invoke endpoint received shutdown signal");
            })
            .await?;

        tracing::info!("Invoke endpoint stopped");
        Ok(())
    }
}

async fn invoke_handler(
    State(adapter): State<Adapter>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<ReplyPayload> {
    let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let request_id = text(X_REQUEST_ID).unwrap_or("unknown");
    let mut context = InvocationContext::new(request_id).with_env_config(adapter.function().clone());
    if let Some(deadline) = text(X_RELAY_DEADLINE_MS).and_then(|d| d.parse().ok()) {
        context = context.with_deadline_ms(deadline);
    }

    tracing::debug!(request_id = %request_id, bytes = body.len(), "Local invocation");
    let reply = adapter.handle_bytes(&body, Some(context)).await;
    Json(reply.payload())
}

async fn health_handler(State(adapter): State<Adapter>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "ready": adapter.readiness().is_ready(),
        "in_flight": adapter.in_flight(),
        "available_slots": adapter.available_slots(),
    }))
}
