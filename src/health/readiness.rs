//! Upstream readiness checking.
//!
//! # Responsibilities
//! - Poll the upstream until it answers (HTTP status or TCP connect)
//! - Log progress while waiting, with doubling intervals
//! - Remember readiness so later invocations skip the check

use axum::body::Body;
use axum::http::Request;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time;

use crate::config::{ReadinessProtocol, RelayConfig};
use crate::observability::metrics;

/// Startup check cut-off when the upstream may finish booting later.
pub const ASYNC_INIT_BUDGET: Duration = Duration::from_millis(9_800);

/// Logging schedule for a long wait: 2s, 4s, 8s, ...
#[derive(Debug)]
struct Checkpoint {
    start: Instant,
    next: Duration,
}

impl Checkpoint {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            next: Duration::from_secs(2),
        }
    }

    /// The checkpoint just passed, at most once each.
    fn lapsed(&mut self) -> Option<Duration> {
        let elapsed = self.start.elapsed();
        if elapsed < self.next {
            return None;
        }
        let reported = self.next;
        self.next = self.next.saturating_mul(2);
        Some(reported)
    }
}

/// Checks the upstream and keeps the result.
#[derive(Debug, Clone)]
pub struct ReadinessCheck {
    client: Client<HttpConnector, Body>,
    url: String,
    tcp_addr: String,
    protocol: ReadinessProtocol,
    min_unhealthy_status: u16,
    interval: Duration,
    async_init: bool,
    ready: Arc<AtomicBool>,
}

impl ReadinessCheck {
    pub fn new(config: &RelayConfig, client: Client<HttpConnector, Body>) -> Self {
        let port = config.readiness.port.unwrap_or(config.upstream.port);
        Self {
            client,
            url: format!("http://{}:{}{}", config.upstream.host, port, config.readiness.path),
            tcp_addr: format!("{}:{}", config.upstream.host, port),
            protocol: config.readiness.protocol,
            min_unhealthy_status: config.readiness.min_unhealthy_status,
            interval: Duration::from_millis(config.readiness.interval_ms),
            async_init: config.readiness.async_init,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn async_init(&self) -> bool {
        self.async_init
    }

    /// Startup check. With `async_init` it gives up after
    /// [`ASYNC_INIT_BUDGET`] and leaves the rest to the first invocation.
    pub async fn check_init(&self) -> bool {
        if self.async_init {
            match time::timeout(ASYNC_INIT_BUDGET, self.wait_until_ready()).await {
                Ok(()) => true,
                Err(_) => {
                    tracing::info!(url = %self.url, "Upstream not ready at init, continuing in the background");
                    false
                }
            }
        } else {
            self.wait_until_ready().await;
            true
        }
    }

    /// Wait for readiness unless it has already been observed.
    pub async fn ensure_ready(&self) {
        if !self.is_ready() {
            self.wait_until_ready().await;
        }
    }

    /// Check every `interval` until the upstream is ready.
    pub async fn wait_until_ready(&self) {
        let mut checkpoint = Checkpoint::new();
        loop {
            if self.check_once().await {
                self.ready.store(true, Ordering::SeqCst);
                metrics::record_readiness(true);
                tracing::info!(url = %self.url, protocol = ?self.protocol, "Upstream is ready");
                return;
            }
            if let Some(waited) = checkpoint.lapsed() {
                tracing::info!(url = %self.url, waited_ms = waited.as_millis() as u64, "Upstream is not ready yet");
                metrics::record_readiness(false);
            }
            time::sleep(self.interval).await;
        }
    }

    /// A single check.
    pub async fn check_once(&self) -> bool {
        match self.protocol {
            ReadinessProtocol::Http => {
                let request = match Request::builder()
                    .method("GET")
                    .uri(&self.url)
                    .header("user-agent", "lambda-relay-readiness")
                    .body(Body::empty())
                {
                    Ok(req) => req,
                    Err(e) => {
                        tracing::error!(url = %self.url, error = %e, "Failed to build readiness request");
                        return false;
                    }
                };
                match self.client.request(request).await {
                    Ok(response) => {
                        let status = response.status().as_u16();
                        let ready = (100..self.min_unhealthy_status).contains(&status);
                        tracing::trace!(status, ready, "Readiness check answered");
                        ready
                    }
                    Err(e) => {
                        tracing::trace!(error = %e, "Readiness check failed");
                        false
                    }
                }
            }
            ReadinessProtocol::Tcp => TcpStream::connect(&self.tcp_addr).await.is_ok(),
        }
    }
}
