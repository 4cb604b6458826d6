//! Startup orchestration.
//!
//! # Order
//! 1. Metrics exporter (optional)
//! 2. Adapter (client, rewrites, slots)
//! 3. Readiness check against the upstream
//! 4. Inbound driver: runtime API loop or local invoke endpoint
//!
//! Any startup error is fatal; invocation errors never are.

use thiserror::Error;
use tokio::net::TcpListener;

use crate::adapter::Adapter;
use crate::config::{InvokeMode, RelayConfig};
use crate::http::InvokeServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::runtime::RuntimeApiDriver;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid upstream address: {0}")]
    Upstream(#[from] url::ParseError),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("invoke.runtime_api is not set")]
    MissingRuntimeApi,

    #[error("failed to bind invoke endpoint: {0}")]
    Io(#[from] std::io::Error),
}

/// Start every subsystem and run the inbound driver until shutdown.
pub async fn run(config: RelayConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let mut early_shutdown = shutdown.subscribe();
    let driver_shutdown = shutdown.subscribe();

    if config.observability.metrics_enabled {
        let addr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr);
    }

    let adapter = Adapter::new(&config)?;

    tokio::select! {
        ready = adapter.readiness().check_init() => {
            tracing::info!(ready, "Readiness check at init finished");
        }
        _ = early_shutdown.recv() => {
            tracing::info!("Shutdown before the upstream became ready");
            return Ok(());
        }
    }

    match config.invoke.mode {
        InvokeMode::RuntimeApi => {
            let runtime_api = config
                .invoke
                .runtime_api
                .as_deref()
                .ok_or(StartupError::MissingRuntimeApi)?;
            RuntimeApiDriver::new(adapter, runtime_api).run(driver_shutdown).await;
        }
        InvokeMode::Local => {
            let listener = TcpListener::bind(&config.invoke.bind_address).await?;
            InvokeServer::new(adapter, config.limits.max_event_bytes)
                .run(listener, driver_shutdown)
                .await?;
        }
    }

    Ok(())
}
