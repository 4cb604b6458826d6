//! lambda-relay
//!
//! Runs next to an HTTP application inside a serverless environment and
//! turns runtime invocations into plain HTTP requests against it.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                 LAMBDA RELAY                 │
//!   Runtime API /      │  ┌─────────┐   ┌─────────┐   ┌────────────┐  │
//!   invoke endpoint ───┼─▶│ runtime │──▶│  event  │──▶│  adapter   │──┼──▶ upstream
//!                      │  │ / http  │   │  parse  │   │ (timeout,  │  │    listener
//!   reply         ◀────┼──│ server  │◀──│ reply   │◀──│  slots)    │◀─┼─── 127.0.0.1:port
//!                      │  └─────────┘   └─────────┘   └────────────┘  │
//!                      │  config · readiness · observability · lifecycle │
//!                      └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use lambda_relay::config::{load_from_env, InvokeMode};
use lambda_relay::lifecycle::{signals, startup, Shutdown};
use lambda_relay::observability::logging;

#[derive(Parser)]
#[command(name = "lambda-relay")]
#[command(about = "Forward serverless invocations to a local HTTP server", long_about = None)]
struct Cli {
    /// TOML configuration file; environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Inbound driver: runtime_api or local.
    #[arg(short, long)]
    mode: Option<InvokeMode>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_from_env(cli.config.as_deref(), cli.mode)?;

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        upstream = %config.upstream.base_url(),
        mode = ?config.invoke.mode,
        timeout_ms = config.upstream.timeout_ms,
        "lambda-relay starting"
    );

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    startup::run(config, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
