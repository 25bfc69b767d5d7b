// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Gavel Node
//!
//! Entry point for the `gavel-node` binary. Parses CLI arguments, initializes
//! logging and metrics, builds the contract host, and serves the HTTP/WS API.
//!
//! The binary supports two subcommands:
//!
//! - `run`    : start the node
//! - `version`: print build version information

mod api;
mod cli;
mod host;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, Mutex};

use cli::{Commands, GavelNodeCli};
use host::{BroadcastSink, Host, SystemClock};
use metrics::NodeMetrics;

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = GavelNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: contract host, API server, and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "gavel_node=info,gavel_contracts=info,gavel_protocol=info,tower_http=debug",
        args.log_format,
    );

    let config = args.host_config();
    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        owner = %config.owner,
        registry = %config.registry_address,
        "starting gavel-node"
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let sink = Arc::new(BroadcastSink::new(event_tx.clone(), Arc::clone(&node_metrics)));

    // --- Contracts ---
    let host = Host::new(config, sink).context("failed to initialize contract host")?;
    tracing::info!(
        assets = ?host.registry.supported_assets(),
        bounds = ?host.registry.duration_bounds(),
        "registry ready"
    );

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            gavel_protocol::config::PROTOCOL_VERSION,
        ),
        host: Arc::new(Mutex::new(host)),
        clock: Arc::new(SystemClock),
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("gavel-node stopped");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("gavel-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", gavel_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
