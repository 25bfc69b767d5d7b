//! # Prometheus Metrics
//!
//! Exposes auction activity for the node. Scraped by Prometheus at the
//! `/metrics` HTTP endpoint on the configured metrics port.
//!
//! Counters for contract activity are driven by contract events (see
//! [`NodeMetrics::record_event`]); rejections and latency are recorded by the
//! RPC gateway. All metrics live in a dedicated [`prometheus::Registry`].

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use gavel_contracts::{AuctionEvent, ErrorClass};

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Auctions created by the registry.
    pub auctions_created_total: IntCounter,
    /// Bids accepted across all engines.
    pub bids_accepted_total: IntCounter,
    /// Anti-snipe deadline extensions.
    pub deadline_extensions_total: IntCounter,
    /// Successful settlements.
    pub settlements_total: IntCounter,
    /// Participation credits minted.
    pub rewards_minted_total: IntCounter,
    /// Rejected contract calls, labelled by error class.
    pub rejected_operations_total: IntCounterVec,
    /// Engines still accepting bids, as of the last call.
    pub open_auctions: IntGauge,
    /// Time spent executing one RPC call, lock wait included.
    pub rpc_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("gavel".into()), None)
            .expect("failed to create prometheus registry");

        let auctions_created_total =
            IntCounter::new("auctions_created_total", "Total number of auctions created")
                .expect("metric creation");
        registry
            .register(Box::new(auctions_created_total.clone()))
            .expect("metric registration");

        let bids_accepted_total =
            IntCounter::new("bids_accepted_total", "Total number of accepted bids")
                .expect("metric creation");
        registry
            .register(Box::new(bids_accepted_total.clone()))
            .expect("metric registration");

        let deadline_extensions_total = IntCounter::new(
            "deadline_extensions_total",
            "Total number of anti-snipe deadline extensions",
        )
        .expect("metric creation");
        registry
            .register(Box::new(deadline_extensions_total.clone()))
            .expect("metric registration");

        let settlements_total =
            IntCounter::new("settlements_total", "Total number of settled auctions")
                .expect("metric creation");
        registry
            .register(Box::new(settlements_total.clone()))
            .expect("metric registration");

        let rewards_minted_total = IntCounter::new(
            "rewards_minted_total",
            "Total number of participation credits minted",
        )
        .expect("metric creation");
        registry
            .register(Box::new(rewards_minted_total.clone()))
            .expect("metric registration");

        let rejected_operations_total = IntCounterVec::new(
            Opts::new(
                "rejected_operations_total",
                "Total number of rejected contract calls",
            ),
            &["class"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(rejected_operations_total.clone()))
            .expect("metric registration");

        let open_auctions = IntGauge::new("open_auctions", "Auctions currently accepting bids")
            .expect("metric creation");
        registry
            .register(Box::new(open_auctions.clone()))
            .expect("metric registration");

        let rpc_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "JSON-RPC call latency in seconds")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(rpc_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            auctions_created_total,
            bids_accepted_total,
            deadline_extensions_total,
            settlements_total,
            rewards_minted_total,
            rejected_operations_total,
            open_auctions,
            rpc_latency_seconds,
        }
    }

    /// Bumps the counter matching a contract event.
    pub fn record_event(&self, event: &AuctionEvent) {
        match event {
            AuctionEvent::InstanceCreated { .. } => self.auctions_created_total.inc(),
            AuctionEvent::BidAccepted { .. } => self.bids_accepted_total.inc(),
            AuctionEvent::DeadlineExtended { .. } => self.deadline_extensions_total.inc(),
            AuctionEvent::Settled { .. } => self.settlements_total.inc(),
            AuctionEvent::RewardMinted { .. } => self.rewards_minted_total.inc(),
            _ => {}
        }
    }

    pub fn record_rejection(&self, class: ErrorClass) {
        let label = class.to_string();
        self.rejected_operations_total
            .with_label_values(&[label.as_str()])
            .inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
