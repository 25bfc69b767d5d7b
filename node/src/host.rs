//! # Contract Host
//!
//! Owns the registry, the reward issuer, and one in-memory devnet ledger per
//! asset. The API wraps a single [`Host`] in a `tokio::sync::Mutex`, so every
//! RPC call runs alone against a consistent view and the engines never see
//! interleaved calls.
//!
//! Contract events go to a [`BroadcastSink`], which bumps the matching
//! Prometheus counters and fans them out to WebSocket subscribers.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use gavel_contracts::{
    AuctionEvent, AuctionRegistry, EventSink, RegistryConfig, RegistryError, RewardIssuer,
};
use gavel_protocol::{AssetId, InMemoryLedger, Principal};

use crate::metrics::SharedMetrics;

/// Source of `now` for every contract call.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Forwards contract events to the broadcast channel and the metrics.
pub struct BroadcastSink {
    tx: broadcast::Sender<AuctionEvent>,
    metrics: SharedMetrics,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<AuctionEvent>, metrics: SharedMetrics) -> Self {
        Self { tx, metrics }
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: AuctionEvent) {
        self.metrics.record_event(&event);
        tracing::debug!(kind = event.kind(), "contract event");
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}

/// Startup parameters for a [`Host`].
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub registry_address: Principal,
    pub owner: Principal,
    /// Assets whitelisted at startup, each backed by a fresh ledger.
    pub assets: Vec<AssetId>,
    pub registry: RegistryConfig,
}

/// Everything the node executes contract calls against.
pub struct Host {
    pub registry: AuctionRegistry,
    pub rewards: Arc<RewardIssuer>,
    ledgers: BTreeMap<AssetId, Arc<InMemoryLedger>>,
}

impl Host {
    /// Builds the issuer and registry, binds them, and whitelists the
    /// startup assets on behalf of the owner.
    pub fn new(config: HostConfig, events: Arc<dyn EventSink>) -> Result<Self, RegistryError> {
        let rewards = Arc::new(RewardIssuer::new(config.owner.clone(), events.clone()));
        rewards.set_registry(&config.owner, config.registry_address.clone())?;

        let registry = AuctionRegistry::new(
            config.registry_address,
            config.owner.clone(),
            rewards.clone(),
            events,
            config.registry,
        )?;

        let mut host = Self {
            registry,
            rewards,
            ledgers: BTreeMap::new(),
        };
        for asset in config.assets {
            host.add_asset(&config.owner, asset)?;
        }
        Ok(host)
    }

    /// Whitelists `asset`, creating its devnet ledger on first use. A ledger
    /// that was whitelisted before keeps its balances.
    pub fn add_asset(&mut self, caller: &Principal, asset: AssetId) -> Result<(), RegistryError> {
        let ledger = self
            .ledgers
            .get(&asset)
            .cloned()
            .unwrap_or_else(|| Arc::new(InMemoryLedger::new(asset.clone())));
        self.registry.add_supported_asset(caller, ledger.clone())?;
        self.ledgers.entry(asset).or_insert(ledger);
        Ok(())
    }

    /// The devnet ledger of `asset`, if it was ever whitelisted.
    pub fn ledger(&self, asset: &AssetId) -> Option<Arc<InMemoryLedger>> {
        self.ledgers.get(asset).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use gavel_contracts::EventLog;

    fn config() -> HostConfig {
        HostConfig {
            registry_address: Principal::new("registry"),
            owner: Principal::new("gov"),
            assets: vec![AssetId::new("usdc")],
            registry: RegistryConfig::default(),
        }
    }

    #[test]
    fn startup_assets_are_whitelisted() {
        let host = Host::new(config(), Arc::new(EventLog::new())).unwrap();
        assert!(host.registry.is_supported(&AssetId::new("USDC")));
        assert!(host.ledger(&AssetId::new("USDC")).is_some());
        assert_eq!(host.rewards.registry(), Some(Principal::new("registry")));
    }

    #[test]
    fn readding_asset_keeps_ledger() {
        let gov = Principal::new("gov");
        let usdc = AssetId::new("USDC");
        let mut host = Host::new(config(), Arc::new(EventLog::new())).unwrap();
        host.ledger(&usdc)
            .unwrap()
            .mint(&Principal::new("alice"), 5)
            .unwrap();

        host.registry.remove_supported_asset(&gov, &usdc).unwrap();
        host.add_asset(&gov, usdc.clone()).unwrap();
        assert_eq!(host.ledger(&usdc).unwrap().balance(&Principal::new("alice")), 5);
    }

    #[test]
    fn rejected_asset_creates_no_ledger() {
        let mut host = Host::new(config(), Arc::new(EventLog::new())).unwrap();
        let err = host
            .add_asset(&Principal::new("mallory"), AssetId::new("DAI"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotOwner { .. }));
        assert!(host.ledger(&AssetId::new("DAI")).is_none());
    }

    #[test]
    fn sink_counts_and_broadcasts() {
        let metrics = Arc::new(NodeMetrics::new());
        let (tx, mut rx) = broadcast::channel(8);
        let sink = BroadcastSink::new(tx, metrics.clone());

        sink.emit(AuctionEvent::PauseToggled { paused: true });
        assert_eq!(
            rx.try_recv().unwrap(),
            AuctionEvent::PauseToggled { paused: true }
        );

        let mut host = Host::new(config(), Arc::new(sink)).unwrap();
        host.registry
            .create_auction(
                &Principal::new("seller"),
                &AssetId::new("USDC"),
                3_600,
                Principal::new("treasury"),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(metrics.auctions_created_total.get(), 1);
    }
}
