//! # Auction Registry Contract
//!
//! The factory. It owns governance over which assets may be auctioned and
//! for how long, creates one [`AuctionEngine`] per auction, authorizes each
//! engine with the [`RewardIssuer`], and keeps an append-only list of every
//! engine it ever created.
//!
//! ## Security Model
//!
//! - **Owner gating**: whitelist, duration bounds, pause, and ownership
//!   changes require the caller to be the current owner.
//! - **Liveness probe**: an asset joins the whitelist only if its ledger
//!   answers `total_supply`.
//! - **Append-only index**: `instances` only grows. Removing an asset or
//!   pausing creation never touches existing engines.
//!
//! ## Pagination
//!
//! [`get_instances`](AuctionRegistry::get_instances) caps a page at
//! `max_page_size` entries and rejects a start index past the end, even on
//! an empty list.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gavel_protocol::config::{
    DEFAULT_MAX_DURATION_SECS, DEFAULT_MIN_DURATION_SECS, EXTENSION_WINDOW_SECS, MAX_PAGE_SIZE,
};
use gavel_protocol::{AssetId, EngineId, Principal, ValueTransfer};

use crate::auction_engine::{AuctionEngine, AuctionError, BidReceipt, EngineParams, SettlementReceipt};
use crate::error::{Classified, ErrorClass};
use crate::events::{AuctionEvent, EventSink};
use crate::reward_issuer::{RewardError, RewardIssuer};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A governance call came from someone other than the owner.
    #[error("unauthorized: {caller} is not the registry owner")]
    NotOwner {
        /// The principal that attempted the call.
        caller: Principal,
    },

    /// The asset's ledger failed the liveness probe.
    #[error("invalid asset {asset}: {reason}")]
    InvalidAsset {
        /// The asset that was offered.
        asset: AssetId,
        /// What the probe reported.
        reason: String,
    },

    /// The asset is already whitelisted.
    #[error("asset {0} is already supported")]
    AlreadySupported(AssetId),

    /// The asset is not on the whitelist and cannot be removed.
    #[error("asset {0} is not supported")]
    NotSupported(AssetId),

    /// An auction was requested for an asset that is not whitelisted.
    #[error("asset {0} is not accepted for new auctions")]
    UnsupportedAsset(AssetId),

    /// A duration or duration range is unacceptable.
    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    /// The beneficiary is the null principal.
    #[error("beneficiary must not be null")]
    InvalidBeneficiary,

    /// Auction creation is paused.
    #[error("auction creation is paused")]
    CreationPaused,

    /// A page request exceeded the cap.
    #[error("batch too large: requested {requested}, max {max}")]
    BatchTooLarge {
        /// Requested page size.
        requested: usize,
        /// The configured cap.
        max: usize,
    },

    /// A page request started past the end of the list.
    #[error("start index {start} out of bounds (len {len})")]
    StartOutOfBounds {
        /// Requested start index.
        start: usize,
        /// Number of instances.
        len: usize,
    },

    /// No engine with that identifier was created here.
    #[error("unknown auction instance: {0}")]
    UnknownInstance(EngineId),

    /// The null principal was offered as owner.
    #[error("owner must not be null")]
    InvalidOwner,

    /// The registry configuration is inconsistent.
    #[error("invalid registry config: {0}")]
    InvalidConfig(String),

    /// Forwarded from the engine.
    #[error(transparent)]
    Engine(#[from] AuctionError),

    /// Forwarded from the reward issuer.
    #[error(transparent)]
    Reward(#[from] RewardError),
}

impl Classified for RegistryError {
    fn class(&self) -> ErrorClass {
        match self {
            RegistryError::NotOwner { .. } => ErrorClass::Authorization,
            RegistryError::InvalidAsset { .. }
            | RegistryError::AlreadySupported(_)
            | RegistryError::NotSupported(_)
            | RegistryError::UnsupportedAsset(_)
            | RegistryError::InvalidDuration(_)
            | RegistryError::InvalidBeneficiary
            | RegistryError::BatchTooLarge { .. }
            | RegistryError::StartOutOfBounds { .. }
            | RegistryError::CreationPaused
            | RegistryError::InvalidOwner
            | RegistryError::InvalidConfig(_) => ErrorClass::Admission,
            RegistryError::UnknownInstance(_) => ErrorClass::State,
            RegistryError::Engine(e) => e.class(),
            RegistryError::Reward(e) => e.class(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            RegistryError::NotOwner { .. } => "NotOwner",
            RegistryError::InvalidAsset { .. } => "InvalidAsset",
            RegistryError::AlreadySupported(_) => "AlreadySupported",
            RegistryError::NotSupported(_) => "NotSupported",
            RegistryError::UnsupportedAsset(_) => "UnsupportedAsset",
            RegistryError::InvalidDuration(_) => "InvalidDuration",
            RegistryError::InvalidBeneficiary => "InvalidBeneficiary",
            RegistryError::CreationPaused => "CreationPaused",
            RegistryError::BatchTooLarge { .. } => "BatchTooLarge",
            RegistryError::StartOutOfBounds { .. } => "StartOutOfBounds",
            RegistryError::UnknownInstance(_) => "UnknownInstance",
            RegistryError::InvalidOwner => "InvalidOwner",
            RegistryError::InvalidConfig(_) => "InvalidConfig",
            RegistryError::Engine(e) => e.code(),
            RegistryError::Reward(e) => e.code(),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Registry policy knobs. Defaults come from [`gavel_protocol::config`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Initial lower duration bound, in seconds (inclusive).
    pub min_duration_secs: u64,
    /// Initial upper duration bound, in seconds (inclusive).
    pub max_duration_secs: u64,
    /// Anti-snipe window handed to every new engine.
    pub extension_window_secs: u64,
    /// Largest page `get_instances` will return. At most
    /// [`MAX_PAGE_SIZE`]; a config may only tighten the cap.
    pub max_page_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: DEFAULT_MIN_DURATION_SECS,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            extension_window_secs: EXTENSION_WINDOW_SECS,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.min_duration_secs >= self.max_duration_secs {
            return Err(RegistryError::InvalidConfig(format!(
                "min duration {}s must be below max {}s",
                self.min_duration_secs, self.max_duration_secs
            )));
        }
        if self.extension_window_secs == 0 {
            return Err(RegistryError::InvalidConfig(
                "extension window must be positive".into(),
            ));
        }
        if self.max_page_size == 0 || self.max_page_size > MAX_PAGE_SIZE {
            return Err(RegistryError::InvalidConfig(format!(
                "page size cap must be within 1..={MAX_PAGE_SIZE}, got {}",
                self.max_page_size
            )));
        }
        Ok(())
    }
}

/// The inclusive range of acceptable auction durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationBounds {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl DurationBounds {
    pub fn contains(&self, secs: u64) -> bool {
        (self.min_secs..=self.max_secs).contains(&secs)
    }
}

// ---------------------------------------------------------------------------
// AuctionRegistry
// ---------------------------------------------------------------------------

/// The auction factory and index.
pub struct AuctionRegistry {
    /// The registry's own principal. Engine ids are derived from it and the
    /// reward issuer must be bound to it.
    address: Principal,
    owner: Principal,
    rewards: Arc<RewardIssuer>,
    events: Arc<dyn EventSink>,
    config: RegistryConfig,
    /// Whitelisted assets and their ledgers.
    supported: BTreeMap<AssetId, Arc<dyn ValueTransfer>>,
    bounds: DurationBounds,
    paused: bool,
    /// Every engine ever created, in creation order.
    instances: Vec<EngineId>,
    instance_owner: HashMap<EngineId, Principal>,
    engines: HashMap<EngineId, AuctionEngine>,
    nonce: u64,
}

impl AuctionRegistry {
    /// Creates an empty, unpaused registry.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidOwner`] for a null owner,
    /// [`RegistryError::InvalidConfig`] if `config` does not validate.
    pub fn new(
        address: Principal,
        owner: Principal,
        rewards: Arc<RewardIssuer>,
        events: Arc<dyn EventSink>,
        config: RegistryConfig,
    ) -> Result<Self, RegistryError> {
        if owner.is_null() || address.is_null() {
            return Err(RegistryError::InvalidOwner);
        }
        config.validate()?;

        Ok(Self {
            address,
            owner,
            rewards,
            events,
            bounds: DurationBounds {
                min_secs: config.min_duration_secs,
                max_secs: config.max_duration_secs,
            },
            config,
            supported: BTreeMap::new(),
            paused: false,
            instances: Vec::new(),
            instance_owner: HashMap::new(),
            engines: HashMap::new(),
            nonce: 0,
        })
    }

    fn require_owner(&self, caller: &Principal) -> Result<(), RegistryError> {
        if caller != &self.owner {
            tracing::debug!(caller = %caller, "governance call rejected");
            return Err(RegistryError::NotOwner {
                caller: caller.clone(),
            });
        }
        Ok(())
    }

    // -- Governance ---------------------------------------------------------

    /// Whitelists the asset served by `ledger`. Owner only.
    ///
    /// The ledger must answer `total_supply`; a ledger that errors is
    /// rejected with [`RegistryError::InvalidAsset`].
    pub fn add_supported_asset(
        &mut self,
        caller: &Principal,
        ledger: Arc<dyn ValueTransfer>,
    ) -> Result<(), RegistryError> {
        self.require_owner(caller)?;
        let asset = ledger.asset();
        if self.supported.contains_key(&asset) {
            return Err(RegistryError::AlreadySupported(asset));
        }
        if let Err(e) = ledger.total_supply() {
            tracing::warn!(asset = %asset, error = %e, "asset failed liveness probe");
            return Err(RegistryError::InvalidAsset {
                asset,
                reason: e.to_string(),
            });
        }

        tracing::info!(asset = %asset, "asset supported");
        self.supported.insert(asset.clone(), ledger);
        self.events.emit(AuctionEvent::AssetAdded { asset });
        Ok(())
    }

    /// Drops `asset` from the whitelist. Owner only. Existing auctions in
    /// that asset keep running.
    pub fn remove_supported_asset(
        &mut self,
        caller: &Principal,
        asset: &AssetId,
    ) -> Result<(), RegistryError> {
        self.require_owner(caller)?;
        if self.supported.remove(asset).is_none() {
            return Err(RegistryError::NotSupported(asset.clone()));
        }
        tracing::info!(asset = %asset, "asset removed");
        self.events.emit(AuctionEvent::AssetRemoved {
            asset: asset.clone(),
        });
        Ok(())
    }

    /// Replaces the duration bounds. Owner only. Requires `min < max`.
    pub fn set_duration_bounds(
        &mut self,
        caller: &Principal,
        min_secs: u64,
        max_secs: u64,
    ) -> Result<(), RegistryError> {
        self.require_owner(caller)?;
        if min_secs >= max_secs {
            return Err(RegistryError::InvalidDuration(format!(
                "min {min_secs}s must be below max {max_secs}s"
            )));
        }
        self.bounds = DurationBounds { min_secs, max_secs };
        tracing::info!(min_secs, max_secs, "duration bounds updated");
        self.events
            .emit(AuctionEvent::DurationBoundsChanged { min_secs, max_secs });
        Ok(())
    }

    /// Pauses or resumes auction creation. Owner only.
    pub fn set_paused(&mut self, caller: &Principal, paused: bool) -> Result<(), RegistryError> {
        self.require_owner(caller)?;
        self.paused = paused;
        tracing::info!(paused, "auction creation pause toggled");
        self.events.emit(AuctionEvent::PauseToggled { paused });
        Ok(())
    }

    /// Hands governance to `new_owner`. Owner only.
    pub fn transfer_ownership(
        &mut self,
        caller: &Principal,
        new_owner: Principal,
    ) -> Result<(), RegistryError> {
        self.require_owner(caller)?;
        if new_owner.is_null() {
            return Err(RegistryError::InvalidOwner);
        }
        let previous = std::mem::replace(&mut self.owner, new_owner.clone());
        tracing::info!(previous = %previous, new_owner = %new_owner, "registry ownership transferred");
        self.events.emit(AuctionEvent::OwnershipTransferred {
            previous,
            new_owner,
        });
        Ok(())
    }

    // -- Factory ------------------------------------------------------------

    /// Creates a new auction for `caller`, ending `duration_secs` after `now`.
    ///
    /// Checks, in order: asset supported, duration within bounds,
    /// beneficiary non-null, creation not paused. The engine is authorized
    /// with the reward issuer before it is recorded; if that fails nothing
    /// is recorded.
    pub fn create_auction(
        &mut self,
        caller: &Principal,
        asset: &AssetId,
        duration_secs: u64,
        beneficiary: Principal,
        now: DateTime<Utc>,
    ) -> Result<EngineId, RegistryError> {
        let ledger = self
            .supported
            .get(asset)
            .cloned()
            .ok_or_else(|| RegistryError::UnsupportedAsset(asset.clone()))?;
        if !self.bounds.contains(duration_secs) {
            return Err(RegistryError::InvalidDuration(format!(
                "{duration_secs}s outside [{}s, {}s]",
                self.bounds.min_secs, self.bounds.max_secs
            )));
        }
        if beneficiary.is_null() {
            return Err(RegistryError::InvalidBeneficiary);
        }
        if self.paused {
            return Err(RegistryError::CreationPaused);
        }

        let id = EngineId::derive(&self.address, caller, self.nonce);
        let engine = AuctionEngine::new(EngineParams {
            id: id.clone(),
            ledger,
            beneficiary: beneficiary.clone(),
            start_time: now,
            duration_secs,
            extension_window_secs: self.config.extension_window_secs,
            rewards: self.rewards.clone(),
            events: self.events.clone(),
        })?;
        self.rewards.authorize(&self.address, &id)?;

        self.nonce += 1;
        self.instances.push(id.clone());
        self.instance_owner.insert(id.clone(), caller.clone());
        self.engines.insert(id.clone(), engine);

        tracing::info!(engine = %id, creator = %caller, asset = %asset, duration_secs, "auction created");
        self.events.emit(AuctionEvent::InstanceCreated {
            engine: id.clone(),
            creator: caller.clone(),
            asset: asset.clone(),
            duration_secs,
            beneficiary,
        });
        Ok(id)
    }

    /// Bids on the engine `id`.
    pub fn bid(
        &mut self,
        id: &EngineId,
        bidder: &Principal,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<BidReceipt, RegistryError> {
        Ok(self.engine_mut(id)?.bid(bidder, amount, now)?)
    }

    /// Settles the engine `id`.
    pub fn settle(
        &mut self,
        id: &EngineId,
        now: DateTime<Utc>,
    ) -> Result<SettlementReceipt, RegistryError> {
        Ok(self.engine_mut(id)?.settle(now)?)
    }

    // -- Queries ------------------------------------------------------------

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// A page of engine ids in creation order.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::BatchTooLarge`] if `count` exceeds the page cap.
    /// - [`RegistryError::StartOutOfBounds`] if `start >= instance_count()`.
    pub fn get_instances(&self, start: usize, count: usize) -> Result<Vec<EngineId>, RegistryError> {
        if count > self.config.max_page_size {
            return Err(RegistryError::BatchTooLarge {
                requested: count,
                max: self.config.max_page_size,
            });
        }
        let len = self.instances.len();
        if start >= len {
            return Err(RegistryError::StartOutOfBounds { start, len });
        }
        let end = start + count.min(len - start);
        Ok(self.instances[start..end].to_vec())
    }

    /// Who created `id`, if this registry created it.
    pub fn instance_owner(&self, id: &EngineId) -> Option<&Principal> {
        self.instance_owner.get(id)
    }

    pub fn engine(&self, id: &EngineId) -> Result<&AuctionEngine, RegistryError> {
        self.engines
            .get(id)
            .ok_or_else(|| RegistryError::UnknownInstance(id.clone()))
    }

    pub fn engine_mut(&mut self, id: &EngineId) -> Result<&mut AuctionEngine, RegistryError> {
        self.engines
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownInstance(id.clone()))
    }

    /// Number of engines still accepting bids at `now`.
    pub fn open_count(&self, now: DateTime<Utc>) -> usize {
        self.engines
            .values()
            .filter(|e| !e.is_settled() && now < e.end_time())
            .count()
    }

    pub fn is_supported(&self, asset: &AssetId) -> bool {
        self.supported.contains_key(asset)
    }

    /// Whitelisted assets, sorted by symbol.
    pub fn supported_assets(&self) -> Vec<AssetId> {
        self.supported.keys().cloned().collect()
    }

    pub fn ledger(&self, asset: &AssetId) -> Option<Arc<dyn ValueTransfer>> {
        self.supported.get(asset).cloned()
    }

    pub fn duration_bounds(&self) -> DurationBounds {
        self.bounds
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn owner(&self) -> &Principal {
        &self.owner
    }

    pub fn address(&self) -> &Principal {
        &self.address
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn rewards(&self) -> &Arc<RewardIssuer> {
        &self.rewards
    }
}

impl std::fmt::Debug for AuctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuctionRegistry")
            .field("address", &self.address)
            .field("owner", &self.owner)
            .field("supported", &self.supported.keys().collect::<Vec<_>>())
            .field("bounds", &self.bounds)
            .field("paused", &self.paused)
            .field("instances", &self.instances.len())
            .finish_non_exhaustive()
    }
}
