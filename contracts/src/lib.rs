// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Gavel Auction Contracts
//!
//! Contract logic for Gavel. Three components, leaves first:
//!
//! - **Reward Issuer**: an authorization table of engines allowed to mint
//!   a fixed participation credit, one per accepted bid.
//! - **Auction Engine**: one per auction. Escrows the leading bid, refunds
//!   the previous leader, extends the deadline against sniping, and settles
//!   exactly once.
//! - **Auction Registry**: the factory. Whitelists assets, bounds
//!   durations, creates engines, authorizes them with the issuer, and keeps
//!   a paginated, creator-tagged list of everything it ever created.
//!
//! ## Design Principles
//!
//! 1. Refund before pull, flag before payout. Custody ordering is the whole
//!    game, so it is spelled out in code rather than hidden in a guard.
//! 2. A rejected operation leaves state exactly as it found it. The one
//!    documented exception is a failed settlement transfer.
//! 3. State transitions are explicit: enum statuses, not a pile of booleans
//!    read in different places.
//! 4. Every public type is serializable (serde) for wire transport.

pub mod auction_engine;
pub mod auction_registry;
pub mod error;
pub mod events;
pub mod reward_issuer;

pub use auction_engine::{
    AuctionEngine, AuctionError, AuctionSnapshot, AuctionStatus, BidReceipt, EngineParams, Refund,
    SettlementReceipt,
};
pub use auction_registry::{AuctionRegistry, DurationBounds, RegistryConfig, RegistryError};
pub use error::{Classified, ErrorClass};
pub use events::{AuctionEvent, EventLog, EventSink};
pub use reward_issuer::{RewardError, RewardIssuer};
