//! # Auction Engine Contract
//!
//! One engine per auction. Bids are escrowed in the asset's own ledger
//! under the engine's principal; only the leading bid is ever held.
//!
//! ## Lifecycle
//!
//! 1. **Open**: `now < end_time`. Bids are accepted if they strictly beat
//!    the current leader.
//! 2. **Expired**: `now >= end_time`, not yet settled. Anyone may settle.
//! 3. **Settled**: proceeds paid (or stranded, see below). Terminal.
//!
//! ## Custody Ordering
//!
//! An accepted bid runs in a single ledger checkpoint:
//!
//! 1. refund the previous leader (`transfer`),
//! 2. pull the new bid into escrow (`transfer_from`),
//! 3. only then update the leader.
//!
//! If step 1 fails nothing has moved. If step 2 fails the checkpoint is
//! reverted, so the refund from step 1 is undone too and the engine never
//! believes it holds money it does not. The checkpoint is scoped to the
//! engine's escrow principal, so other engines on the same ledger are
//! unaffected. If the ledger cannot close the checkpoint the bid fails with
//! [`AuctionError::CheckpointFailed`] and the engine state is left alone.
//!
//! Settlement sets `settled` *before* paying out. If the payout fails the
//! flag stays set and the proceeds remain in escrow; there is no recovery
//! path.
//!
//! ## Anti-Snipe
//!
//! A bid accepted with less than the extension window left moves the
//! deadline to `now + window`, so every late bid can still be answered.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gavel_protocol::ledger::require_success;
use gavel_protocol::{AssetId, Checkpoint, EngineId, LedgerError, Principal, ValueTransfer};

use crate::error::{Classified, ErrorClass};
use crate::events::{AuctionEvent, EventSink};
use crate::reward_issuer::RewardIssuer;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during auction operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuctionError {
    /// The deadline has passed; no more bids.
    #[error("auction closed at {end_time}")]
    AuctionClosed {
        /// The deadline that passed.
        end_time: DateTime<Utc>,
    },

    /// The bid does not strictly beat the leader. Ties lose.
    #[error("bid too low: offered {offered}, must exceed {highest}")]
    BidTooLow {
        /// Amount the bidder offered.
        offered: u64,
        /// The current leading bid.
        highest: u64,
    },

    /// Returning the previous leader's escrow failed. Nothing moved.
    #[error("refund of {amount} to {recipient} failed: {source}")]
    RefundFailed {
        /// The previous leader.
        recipient: Principal,
        /// Their escrowed amount.
        amount: u64,
        /// Ledger failure.
        source: LedgerError,
    },

    /// Pulling the new bid into escrow failed. The refund was reverted.
    #[error("deposit of {amount} from {bidder} failed: {source}")]
    DepositFailed {
        /// The bidder whose funds could not be pulled.
        bidder: Principal,
        /// The offered amount.
        amount: u64,
        /// Ledger failure.
        source: LedgerError,
    },

    /// Settlement was attempted before the deadline.
    #[error("auction ongoing until {end_time}")]
    AuctionOngoing {
        /// The current deadline.
        end_time: DateTime<Utc>,
    },

    /// Settlement already happened.
    #[error("auction already settled")]
    AlreadySettled,

    /// Nobody bid, so there is nothing to settle.
    #[error("auction has no bids")]
    NoBids,

    /// Paying the beneficiary failed after the auction was marked settled.
    /// The proceeds are stranded in escrow.
    #[error("settlement transfer of {amount} to {beneficiary} failed: {source}")]
    SettlementTransferFailed {
        /// The intended recipient.
        beneficiary: Principal,
        /// The stranded amount.
        amount: u64,
        /// Ledger failure.
        source: LedgerError,
    },

    /// The ledger could not commit or revert the bid's checkpoint. The
    /// engine state is unchanged; the ledger may not be.
    #[error("ledger checkpoint failed: {source}")]
    CheckpointFailed {
        /// Ledger failure.
        source: LedgerError,
    },

    /// Construction parameters cannot produce a representable schedule.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
}

impl Classified for AuctionError {
    fn class(&self) -> ErrorClass {
        match self {
            AuctionError::AuctionClosed { .. }
            | AuctionError::BidTooLow { .. }
            | AuctionError::AuctionOngoing { .. }
            | AuctionError::AlreadySettled
            | AuctionError::NoBids => ErrorClass::State,
            AuctionError::RefundFailed { .. }
            | AuctionError::DepositFailed { .. }
            | AuctionError::SettlementTransferFailed { .. }
            | AuctionError::CheckpointFailed { .. } => ErrorClass::Collaborator,
            AuctionError::InvalidSchedule(_) => ErrorClass::Admission,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AuctionError::AuctionClosed { .. } => "AuctionClosed",
            AuctionError::BidTooLow { .. } => "BidTooLow",
            AuctionError::RefundFailed { .. } => "RefundFailed",
            AuctionError::DepositFailed { .. } => "DepositFailed",
            AuctionError::AuctionOngoing { .. } => "AuctionOngoing",
            AuctionError::AlreadySettled => "AlreadySettled",
            AuctionError::NoBids => "NoBids",
            AuctionError::SettlementTransferFailed { .. } => "SettlementTransferFailed",
            AuctionError::CheckpointFailed { .. } => "CheckpointFailed",
            AuctionError::InvalidSchedule(_) => "InvalidSchedule",
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where an auction is in its lifecycle at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionStatus {
    /// Accepting bids.
    Open,
    /// Past the deadline, waiting for someone to settle.
    Expired,
    /// Terminal.
    Settled,
}

impl std::fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuctionStatus::Open => write!(f, "Open"),
            AuctionStatus::Expired => write!(f, "Expired"),
            AuctionStatus::Settled => write!(f, "Settled"),
        }
    }
}

/// Everything the registry hands an engine at construction.
pub struct EngineParams {
    /// The engine's identifier (and escrow principal).
    pub id: EngineId,
    /// Ledger of the accepted asset.
    pub ledger: Arc<dyn ValueTransfer>,
    /// Who receives the proceeds. Must not be null.
    pub beneficiary: Principal,
    /// Creation instant; the deadline is `start_time + duration_secs`.
    pub start_time: DateTime<Utc>,
    pub duration_secs: u64,
    pub extension_window_secs: u64,
    pub rewards: Arc<RewardIssuer>,
    pub events: Arc<dyn EventSink>,
}

/// A refund paid to the displaced leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub recipient: Principal,
    pub amount: u64,
}

/// What an accepted bid did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidReceipt {
    pub engine: EngineId,
    pub bidder: Principal,
    pub amount: u64,
    /// The displaced leader's refund, if there was a leader.
    pub refund: Option<Refund>,
    /// Deadline after this bid.
    pub end_time: DateTime<Utc>,
    /// Whether this bid triggered the anti-snipe extension.
    pub extended: bool,
    /// Whether the participation credit was minted.
    pub reward_issued: bool,
}

/// What a successful settlement paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub engine: EngineId,
    pub winner: Principal,
    pub beneficiary: Principal,
    pub amount: u64,
}

/// Read-only view of an engine, serializable for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionSnapshot {
    pub id: EngineId,
    pub asset: AssetId,
    pub beneficiary: Principal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub extension_window_secs: u64,
    pub highest_bid: u64,
    pub highest_bidder: Option<Principal>,
    pub bid_count: u64,
    pub settled: bool,
    /// Status as of the instant the snapshot was taken.
    pub status: AuctionStatus,
}

// ---------------------------------------------------------------------------
// AuctionEngine
// ---------------------------------------------------------------------------

/// A single anti-snipe auction.
pub struct AuctionEngine {
    id: EngineId,
    asset: AssetId,
    ledger: Arc<dyn ValueTransfer>,
    rewards: Arc<RewardIssuer>,
    events: Arc<dyn EventSink>,
    beneficiary: Principal,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    extension_window: Duration,
    highest_bid: u64,
    highest_bidder: Option<Principal>,
    bid_count: u64,
    settled: bool,
}

impl AuctionEngine {
    /// Creates an engine in `Open` state with
    /// `end_time = start_time + duration_secs`.
    ///
    /// # Errors
    ///
    /// Returns [`AuctionError::InvalidSchedule`] if the beneficiary is null,
    /// the extension window is zero, or either duration does not fit a
    /// `DateTime<Utc>`.
    pub fn new(params: EngineParams) -> Result<Self, AuctionError> {
        if params.beneficiary.is_null() {
            return Err(AuctionError::InvalidSchedule(
                "beneficiary must not be null".into(),
            ));
        }
        if params.extension_window_secs == 0 {
            return Err(AuctionError::InvalidSchedule(
                "extension window must be positive".into(),
            ));
        }

        let duration = seconds(params.duration_secs)?;
        let extension_window = seconds(params.extension_window_secs)?;
        let end_time = params
            .start_time
            .checked_add_signed(duration)
            .ok_or_else(|| AuctionError::InvalidSchedule("deadline out of range".into()))?;

        Ok(Self {
            id: params.id,
            asset: params.ledger.asset(),
            ledger: params.ledger,
            rewards: params.rewards,
            events: params.events,
            beneficiary: params.beneficiary,
            start_time: params.start_time,
            end_time,
            extension_window,
            highest_bid: 0,
            highest_bidder: None,
            bid_count: 0,
            settled: false,
        })
    }

    /// Places a bid of `amount` for `bidder`, observed at `now`.
    ///
    /// The bidder must have approved the engine's principal
    /// (`self.id().as_principal()`) to pull `amount` on the asset ledger.
    ///
    /// # Errors
    ///
    /// - [`AuctionError::AuctionClosed`] if `now >= end_time`.
    /// - [`AuctionError::BidTooLow`] if `amount <= highest_bid`.
    /// - [`AuctionError::RefundFailed`] if the previous leader could not be
    ///   refunded.
    /// - [`AuctionError::DepositFailed`] if the new bid could not be pulled.
    /// - [`AuctionError::CheckpointFailed`] if the ledger could not commit or
    ///   revert the bid's checkpoint.
    ///
    /// On any other error the engine and the ledger are unchanged.
    pub fn bid(
        &mut self,
        bidder: &Principal,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<BidReceipt, AuctionError> {
        if self.settled || now >= self.end_time {
            tracing::debug!(engine = %self.id, bidder = %bidder, amount, "bid after close");
            return Err(AuctionError::AuctionClosed {
                end_time: self.end_time,
            });
        }
        if amount <= self.highest_bid {
            tracing::debug!(engine = %self.id, bidder = %bidder, amount, highest = self.highest_bid, "bid too low");
            return Err(AuctionError::BidTooLow {
                offered: amount,
                highest: self.highest_bid,
            });
        }

        // Decide the new deadline before anything moves.
        let new_end_time = if self.end_time - now < self.extension_window {
            Some(now.checked_add_signed(self.extension_window).ok_or_else(|| {
                AuctionError::InvalidSchedule("extended deadline out of range".into())
            })?)
        } else {
            None
        };

        let escrow = self.id.as_principal();
        let checkpoint = self.ledger.checkpoint(&escrow);

        let refund = match &self.highest_bidder {
            Some(previous) => {
                let reply = self.ledger.transfer(&escrow, previous, self.highest_bid);
                if let Err(source) = require_success(reply) {
                    self.rollback(checkpoint)?;
                    tracing::warn!(engine = %self.id, recipient = %previous, amount = self.highest_bid, error = %source, "refund failed; bid rejected");
                    return Err(AuctionError::RefundFailed {
                        recipient: previous.clone(),
                        amount: self.highest_bid,
                        source,
                    });
                }
                Some(Refund {
                    recipient: previous.clone(),
                    amount: self.highest_bid,
                })
            }
            None => None,
        };

        let reply = self.ledger.transfer_from(&escrow, bidder, &escrow, amount);
        if let Err(source) = require_success(reply) {
            self.rollback(checkpoint)?;
            tracing::warn!(engine = %self.id, bidder = %bidder, amount, error = %source, "deposit failed; bid rejected");
            return Err(AuctionError::DepositFailed {
                bidder: bidder.clone(),
                amount,
                source,
            });
        }

        if let Err(source) = self.ledger.commit(checkpoint) {
            tracing::error!(engine = %self.id, bidder = %bidder, amount, error = %source, "ledger refused to commit bid checkpoint");
            return Err(AuctionError::CheckpointFailed { source });
        }

        self.highest_bid = amount;
        self.highest_bidder = Some(bidder.clone());
        self.bid_count += 1;

        tracing::info!(engine = %self.id, bidder = %bidder, amount, "bid accepted");
        self.events.emit(AuctionEvent::BidAccepted {
            engine: self.id.clone(),
            bidder: bidder.clone(),
            amount,
        });

        if let Some(end_time) = new_end_time {
            self.end_time = end_time;
            tracing::info!(engine = %self.id, new_end_time = %end_time, "deadline extended");
            self.events.emit(AuctionEvent::DeadlineExtended {
                engine: self.id.clone(),
                new_end_time: end_time,
            });
        }

        let reward_issued = match self.rewards.mint(&self.id, bidder) {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(engine = %self.id, bidder = %bidder, error = %e, "reward mint failed; issuer misconfigured");
                false
            }
        };

        Ok(BidReceipt {
            engine: self.id.clone(),
            bidder: bidder.clone(),
            amount,
            refund,
            end_time: self.end_time,
            extended: new_end_time.is_some(),
            reward_issued,
        })
    }

    /// Pays the leading bid to the beneficiary. Callable by anyone once the
    /// deadline has passed.
    ///
    /// # Errors
    ///
    /// - [`AuctionError::AuctionOngoing`] if `now < end_time`.
    /// - [`AuctionError::AlreadySettled`] on every call after the first
    ///   successful (or stranded) one.
    /// - [`AuctionError::NoBids`] if nobody bid. No state changes.
    /// - [`AuctionError::SettlementTransferFailed`] if the payout failed.
    ///   The auction stays settled and the funds stay in escrow.
    pub fn settle(&mut self, now: DateTime<Utc>) -> Result<SettlementReceipt, AuctionError> {
        if now < self.end_time {
            return Err(AuctionError::AuctionOngoing {
                end_time: self.end_time,
            });
        }
        if self.settled {
            return Err(AuctionError::AlreadySettled);
        }
        let winner = self.highest_bidder.clone().ok_or(AuctionError::NoBids)?;
        let amount = self.highest_bid;

        // Terminal flag first: nothing the payout triggers can settle twice.
        self.settled = true;

        let escrow = self.id.as_principal();
        let reply = self.ledger.transfer(&escrow, &self.beneficiary, amount);
        if let Err(source) = require_success(reply) {
            tracing::error!(
                engine = %self.id,
                beneficiary = %self.beneficiary,
                amount,
                error = %source,
                "settlement transfer failed; proceeds stranded in escrow"
            );
            return Err(AuctionError::SettlementTransferFailed {
                beneficiary: self.beneficiary.clone(),
                amount,
                source,
            });
        }

        tracing::info!(engine = %self.id, winner = %winner, amount, "auction settled");
        self.events.emit(AuctionEvent::Settled {
            engine: self.id.clone(),
            winner: winner.clone(),
            amount,
        });

        Ok(SettlementReceipt {
            engine: self.id.clone(),
            winner,
            beneficiary: self.beneficiary.clone(),
            amount,
        })
    }

    fn rollback(&self, checkpoint: Checkpoint) -> Result<(), AuctionError> {
        self.ledger.revert(checkpoint).map_err(|source| {
            tracing::error!(engine = %self.id, error = %source, "ledger refused to revert bid checkpoint");
            AuctionError::CheckpointFailed { source }
        })
    }

    /// Lifecycle status as of `now`.
    pub fn status_at(&self, now: DateTime<Utc>) -> AuctionStatus {
        if self.settled {
            AuctionStatus::Settled
        } else if now >= self.end_time {
            AuctionStatus::Expired
        } else {
            AuctionStatus::Open
        }
    }

    /// Time left before the deadline, or zero once it has passed.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        if now >= self.end_time {
            Duration::zero()
        } else {
            self.end_time - now
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> AuctionSnapshot {
        AuctionSnapshot {
            id: self.id.clone(),
            asset: self.asset.clone(),
            beneficiary: self.beneficiary.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            extension_window_secs: self.extension_window.num_seconds() as u64,
            highest_bid: self.highest_bid,
            highest_bidder: self.highest_bidder.clone(),
            bid_count: self.bid_count,
            settled: self.settled,
            status: self.status_at(now),
        }
    }

    pub fn id(&self) -> &EngineId {
        &self.id
    }

    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    pub fn beneficiary(&self) -> &Principal {
        &self.beneficiary
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn highest_bid(&self) -> u64 {
        self.highest_bid
    }

    pub fn highest_bidder(&self) -> Option<&Principal> {
        self.highest_bidder.as_ref()
    }

    pub fn bid_count(&self) -> u64 {
        self.bid_count
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }
}

impl std::fmt::Debug for AuctionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuctionEngine")
            .field("id", &self.id)
            .field("asset", &self.asset)
            .field("beneficiary", &self.beneficiary)
            .field("end_time", &self.end_time)
            .field("highest_bid", &self.highest_bid)
            .field("highest_bidder", &self.highest_bidder)
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}

fn seconds(secs: u64) -> Result<Duration, AuctionError> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| AuctionError::InvalidSchedule(format!("{secs}s is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use chrono::TimeZone;
    use gavel_protocol::config::{EXTENSION_WINDOW_SECS, REWARD_UNIT};
    use gavel_protocol::InMemoryLedger;

    struct Fixture {
        engine: AuctionEngine,
        ledger: Arc<InMemoryLedger>,
        rewards: Arc<RewardIssuer>,
        log: Arc<EventLog>,
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn p(s: &str) -> Principal {
        Principal::new(s)
    }

    fn fixture(duration_secs: u64) -> Fixture {
        let log = Arc::new(EventLog::new());
        let ledger = Arc::new(InMemoryLedger::new(AssetId::new("USDC")));
        let rewards = Arc::new(RewardIssuer::new(p("owner"), log.clone()));
        rewards.set_registry(&p("owner"), p("registry")).unwrap();

        let id = EngineId::derive(&p("registry"), &p("creator"), 0);
        rewards.authorize(&p("registry"), &id).unwrap();

        let engine = AuctionEngine::new(EngineParams {
            id,
            ledger: ledger.clone(),
            beneficiary: p("seller"),
            start_time: t(0),
            duration_secs,
            extension_window_secs: EXTENSION_WINDOW_SECS,
            rewards: rewards.clone(),
            events: log.clone(),
        })
        .unwrap();

        Fixture {
            engine,
            ledger,
            rewards,
            log,
        }
    }

    fn fund(f: &Fixture, who: &str, amount: u64) {
        f.ledger.mint(&p(who), amount).unwrap();
        f.ledger
            .approve(&p(who), &f.engine.id().as_principal(), amount);
    }

    #[test]
    fn new_engine_is_open_until_deadline() {
        let f = fixture(3_600);
        assert_eq!(f.engine.end_time(), t(3_600));
        assert_eq!(f.engine.status_at(t(0)), AuctionStatus::Open);
        assert_eq!(f.engine.status_at(t(3_600)), AuctionStatus::Expired);
        assert_eq!(f.engine.highest_bidder(), None);
    }

    #[test]
    fn null_beneficiary_rejected_at_construction() {
        let log = Arc::new(EventLog::new());
        let result = AuctionEngine::new(EngineParams {
            id: EngineId::derive(&p("r"), &p("c"), 0),
            ledger: Arc::new(InMemoryLedger::new(AssetId::new("USDC"))),
            beneficiary: Principal::null(),
            start_time: t(0),
            duration_secs: 3_600,
            extension_window_secs: 300,
            rewards: Arc::new(RewardIssuer::new(p("owner"), log.clone())),
            events: log,
        });
        assert!(matches!(result, Err(AuctionError::InvalidSchedule(_))));
    }

    #[test]
    fn first_bid_escrows_and_mints_reward() {
        let mut f = fixture(3_600);
        fund(&f, "alice", 1_000);

        let receipt = f.engine.bid(&p("alice"), 100, t(0)).unwrap();
        assert_eq!(receipt.refund, None);
        assert!(!receipt.extended);
        assert!(receipt.reward_issued);

        assert_eq!(f.engine.highest_bid(), 100);
        assert_eq!(f.ledger.balance(&f.engine.id().as_principal()), 100);
        assert_eq!(f.ledger.balance(&p("alice")), 900);
        assert_eq!(f.rewards.balance_of(&p("alice")), REWARD_UNIT);
    }

    #[test]
    fn tie_is_rejected_without_side_effects() {
        let mut f = fixture(3_600);
        fund(&f, "alice", 1_000);
        fund(&f, "bob", 1_000);
        f.engine.bid(&p("alice"), 100, t(0)).unwrap();
        f.ledger.clear_calls();

        let err = f.engine.bid(&p("bob"), 100, t(10)).unwrap_err();
        assert_eq!(
            err,
            AuctionError::BidTooLow {
                offered: 100,
                highest: 100
            }
        );
        assert!(f.ledger.calls().is_empty());
        assert_eq!(f.engine.highest_bidder(), Some(&p("alice")));
    }

    #[test]
    fn zero_bid_on_fresh_auction_is_too_low() {
        let mut f = fixture(3_600);
        let err = f.engine.bid(&p("alice"), 0, t(0)).unwrap_err();
        assert!(matches!(err, AuctionError::BidTooLow { .. }));
    }

    #[test]
    fn bid_at_deadline_is_closed() {
        let mut f = fixture(3_600);
        fund(&f, "alice", 1_000);
        let err = f.engine.bid(&p("alice"), 10, t(3_600)).unwrap_err();
        assert!(matches!(err, AuctionError::AuctionClosed { .. }));
        assert_eq!(err.class(), ErrorClass::State);
    }

    #[test]
    fn late_bid_extends_to_now_plus_window() {
        let mut f = fixture(3_600);
        fund(&f, "alice", 1_000);
        let receipt = f.engine.bid(&p("alice"), 10, t(3_599)).unwrap();
        assert!(receipt.extended);
        assert_eq!(f.engine.end_time(), t(3_599 + 300));
    }

    #[test]
    fn bid_with_exactly_window_left_does_not_extend() {
        let mut f = fixture(3_600);
        fund(&f, "alice", 1_000);
        let receipt = f.engine.bid(&p("alice"), 10, t(3_300)).unwrap();
        assert!(!receipt.extended);
        assert_eq!(f.engine.end_time(), t(3_600));
    }

    #[test]
    fn settle_pays_beneficiary_once() {
        let mut f = fixture(3_600);
        fund(&f, "alice", 1_000);
        f.engine.bid(&p("alice"), 250, t(0)).unwrap();

        let receipt = f.engine.settle(t(3_600)).unwrap();
        assert_eq!(receipt.amount, 250);
        assert_eq!(receipt.winner, p("alice"));
        assert_eq!(f.ledger.balance(&p("seller")), 250);

        assert_eq!(f.engine.settle(t(3_700)), Err(AuctionError::AlreadySettled));
        assert_eq!(f.ledger.balance(&p("seller")), 250);
        assert_eq!(f.engine.status_at(t(3_700)), AuctionStatus::Settled);
    }

    #[test]
    fn settle_without_bids_changes_nothing() {
        let mut f = fixture(3_600);
        assert_eq!(f.engine.settle(t(4_000)), Err(AuctionError::NoBids));
        assert!(!f.engine.is_settled());
        assert_eq!(f.engine.settle(t(4_001)), Err(AuctionError::NoBids));
    }

    #[test]
    fn failed_payout_strands_funds_and_stays_settled() {
        let mut f = fixture(3_600);
        fund(&f, "alice", 1_000);
        f.engine.bid(&p("alice"), 400, t(0)).unwrap();
        f.ledger.reject_transfers_to(&p("seller"));

        let err = f.engine.settle(t(3_600)).unwrap_err();
        assert!(matches!(err, AuctionError::SettlementTransferFailed { amount: 400, .. }));
        assert!(f.engine.is_settled());
        assert_eq!(f.ledger.balance(&f.engine.id().as_principal()), 400);

        f.ledger.clear_faults();
        assert_eq!(f.engine.settle(t(3_601)), Err(AuctionError::AlreadySettled));
    }

    #[test]
    fn events_follow_acceptance_order() {
        let mut f = fixture(3_600);
        fund(&f, "alice", 1_000);
        f.log.drain();

        f.engine.bid(&p("alice"), 10, t(3_500)).unwrap();
        let kinds: Vec<_> = f.log.drain().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["bid_accepted", "deadline_extended", "reward_minted"]);
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut f = fixture(3_600);
        fund(&f, "alice", 1_000);
        f.engine.bid(&p("alice"), 10, t(5)).unwrap();

        let snap = f.engine.snapshot(t(6));
        assert_eq!(snap.status, AuctionStatus::Open);
        assert_eq!(snap.highest_bid, 10);
        assert_eq!(snap.bid_count, 1);
        assert_eq!(snap.extension_window_secs, EXTENSION_WINDOW_SECS);

        let json = serde_json::to_string(&snap).unwrap();
        let back: AuctionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn time_remaining_saturates_at_zero() {
        let f = fixture(3_600);
        assert_eq!(f.engine.time_remaining(t(3_000)), Duration::seconds(600));
        assert_eq!(f.engine.time_remaining(t(9_000)), Duration::zero());
    }

    #[test]
    fn unauthorized_engine_keeps_bid_without_reward() {
        let log = Arc::new(EventLog::new());
        let ledger = Arc::new(InMemoryLedger::new(AssetId::new("USDC")));
        let rewards = Arc::new(RewardIssuer::new(p("owner"), log.clone()));
        let mut engine = AuctionEngine::new(EngineParams {
            id: EngineId::derive(&p("registry"), &p("creator"), 7),
            ledger: ledger.clone(),
            beneficiary: p("seller"),
            start_time: t(0),
            duration_secs: 3_600,
            extension_window_secs: EXTENSION_WINDOW_SECS,
            rewards: rewards.clone(),
            events: log.clone(),
        })
        .unwrap();
        let escrow = engine.id().as_principal();
        ledger.mint(&p("alice"), 100).unwrap();
        ledger.approve(&p("alice"), &escrow, 100);

        let receipt = engine.bid(&p("alice"), 5, t(0)).unwrap();
        assert!(!receipt.reward_issued);
        assert_eq!(engine.highest_bid(), 5);
        assert_eq!(engine.highest_bidder(), Some(&p("alice")));
        assert_eq!(ledger.balance(&escrow), 5);
        assert_eq!(rewards.total_issued(), 0);

        let kinds: Vec<_> = log.drain().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["bid_accepted"]);
    }

    /// Delegates to an in-memory ledger but refuses to commit.
    struct NoCommitLedger(InMemoryLedger);

    impl ValueTransfer for NoCommitLedger {
        fn asset(&self) -> AssetId {
            self.0.asset()
        }
        fn total_supply(&self) -> Result<u64, LedgerError> {
            self.0.total_supply()
        }
        fn balance_of(&self, who: &Principal) -> Result<u64, LedgerError> {
            self.0.balance_of(who)
        }
        fn transfer(&self, caller: &Principal, to: &Principal, amount: u64) -> Result<bool, LedgerError> {
            self.0.transfer(caller, to, amount)
        }
        fn transfer_from(
            &self,
            caller: &Principal,
            from: &Principal,
            to: &Principal,
            amount: u64,
        ) -> Result<bool, LedgerError> {
            self.0.transfer_from(caller, from, to, amount)
        }
        fn checkpoint(&self, owner: &Principal) -> Checkpoint {
            self.0.checkpoint(owner)
        }
        fn commit(&self, _checkpoint: Checkpoint) -> Result<(), LedgerError> {
            Err(LedgerError::Unavailable("commit refused".into()))
        }
        fn revert(&self, checkpoint: Checkpoint) -> Result<(), LedgerError> {
            self.0.revert(checkpoint)
        }
    }

    #[test]
    fn refused_commit_fails_the_bid() {
        let log = Arc::new(EventLog::new());
        let ledger = Arc::new(NoCommitLedger(InMemoryLedger::new(AssetId::new("USDC"))));
        let rewards = Arc::new(RewardIssuer::new(p("owner"), log.clone()));
        let mut engine = AuctionEngine::new(EngineParams {
            id: EngineId::derive(&p("registry"), &p("creator"), 0),
            ledger: ledger.clone(),
            beneficiary: p("seller"),
            start_time: t(0),
            duration_secs: 3_600,
            extension_window_secs: EXTENSION_WINDOW_SECS,
            rewards,
            events: log.clone(),
        })
        .unwrap();
        ledger.0.mint(&p("alice"), 100).unwrap();
        ledger.0.approve(&p("alice"), &engine.id().as_principal(), 100);

        let err = engine.bid(&p("alice"), 50, t(0)).unwrap_err();
        assert!(matches!(err, AuctionError::CheckpointFailed { .. }));
        assert_eq!(err.class(), ErrorClass::Collaborator);
        assert_eq!(engine.highest_bid(), 0);
        assert_eq!(engine.bid_count(), 0);
        assert!(log.is_empty());
    }
}
