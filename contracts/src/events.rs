//! # Observable Events
//!
//! Everything an external monitor can learn about the contracts. Delivery
//! is somebody else's job: contracts hand events to an [`EventSink`] and
//! move on. The node forwards them to WebSocket subscribers; tests read
//! them back from an [`EventLog`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use gavel_protocol::{AssetId, EngineId, Principal};

/// A state change worth telling the outside world about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuctionEvent {
    /// A bid took the lead.
    BidAccepted {
        engine: EngineId,
        bidder: Principal,
        amount: u64,
    },
    /// A late bid pushed the deadline out.
    DeadlineExtended {
        engine: EngineId,
        new_end_time: DateTime<Utc>,
    },
    /// Proceeds went to the beneficiary.
    Settled {
        engine: EngineId,
        winner: Principal,
        amount: u64,
    },
    /// An asset joined the whitelist.
    AssetAdded { asset: AssetId },
    /// An asset left the whitelist.
    AssetRemoved { asset: AssetId },
    /// Governance changed the allowed duration range.
    DurationBoundsChanged { min_secs: u64, max_secs: u64 },
    /// Governance toggled auction creation.
    PauseToggled { paused: bool },
    /// The registry created a new engine.
    InstanceCreated {
        engine: EngineId,
        creator: Principal,
        asset: AssetId,
        duration_secs: u64,
        beneficiary: Principal,
    },
    /// The reward issuer credited a bidder.
    RewardMinted {
        engine: EngineId,
        recipient: Principal,
        amount: u64,
    },
    /// A component changed hands.
    OwnershipTransferred {
        previous: Principal,
        new_owner: Principal,
    },
}

impl AuctionEvent {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuctionEvent::BidAccepted { .. } => "bid_accepted",
            AuctionEvent::DeadlineExtended { .. } => "deadline_extended",
            AuctionEvent::Settled { .. } => "settled",
            AuctionEvent::AssetAdded { .. } => "asset_added",
            AuctionEvent::AssetRemoved { .. } => "asset_removed",
            AuctionEvent::DurationBoundsChanged { .. } => "duration_bounds_changed",
            AuctionEvent::PauseToggled { .. } => "pause_toggled",
            AuctionEvent::InstanceCreated { .. } => "instance_created",
            AuctionEvent::RewardMinted { .. } => "reward_minted",
            AuctionEvent::OwnershipTransferred { .. } => "ownership_transferred",
        }
    }
}

/// Destination for contract events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AuctionEvent);
}

/// An in-memory, append-only event buffer.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<AuctionEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything buffered so far.
    pub fn drain(&self) -> Vec<AuctionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Copies the buffer without clearing it.
    pub fn snapshot(&self) -> Vec<AuctionEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: AuctionEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_drains_in_emission_order() {
        let log = EventLog::new();
        log.emit(AuctionEvent::PauseToggled { paused: true });
        log.emit(AuctionEvent::PauseToggled { paused: false });
        assert_eq!(log.len(), 2);

        let drained = log.drain();
        assert_eq!(drained[0], AuctionEvent::PauseToggled { paused: true });
        assert!(log.is_empty());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let ev = AuctionEvent::AssetAdded {
            asset: AssetId::new("usdc"),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "asset_added");
        assert_eq!(json["asset"], "USDC");
        assert_eq!(ev.kind(), "asset_added");
    }
}
