//! # Reward Issuer Contract
//!
//! Mints a fixed participation credit ([`REWARD_UNIT`]) to every accepted
//! bidder, on behalf of the engine that accepted the bid.
//!
//! ## Security Model
//!
//! - **Registry binding**: the owner names exactly one registry principal.
//!   Only that principal may call [`authorize`](RewardIssuer::authorize).
//! - **Authorization table**: an engine may mint only after the registry
//!   has authorized it. Entries are never revoked implicitly.
//! - **No issuance cap**: total supply is purely a function of how many
//!   bids were accepted across all engines. Overflow is still checked.
//!
//! The issuer is shared between the registry and every engine it creates,
//! so its state sits behind an interior lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use gavel_protocol::config::REWARD_UNIT;
use gavel_protocol::{EngineId, Principal};

use crate::error::{Classified, ErrorClass};
use crate::events::{AuctionEvent, EventSink};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during reward operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewardError {
    /// The engine is not in the authorization table.
    #[error("unauthorized: engine {engine} may not mint rewards")]
    Unauthorized {
        /// The engine that attempted to mint.
        engine: EngineId,
    },

    /// `authorize` was called by someone other than the bound registry.
    #[error("unauthorized: {caller} is not the bound registry")]
    NotRegistry {
        /// The principal that attempted the call.
        caller: Principal,
    },

    /// A governance call came from someone other than the owner.
    #[error("unauthorized: {caller} is not the issuer owner")]
    NotOwner {
        /// The principal that attempted the call.
        caller: Principal,
    },

    /// The null principal was offered as owner, registry, or recipient.
    #[error("null principal is not allowed here")]
    NullPrincipal,

    /// Crediting would overflow `u64`.
    #[error("reward overflow crediting {recipient}")]
    SupplyOverflow {
        /// The recipient whose balance (or the total) would overflow.
        recipient: Principal,
    },
}

impl Classified for RewardError {
    fn class(&self) -> ErrorClass {
        match self {
            RewardError::Unauthorized { .. }
            | RewardError::NotRegistry { .. }
            | RewardError::NotOwner { .. } => ErrorClass::Authorization,
            RewardError::NullPrincipal => ErrorClass::Admission,
            RewardError::SupplyOverflow { .. } => ErrorClass::State,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            RewardError::Unauthorized { .. } => "Unauthorized",
            RewardError::NotRegistry { .. } => "NotRegistry",
            RewardError::NotOwner { .. } => "NotOwner",
            RewardError::NullPrincipal => "NullPrincipal",
            RewardError::SupplyOverflow { .. } => "SupplyOverflow",
        }
    }
}

// ---------------------------------------------------------------------------
// RewardIssuer
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct IssuerState {
    owner: Principal,
    registry: Option<Principal>,
    authorized: HashSet<EngineId>,
    balances: HashMap<Principal, u64>,
    total_issued: u64,
}

/// The participation-credit issuer.
pub struct RewardIssuer {
    state: RwLock<IssuerState>,
    events: Arc<dyn EventSink>,
}

impl RewardIssuer {
    /// Creates an issuer governed by `owner`, with no registry bound yet.
    pub fn new(owner: Principal, events: Arc<dyn EventSink>) -> Self {
        Self {
            state: RwLock::new(IssuerState {
                owner,
                registry: None,
                authorized: HashSet::new(),
                balances: HashMap::new(),
                total_issued: 0,
            }),
            events,
        }
    }

    /// Binds the single principal allowed to authorize engines. Owner only.
    ///
    /// Rebinding replaces the previous registry; engines it already
    /// authorized stay authorized.
    pub fn set_registry(&self, caller: &Principal, registry: Principal) -> Result<(), RewardError> {
        let mut state = self.state.write();
        if caller != &state.owner {
            return Err(RewardError::NotOwner {
                caller: caller.clone(),
            });
        }
        if registry.is_null() {
            return Err(RewardError::NullPrincipal);
        }
        tracing::info!(registry = %registry, "reward issuer bound to registry");
        state.registry = Some(registry);
        Ok(())
    }

    /// Hands governance to `new_owner`. Owner only.
    pub fn transfer_ownership(&self, caller: &Principal, new_owner: Principal) -> Result<(), RewardError> {
        let previous = {
            let mut state = self.state.write();
            if caller != &state.owner {
                return Err(RewardError::NotOwner {
                    caller: caller.clone(),
                });
            }
            if new_owner.is_null() {
                return Err(RewardError::NullPrincipal);
            }
            std::mem::replace(&mut state.owner, new_owner.clone())
        };
        self.events.emit(AuctionEvent::OwnershipTransferred {
            previous,
            new_owner,
        });
        Ok(())
    }

    /// Adds `engine` to the authorization table. Registry only.
    ///
    /// Idempotent: returns `Ok(false)` if the engine was already authorized.
    pub fn authorize(&self, caller: &Principal, engine: &EngineId) -> Result<bool, RewardError> {
        let mut state = self.state.write();
        if state.registry.as_ref() != Some(caller) {
            return Err(RewardError::NotRegistry {
                caller: caller.clone(),
            });
        }
        let inserted = state.authorized.insert(engine.clone());
        if inserted {
            tracing::debug!(engine = %engine, "engine authorized to mint rewards");
        }
        Ok(inserted)
    }

    /// Credits `recipient` with one [`REWARD_UNIT`] on behalf of `engine`.
    /// Returns the recipient's new balance.
    ///
    /// # Errors
    ///
    /// Returns [`RewardError::Unauthorized`] if `engine` is not authorized.
    pub fn mint(&self, engine: &EngineId, recipient: &Principal) -> Result<u64, RewardError> {
        let balance = {
            let mut state = self.state.write();
            if !state.authorized.contains(engine) {
                return Err(RewardError::Unauthorized {
                    engine: engine.clone(),
                });
            }
            if recipient.is_null() {
                return Err(RewardError::NullPrincipal);
            }

            let current = state.balances.get(recipient).copied().unwrap_or(0);
            let balance = current
                .checked_add(REWARD_UNIT)
                .ok_or_else(|| RewardError::SupplyOverflow {
                    recipient: recipient.clone(),
                })?;
            let total = state
                .total_issued
                .checked_add(REWARD_UNIT)
                .ok_or_else(|| RewardError::SupplyOverflow {
                    recipient: recipient.clone(),
                })?;

            state.balances.insert(recipient.clone(), balance);
            state.total_issued = total;
            balance
        };

        self.events.emit(AuctionEvent::RewardMinted {
            engine: engine.clone(),
            recipient: recipient.clone(),
            amount: REWARD_UNIT,
        });
        Ok(balance)
    }

    pub fn is_authorized(&self, engine: &EngineId) -> bool {
        self.state.read().authorized.contains(engine)
    }

    /// Credit balance of `who`, or 0.
    pub fn balance_of(&self, who: &Principal) -> u64 {
        self.state.read().balances.get(who).copied().unwrap_or(0)
    }

    pub fn total_issued(&self) -> u64 {
        self.state.read().total_issued
    }

    pub fn owner(&self) -> Principal {
        self.state.read().owner.clone()
    }

    pub fn registry(&self) -> Option<Principal> {
        self.state.read().registry.clone()
    }
}
