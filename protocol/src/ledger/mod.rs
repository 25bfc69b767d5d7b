//! # Value-Transfer Capability
//!
//! Auctions never own a ledger. They borrow one through [`ValueTransfer`],
//! the narrow `transfer` / `transferFrom` surface every fungible asset
//! exposes, plus a liveness probe (`total_supply`) and the host substrate's
//! savepoints.
//!
//! ## Contract
//!
//! - `Ok(false)` and `Err(_)` mean the same thing: the transfer did not
//!   happen. Use [`require_success`] to collapse the two.
//! - Calls are not idempotent. Callers must never retry automatically.
//! - [`ValueTransfer::checkpoint`] / [`ValueTransfer::revert`] model the
//!   host's all-or-nothing unit of work. A contract that fails halfway
//!   through a multi-transfer operation reverts to its checkpoint instead of
//!   leaving a half-applied operation behind.
//! - Savepoints are scoped to the principal that opened them. Reverting one
//!   only undoes transfers that principal issued while it was open, so
//!   engines sharing a ledger never undo each other's work.

mod memory;

pub use memory::{FaultPlan, InMemoryLedger};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AssetId, Principal};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by a value-transfer collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The debited account does not hold enough of the asset.
    #[error("insufficient balance: {account} has {available}, requested {requested}")]
    InsufficientBalance {
        /// The account being debited.
        account: Principal,
        /// Its current balance.
        available: u64,
        /// The amount the transfer required.
        requested: u64,
    },

    /// `transfer_from` exceeded the spender's approved allowance.
    #[error("insufficient allowance: {spender} may move {available} of {owner}'s funds, requested {requested}")]
    InsufficientAllowance {
        /// The account whose funds are being pulled.
        owner: Principal,
        /// The account pulling them.
        spender: Principal,
        /// Remaining allowance.
        available: u64,
        /// The amount the transfer required.
        requested: u64,
    },

    /// Crediting the account would overflow `u64`.
    #[error("balance overflow: {account} holds {current}, credit {credit}")]
    Overflow {
        /// The account being credited.
        account: Principal,
        /// Its balance before the failed credit.
        current: u64,
        /// The credit that overflowed.
        credit: u64,
    },

    /// The ledger answered `false`.
    #[error("transfer rejected by the ledger")]
    Rejected,

    /// The ledger did not respond at all.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// A transfer named the null principal as a party.
    #[error("null account in transfer")]
    NullAccount,

    /// `commit` or `revert` was called with a checkpoint that is not the
    /// owner's innermost open one.
    #[error("unknown checkpoint for {owner} at depth {depth}")]
    UnknownCheckpoint {
        /// Principal the checkpoint was opened for.
        owner: Principal,
        /// Nesting depth the checkpoint claims.
        depth: usize,
    },
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An open savepoint in the host substrate. Obtained from
/// [`ValueTransfer::checkpoint`] and consumed by `commit` or `revert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// The principal whose transfers this savepoint covers.
    pub owner: Principal,
    /// Nesting depth within the owner's savepoints (0 = outermost).
    pub depth: usize,
    /// Position in the owner's journal the checkpoint rewinds to.
    pub position: usize,
}

/// One observed call into a ledger, successful or not.
///
/// Ledgers that keep a call journal let tests assert the exact order in
/// which a contract touched custody (refund before pull, flag before payout).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum LedgerCall {
    /// `transfer(to, amount)` issued by `caller`.
    Transfer {
        caller: Principal,
        to: Principal,
        amount: u64,
        succeeded: bool,
    },
    /// `transfer_from(from, to, amount)` issued by `caller`.
    TransferFrom {
        caller: Principal,
        from: Principal,
        to: Principal,
        amount: u64,
        succeeded: bool,
    },
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// The value-transfer surface a fungible asset exposes to contracts.
///
/// Every method takes `&self`; implementations carry their own interior
/// locking so one ledger can be shared by many engines.
pub trait ValueTransfer: Send + Sync {
    /// The asset this ledger moves.
    fn asset(&self) -> AssetId;

    /// Total supply. Doubles as the liveness probe: a ledger that cannot
    /// answer this is not a valid asset.
    fn total_supply(&self) -> Result<u64, LedgerError>;

    /// Current balance of `who`.
    fn balance_of(&self, who: &Principal) -> Result<u64, LedgerError>;

    /// Moves `amount` from `caller` to `to`.
    fn transfer(&self, caller: &Principal, to: &Principal, amount: u64)
        -> Result<bool, LedgerError>;

    /// Moves `amount` from `from` to `to`, spending `caller`'s allowance.
    fn transfer_from(
        &self,
        caller: &Principal,
        from: &Principal,
        to: &Principal,
        amount: u64,
    ) -> Result<bool, LedgerError>;

    /// Opens a savepoint covering the transfers `owner` issues as caller
    /// until it is committed or reverted.
    fn checkpoint(&self, owner: &Principal) -> Checkpoint;

    /// Closes a savepoint, keeping everything done since it was opened.
    fn commit(&self, checkpoint: Checkpoint) -> Result<(), LedgerError>;

    /// Closes a savepoint, undoing everything done since it was opened.
    fn revert(&self, checkpoint: Checkpoint) -> Result<(), LedgerError>;
}

/// Collapses a ledger reply: `Ok(true)` is success, `Ok(false)` becomes
/// [`LedgerError::Rejected`], errors pass through.
pub fn require_success(reply: Result<bool, LedgerError>) -> Result<(), LedgerError> {
    match reply {
        Ok(true) => Ok(()),
        Ok(false) => Err(LedgerError::Rejected),
        Err(e) => Err(e),
    }
}
