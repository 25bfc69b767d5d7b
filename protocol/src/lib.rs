// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Gavel Protocol: Core Library
//!
//! The primitives every Gavel contract stands on. Auctions move somebody
//! else's money around, so the pieces that describe *who* and *what* live
//! here, separate from the auction logic itself:
//!
//! - **types**: principals, asset identifiers, and engine identifiers.
//! - **ledger**: the `ValueTransfer` capability consumed by the contracts,
//!   plus an in-memory reference ledger with fault injection.
//! - **config**: policy constants (extension window, page cap, reward unit).
//!
//! ## Design Philosophy
//!
//! 1. A `false` from a ledger is a failure. Nobody gets to assume success
//!    from the absence of an error.
//! 2. Collaborator calls are never retried automatically.
//! 3. If it touches money, it has tests. Plural.

pub mod config;
pub mod ledger;
pub mod types;

pub use ledger::{Checkpoint, InMemoryLedger, LedgerCall, LedgerError, ValueTransfer};
pub use types::{AssetId, EngineId, Principal};
