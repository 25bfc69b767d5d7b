//! # In-Memory Reference Ledger
//!
//! A complete [`ValueTransfer`] implementation backed by hash maps. Used by
//! the node on devnet and by every contract test in the workspace.
//!
//! Beyond plain balances and allowances it offers two things a real ledger
//! would not:
//!
//! - **Fault injection** ([`FaultPlan`]): answer `false` for transfers to a
//!   given principal, for pulls from a given principal, or stop answering
//!   entirely. This is how the tests play the hostile counterparty.
//! - **A call journal** ([`InMemoryLedger::calls`]): every transfer attempt,
//!   in order, with its outcome.
//!
//! Balance changes a principal makes while it has a checkpoint open are
//! journaled under that principal so that [`ValueTransfer::revert`] can undo
//! them without touching anyone else's transfers.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use super::{Checkpoint, LedgerCall, LedgerError, ValueTransfer};
use crate::types::{AssetId, Principal};

// ---------------------------------------------------------------------------
// Fault Injection
// ---------------------------------------------------------------------------

/// Failures the ledger should simulate.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// `transfer` calls whose recipient is in this set answer `false`.
    pub reject_transfers_to: HashSet<Principal>,
    /// `transfer_from` calls whose source is in this set answer `false`.
    pub reject_pulls_from: HashSet<Principal>,
    /// When set, every call fails with [`LedgerError::Unavailable`].
    pub offline: bool,
}

// ---------------------------------------------------------------------------
// Internal State
// ---------------------------------------------------------------------------

/// A reversible state change, recorded while a checkpoint is open.
#[derive(Debug, Clone)]
enum JournalEntry {
    Moved {
        from: Principal,
        to: Principal,
        amount: u64,
    },
    AllowanceSpent {
        owner: Principal,
        spender: Principal,
        amount: u64,
    },
}

/// One principal's open savepoints.
#[derive(Debug, Default)]
struct Scope {
    /// Reversible changes since the outermost open checkpoint.
    journal: Vec<JournalEntry>,
    /// Journal positions of the open checkpoints, innermost last.
    open: Vec<usize>,
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<Principal, u64>,
    allowances: HashMap<(Principal, Principal), u64>,
    total_supply: u64,
    /// Open savepoints, keyed by the principal that opened them.
    scopes: HashMap<Principal, Scope>,
    calls: Vec<LedgerCall>,
    faults: FaultPlan,
}

impl LedgerState {
    fn balance(&self, who: &Principal) -> u64 {
        self.balances.get(who).copied().unwrap_or(0)
    }

    fn record(&mut self, caller: &Principal, entry: JournalEntry) {
        if let Some(scope) = self.scopes.get_mut(caller) {
            scope.journal.push(entry);
        }
    }

    /// The owner's scope, if `checkpoint` is its innermost open savepoint.
    fn innermost(&mut self, checkpoint: &Checkpoint) -> Result<&mut Scope, LedgerError> {
        let unknown = || LedgerError::UnknownCheckpoint {
            owner: checkpoint.owner.clone(),
            depth: checkpoint.depth,
        };
        let scope = self.scopes.get_mut(&checkpoint.owner).ok_or_else(unknown)?;
        if scope.open.len() != checkpoint.depth + 1
            || scope.open.last() != Some(&checkpoint.position)
        {
            return Err(unknown());
        }
        Ok(scope)
    }

    /// Moves funds without touching the journal. Validates both sides
    /// before writing either.
    fn apply_move(&mut self, from: &Principal, to: &Principal, amount: u64) -> Result<(), LedgerError> {
        let available = self.balance(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from.clone(),
                available,
                requested: amount,
            });
        }
        if from == to {
            return Ok(());
        }

        let current = self.balance(to);
        let credited = current.checked_add(amount).ok_or_else(|| LedgerError::Overflow {
            account: to.clone(),
            current,
            credit: amount,
        })?;

        self.balances.insert(from.clone(), available - amount);
        self.balances.insert(to.clone(), credited);
        Ok(())
    }

    fn undo(&mut self, entry: JournalEntry) -> Result<(), LedgerError> {
        match entry {
            JournalEntry::Moved { from, to, amount } => self.apply_move(&to, &from, amount),
            JournalEntry::AllowanceSpent {
                owner,
                spender,
                amount,
            } => {
                let slot = self.allowances.entry((owner, spender)).or_insert(0);
                *slot = slot.saturating_add(amount);
                Ok(())
            }
        }
    }

    fn check_online(&self) -> Result<(), LedgerError> {
        if self.faults.offline {
            return Err(LedgerError::Unavailable("ledger is offline".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryLedger
// ---------------------------------------------------------------------------

/// A thread-safe, in-memory fungible asset ledger.
#[derive(Debug)]
pub struct InMemoryLedger {
    asset: AssetId,
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    /// Creates an empty ledger for `asset`.
    pub fn new(asset: AssetId) -> Self {
        Self {
            asset,
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Creates new supply and credits it to `to`. Returns the new balance.
    ///
    /// Not part of [`ValueTransfer`]: this is the devnet faucet.
    pub fn mint(&self, to: &Principal, amount: u64) -> Result<u64, LedgerError> {
        if to.is_null() {
            return Err(LedgerError::NullAccount);
        }
        let mut state = self.state.write();
        let current = state.balance(to);
        let credited = current.checked_add(amount).ok_or_else(|| LedgerError::Overflow {
            account: to.clone(),
            current,
            credit: amount,
        })?;
        let supply = state
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow {
                account: to.clone(),
                current: state.total_supply,
                credit: amount,
            })?;

        state.balances.insert(to.clone(), credited);
        state.total_supply = supply;
        tracing::debug!(asset = %self.asset, to = %to, amount, "minted");
        Ok(credited)
    }

    /// Sets the amount `spender` may pull from `owner` via `transfer_from`.
    pub fn approve(&self, owner: &Principal, spender: &Principal, amount: u64) {
        let mut state = self.state.write();
        state
            .allowances
            .insert((owner.clone(), spender.clone()), amount);
    }

    /// Remaining allowance of `spender` over `owner`'s funds.
    pub fn allowance(&self, owner: &Principal, spender: &Principal) -> u64 {
        self.state
            .read()
            .allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Balance of `who`, ignoring the offline fault. Handy for assertions.
    pub fn balance(&self, who: &Principal) -> u64 {
        self.state.read().balance(who)
    }

    /// Every transfer attempt so far, oldest first.
    pub fn calls(&self) -> Vec<LedgerCall> {
        self.state.read().calls.clone()
    }

    /// Forgets the call journal.
    pub fn clear_calls(&self) {
        self.state.write().calls.clear();
    }

    /// Replaces the active fault plan.
    pub fn set_faults(&self, faults: FaultPlan) {
        self.state.write().faults = faults;
    }

    /// Makes every `transfer` to `who` answer `false`.
    pub fn reject_transfers_to(&self, who: &Principal) {
        self.state
            .write()
            .faults
            .reject_transfers_to
            .insert(who.clone());
    }

    /// Makes every `transfer_from` out of `who` answer `false`.
    pub fn reject_pulls_from(&self, who: &Principal) {
        self.state
            .write()
            .faults
            .reject_pulls_from
            .insert(who.clone());
    }

    /// Toggles the offline fault.
    pub fn set_offline(&self, offline: bool) {
        self.state.write().faults.offline = offline;
    }

    /// Clears every injected fault.
    pub fn clear_faults(&self) {
        self.state.write().faults = FaultPlan::default();
    }
}

impl ValueTransfer for InMemoryLedger {
    fn asset(&self) -> AssetId {
        self.asset.clone()
    }

    fn total_supply(&self) -> Result<u64, LedgerError> {
        let state = self.state.read();
        state.check_online()?;
        Ok(state.total_supply)
    }

    fn balance_of(&self, who: &Principal) -> Result<u64, LedgerError> {
        let state = self.state.read();
        state.check_online()?;
        Ok(state.balance(who))
    }

    fn transfer(
        &self,
        caller: &Principal,
        to: &Principal,
        amount: u64,
    ) -> Result<bool, LedgerError> {
        let mut state = self.state.write();
        state.check_online()?;

        let outcome = if caller.is_null() || to.is_null() {
            Err(LedgerError::NullAccount)
        } else if state.faults.reject_transfers_to.contains(to) {
            Ok(false)
        } else {
            state.apply_move(caller, to, amount).map(|()| true)
        };

        let succeeded = matches!(outcome, Ok(true));
        if succeeded {
            state.record(
                caller,
                JournalEntry::Moved {
                    from: caller.clone(),
                    to: to.clone(),
                    amount,
                },
            );
        }
        state.calls.push(LedgerCall::Transfer {
            caller: caller.clone(),
            to: to.clone(),
            amount,
            succeeded,
        });
        tracing::debug!(asset = %self.asset, from = %caller, to = %to, amount, succeeded, "transfer");
        outcome
    }

    fn transfer_from(
        &self,
        caller: &Principal,
        from: &Principal,
        to: &Principal,
        amount: u64,
    ) -> Result<bool, LedgerError> {
        let mut state = self.state.write();
        state.check_online()?;

        let outcome = if caller.is_null() || from.is_null() || to.is_null() {
            Err(LedgerError::NullAccount)
        } else if state.faults.reject_pulls_from.contains(from) {
            Ok(false)
        } else {
            let key = (from.clone(), caller.clone());
            let allowed = state.allowances.get(&key).copied().unwrap_or(0);
            if allowed < amount {
                Err(LedgerError::InsufficientAllowance {
                    owner: from.clone(),
                    spender: caller.clone(),
                    available: allowed,
                    requested: amount,
                })
            } else {
                state.apply_move(from, to, amount).map(|()| {
                    state.allowances.insert(key, allowed - amount);
                    true
                })
            }
        };

        let succeeded = matches!(outcome, Ok(true));
        if succeeded {
            state.record(
                caller,
                JournalEntry::AllowanceSpent {
                    owner: from.clone(),
                    spender: caller.clone(),
                    amount,
                },
            );
            state.record(
                caller,
                JournalEntry::Moved {
                    from: from.clone(),
                    to: to.clone(),
                    amount,
                },
            );
        }
        state.calls.push(LedgerCall::TransferFrom {
            caller: caller.clone(),
            from: from.clone(),
            to: to.clone(),
            amount,
            succeeded,
        });
        tracing::debug!(asset = %self.asset, spender = %caller, from = %from, to = %to, amount, succeeded, "transfer_from");
        outcome
    }

    fn checkpoint(&self, owner: &Principal) -> Checkpoint {
        let mut state = self.state.write();
        let scope = state.scopes.entry(owner.clone()).or_default();
        let position = scope.journal.len();
        let depth = scope.open.len();
        scope.open.push(position);
        Checkpoint {
            owner: owner.clone(),
            depth,
            position,
        }
    }

    fn commit(&self, checkpoint: Checkpoint) -> Result<(), LedgerError> {
        let mut state = self.state.write();
        let scope = state.innermost(&checkpoint)?;
        scope.open.pop();
        if scope.open.is_empty() {
            state.scopes.remove(&checkpoint.owner);
        }
        Ok(())
    }

    fn revert(&self, checkpoint: Checkpoint) -> Result<(), LedgerError> {
        let mut state = self.state.write();
        let scope = state.innermost(&checkpoint)?;
        let undone = scope.journal.split_off(checkpoint.position);
        scope.open.pop();
        if scope.open.is_empty() {
            state.scopes.remove(&checkpoint.owner);
        }
        for entry in undone.into_iter().rev() {
            state.undo(entry)?;
        }
        tracing::debug!(asset = %self.asset, owner = %checkpoint.owner, depth = checkpoint.depth, "reverted to checkpoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new(AssetId::new("USDC"))
    }

    fn p(s: &str) -> Principal {
        Principal::new(s)
    }

    #[test]
    fn mint_increases_balance_and_supply() {
        let l = ledger();
        l.mint(&p("alice"), 1_000).unwrap();
        assert_eq!(l.balance(&p("alice")), 1_000);
        assert_eq!(l.total_supply().unwrap(), 1_000);
    }

    #[test]
    fn transfer_moves_funds() {
        let l = ledger();
        l.mint(&p("alice"), 1_000).unwrap();
        assert!(l.transfer(&p("alice"), &p("bob"), 400).unwrap());
        assert_eq!(l.balance(&p("alice")), 600);
        assert_eq!(l.balance(&p("bob")), 400);
    }

    #[test]
    fn transfer_beyond_balance_fails() {
        let l = ledger();
        l.mint(&p("alice"), 100).unwrap();
        let err = l.transfer(&p("alice"), &p("bob"), 101).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(l.balance(&p("alice")), 100);
    }

    #[test]
    fn transfer_from_spends_allowance() {
        let l = ledger();
        l.mint(&p("alice"), 1_000).unwrap();
        l.approve(&p("alice"), &p("engine"), 300);
        assert!(l
            .transfer_from(&p("engine"), &p("alice"), &p("engine"), 250)
            .unwrap());
        assert_eq!(l.allowance(&p("alice"), &p("engine")), 50);
        assert_eq!(l.balance(&p("engine")), 250);
    }

    #[test]
    fn transfer_from_without_allowance_fails() {
        let l = ledger();
        l.mint(&p("alice"), 1_000).unwrap();
        let err = l
            .transfer_from(&p("engine"), &p("alice"), &p("engine"), 1)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientAllowance { .. }));
    }

    #[test]
    fn self_transfer_is_a_balance_check() {
        let l = ledger();
        l.mint(&p("alice"), 10).unwrap();
        assert!(l.transfer(&p("alice"), &p("alice"), 10).unwrap());
        assert_eq!(l.balance(&p("alice")), 10);
        assert!(l.transfer(&p("alice"), &p("alice"), 11).is_err());
    }

    #[test]
    fn rejected_transfer_answers_false_and_moves_nothing() {
        let l = ledger();
        l.mint(&p("alice"), 100).unwrap();
        l.reject_transfers_to(&p("bob"));
        assert!(!l.transfer(&p("alice"), &p("bob"), 10).unwrap());
        assert_eq!(l.balance(&p("alice")), 100);
        assert_eq!(l.balance(&p("bob")), 0);
    }

    #[test]
    fn offline_ledger_fails_every_call() {
        let l = ledger();
        l.set_offline(true);
        assert!(matches!(l.total_supply(), Err(LedgerError::Unavailable(_))));
        assert!(l.transfer(&p("a"), &p("b"), 0).is_err());
        l.set_offline(false);
        assert_eq!(l.total_supply().unwrap(), 0);
    }

    #[test]
    fn call_journal_preserves_order_and_outcome() {
        let l = ledger();
        l.mint(&p("alice"), 100).unwrap();
        l.approve(&p("alice"), &p("engine"), 100);
        l.reject_transfers_to(&p("carol"));
        l.transfer(&p("alice"), &p("carol"), 5).unwrap();
        l.transfer_from(&p("engine"), &p("alice"), &p("engine"), 50)
            .unwrap();

        let calls = l.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(
            &calls[0],
            LedgerCall::Transfer { succeeded: false, .. }
        ));
        assert!(matches!(
            &calls[1],
            LedgerCall::TransferFrom { succeeded: true, amount: 50, .. }
        ));
    }

    #[test]
    fn revert_undoes_transfers_and_allowance_spend() {
        let l = ledger();
        l.mint(&p("engine"), 100).unwrap();
        l.mint(&p("bob"), 200).unwrap();
        l.approve(&p("bob"), &p("engine"), 200);

        let cp = l.checkpoint(&p("engine"));
        l.transfer(&p("engine"), &p("alice"), 100).unwrap();
        l.transfer_from(&p("engine"), &p("bob"), &p("engine"), 150)
            .unwrap();
        l.revert(cp).unwrap();

        assert_eq!(l.balance(&p("engine")), 100);
        assert_eq!(l.balance(&p("alice")), 0);
        assert_eq!(l.balance(&p("bob")), 200);
        assert_eq!(l.allowance(&p("bob"), &p("engine")), 200);
    }

    #[test]
    fn commit_keeps_changes() {
        let l = ledger();
        l.mint(&p("alice"), 100).unwrap();
        let cp = l.checkpoint(&p("alice"));
        l.transfer(&p("alice"), &p("bob"), 40).unwrap();
        l.commit(cp).unwrap();
        assert_eq!(l.balance(&p("bob")), 40);
    }

    #[test]
    fn nested_checkpoints_must_close_innermost_first() {
        let l = ledger();
        l.mint(&p("alice"), 100).unwrap();
        let outer = l.checkpoint(&p("alice"));
        let inner = l.checkpoint(&p("alice"));
        assert!(l.commit(outer.clone()).is_err());

        l.transfer(&p("alice"), &p("bob"), 10).unwrap();
        l.commit(inner).unwrap();
        l.transfer(&p("alice"), &p("bob"), 20).unwrap();
        l.revert(outer).unwrap();

        assert_eq!(l.balance(&p("alice")), 100);
        assert_eq!(l.balance(&p("bob")), 0);
    }

    #[test]
    fn revert_leaves_other_principals_transfers_alone() {
        let l = ledger();
        l.mint(&p("engine-a"), 100).unwrap();
        l.mint(&p("bob"), 200).unwrap();
        l.approve(&p("bob"), &p("engine-a"), 200);

        let other = l.checkpoint(&p("engine-b"));
        let own = l.checkpoint(&p("engine-a"));
        l.transfer(&p("engine-a"), &p("alice"), 100).unwrap();
        l.transfer_from(&p("engine-a"), &p("bob"), &p("engine-a"), 200)
            .unwrap();
        l.commit(own).unwrap();
        l.revert(other).unwrap();

        assert_eq!(l.balance(&p("engine-a")), 200);
        assert_eq!(l.balance(&p("alice")), 100);
        assert_eq!(l.balance(&p("bob")), 0);
    }

    #[test]
    fn checkpoint_belongs_to_its_owner() {
        let l = ledger();
        let cp = l.checkpoint(&p("engine-a"));
        let forged = Checkpoint {
            owner: p("engine-b"),
            ..cp.clone()
        };
        assert!(matches!(
            l.revert(forged),
            Err(LedgerError::UnknownCheckpoint { .. })
        ));
        l.commit(cp).unwrap();
    }
}
