//! Storage capabilities
//!
//! The engines never talk to a concrete database. They see the store as a set
//! of capabilities:
//!
//! - [`AccountStore`] - account lookup and registration
//! - [`LedgerStore`] - read side of the transfer log
//! - [`InventoryStore`] - read side of the grant log
//! - [`Store`] - all of the above plus [`Store::atomically`], the only way to
//!   mutate balances
//!
//! Everything an atomic unit does goes through a [`Transaction`]. A backend
//! implements the raw primitives (`account_for_update`, `put_balance`,
//! `append_entry`, `append_grant`); the provided methods (`debit`, `credit`,
//! `record`, `grant`) hold the balance rules so every backend enforces them the
//! same way.
//!
//! # Invariants
//!
//! - A unit either commits every staged mutation or none of them
//! - Readers never see a staged mutation before commit
//! - Units are serialized, so a balance read inside a unit stays valid until
//!   the unit commits
//! - A unit whose [`Cancellation`] is set when it gets the writer lock stages
//!   nothing; once past that check it runs to completion

use crate::{
    error::{Error, Result},
    types::{Account, AccountId, CatalogItem, Coins, InventoryGrant, LedgerEntry, SupplySnapshot},
};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Account lookup and registration
pub trait AccountStore: Send + Sync {
    /// Register a new account. Fails with [`Error::DuplicateName`] if taken.
    fn create_account(&self, name: &str, initial_balance: Coins) -> Result<Account>;

    /// Look up by id. Fails with [`Error::NoSuchUser`] if absent.
    fn account(&self, id: &AccountId) -> Result<Account>;

    /// Look up by display name. Fails with [`Error::NoSuchUser`] if absent.
    fn account_by_name(&self, name: &str) -> Result<Account>;

    /// Look up a set of ids in one pass.
    ///
    /// Fails with [`Error::NoSuchUser`] on the first id that does not resolve.
    fn accounts(&self, ids: &BTreeSet<AccountId>) -> Result<HashMap<AccountId, Account>>;

    /// Current committed balance
    fn balance(&self, id: &AccountId) -> Result<Coins> {
        Ok(self.account(id)?.balance)
    }
}

/// Read side of the transfer log
pub trait LedgerStore: Send + Sync {
    /// Every entry the account sent or received, in insertion order
    fn entries_for(&self, id: &AccountId) -> Result<Vec<LedgerEntry>>;
}

/// Read side of the grant log
pub trait InventoryStore: Send + Sync {
    /// Every grant owned by the account, in insertion order
    fn grants_for(&self, id: &AccountId) -> Result<Vec<InventoryGrant>>;
}

/// Full store: reads plus serialized atomic units
pub trait Store: AccountStore + LedgerStore + InventoryStore {
    /// Run `unit` as one atomic unit.
    ///
    /// Waits at most `timeout` for the unit to start; on expiry returns
    /// [`Error::Timeout`] without running it. If `unit` returns an error, every
    /// mutation it staged is discarded and the error is returned unchanged.
    fn atomically<T, F>(&self, timeout: Duration, unit: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>;

    /// Issued, circulating and spent coins from one consistent view
    fn supply(&self) -> Result<SupplySnapshot>;
}

/// Staged mutations inside one atomic unit
pub trait Transaction {
    /// Read an account, including mutations staged earlier in this unit
    fn account_for_update(&mut self, id: &AccountId) -> Result<Account>;

    /// Stage a new balance
    fn put_balance(&mut self, id: &AccountId, balance: Coins) -> Result<()>;

    /// Stage a ledger entry. Amount is already validated.
    fn append_entry(
        &mut self,
        sender: &AccountId,
        receiver: &AccountId,
        amount: Coins,
    ) -> Result<LedgerEntry>;

    /// Stage an inventory grant
    fn append_grant(&mut self, owner: &AccountId, item: &CatalogItem) -> Result<InventoryGrant>;

    /// Balance as seen by this unit
    fn balance(&mut self, id: &AccountId) -> Result<Coins> {
        Ok(self.account_for_update(id)?.balance)
    }

    /// Subtract `amount`. Fails with [`Error::InsufficientFunds`] and stages
    /// nothing if the balance is lower than `amount`.
    fn debit(&mut self, id: &AccountId, amount: Coins) -> Result<Coins> {
        let balance = self.balance(id)?;
        let remaining = balance
            .checked_sub(amount)
            .ok_or(Error::InsufficientFunds {
                account: *id,
                balance,
                requested: amount,
            })?;
        self.put_balance(id, remaining)?;
        Ok(remaining)
    }

    /// Add `amount`
    fn credit(&mut self, id: &AccountId, amount: Coins) -> Result<Coins> {
        let balance = self.balance(id)?;
        let total = balance
            .checked_add(amount)
            .ok_or(Error::BalanceOverflow(*id))?;
        self.put_balance(id, total)?;
        Ok(total)
    }

    /// Append an immutable ledger entry. No balance changes.
    fn record(
        &mut self,
        sender: &AccountId,
        receiver: &AccountId,
        amount: Coins,
    ) -> Result<LedgerEntry> {
        if amount == 0 {
            return Err(Error::InvalidAmount(amount));
        }
        self.append_entry(sender, receiver, amount)
    }

    /// Append an inventory grant for one unit of `item`. No balance changes.
    fn grant(&mut self, owner: &AccountId, item: &CatalogItem) -> Result<InventoryGrant> {
        // Existence check: a grant must never reference a missing account.
        self.account_for_update(owner)?;
        self.append_grant(owner, item)
    }
}

/// Shared flag set when the caller of a unit stops waiting for it.
///
/// Checked once, as the first step of a unit after the writer lock is held.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Flag that is not set
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the request as abandoned
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`Cancellation::cancel`] has been called on any clone
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Cancelled`] if the request was abandoned
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}
