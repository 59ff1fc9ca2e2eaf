//! In-memory store
//!
//! Same semantics as the RocksDB store without durability. Used by tests and
//! by embedders that keep state elsewhere. A single `RwLock` serializes atomic
//! units; a unit stages its mutations in an overlay and applies them while
//! still holding the write lock.

use crate::{
    error::{Error, Result},
    store::{AccountStore, InventoryStore, LedgerStore, Store, Transaction},
    types::{Account, AccountId, CatalogItem, Coins, InventoryGrant, LedgerEntry, SupplySnapshot},
};
use chrono::Utc;
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Default wait for the store lock
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    names: HashMap<String, AccountId>,
    entries: Vec<LedgerEntry>,
    grants: Vec<InventoryGrant>,
    issued: Coins,
}

/// Mutations staged by one unit
#[derive(Debug, Default)]
struct Staged {
    accounts: HashMap<AccountId, Account>,
    entries: Vec<LedgerEntry>,
    grants: Vec<InventoryGrant>,
}

impl State {
    fn apply(&mut self, staged: Staged) {
        self.accounts.extend(staged.accounts);
        self.entries.extend(staged.entries);
        self.grants.extend(staged.grants);
    }
}

/// In-memory store
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<State>,
    lock_timeout: Duration,
}

impl MemoryStore {
    /// Empty store with the default lock timeout
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Empty store; registration and reads wait at most `lock_timeout`
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(State::default()),
            lock_timeout,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .try_read_for(self.lock_timeout)
            .ok_or(Error::Timeout(self.lock_timeout))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore for MemoryStore {
    fn create_account(&self, name: &str, initial_balance: Coins) -> Result<Account> {
        let mut state = self
            .state
            .try_write_for(self.lock_timeout)
            .ok_or(Error::Timeout(self.lock_timeout))?;

        if state.names.contains_key(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }

        let issued = state
            .issued
            .checked_add(initial_balance)
            .ok_or_else(|| Error::InvariantViolation("issued supply overflow".to_string()))?;

        let account = Account {
            id: AccountId::generate(),
            name: name.to_string(),
            balance: initial_balance,
            created_at: Utc::now(),
        };

        state.names.insert(account.name.clone(), account.id);
        state.accounts.insert(account.id, account.clone());
        state.issued = issued;

        tracing::debug!(account = %account.id, name = %account.name, "Account created");
        Ok(account)
    }

    fn account(&self, id: &AccountId) -> Result<Account> {
        self.read()?
            .accounts
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NoSuchUser(id.to_string()))
    }

    fn account_by_name(&self, name: &str) -> Result<Account> {
        let state = self.read()?;
        state
            .names
            .get(name)
            .and_then(|id| state.accounts.get(id))
            .cloned()
            .ok_or_else(|| Error::NoSuchUser(name.to_string()))
    }

    fn accounts(&self, ids: &BTreeSet<AccountId>) -> Result<HashMap<AccountId, Account>> {
        let state = self.read()?;
        ids.iter()
            .map(|id| {
                state
                    .accounts
                    .get(id)
                    .map(|account| (*id, account.clone()))
                    .ok_or_else(|| Error::NoSuchUser(id.to_string()))
            })
            .collect()
    }
}

impl LedgerStore for MemoryStore {
    fn entries_for(&self, id: &AccountId) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .read()?
            .entries
            .iter()
            .filter(|entry| entry.sender == *id || entry.receiver == *id)
            .cloned()
            .collect())
    }
}

impl InventoryStore for MemoryStore {
    fn grants_for(&self, id: &AccountId) -> Result<Vec<InventoryGrant>> {
        Ok(self
            .read()?
            .grants
            .iter()
            .filter(|grant| grant.owner == *id)
            .cloned()
            .collect())
    }
}

impl Store for MemoryStore {
    fn atomically<T, F>(&self, timeout: Duration, unit: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>,
    {
        let mut state = self
            .state
            .try_write_for(timeout)
            .ok_or(Error::Timeout(timeout))?;

        let mut txn = MemoryTxn {
            base: &*state,
            staged: Staged::default(),
        };
        let output = unit(&mut txn)?;
        let staged = txn.staged;

        state.apply(staged);
        Ok(output)
    }

    fn supply(&self) -> Result<SupplySnapshot> {
        let state = self.read()?;

        let circulating = state
            .accounts
            .values()
            .try_fold(0u64, |sum, account| sum.checked_add(account.balance))
            .ok_or_else(|| Error::InvariantViolation("circulating supply overflow".to_string()))?;
        let spent = state
            .grants
            .iter()
            .try_fold(0u64, |sum, grant| sum.checked_add(grant.price))
            .ok_or_else(|| Error::InvariantViolation("spent supply overflow".to_string()))?;

        Ok(SupplySnapshot {
            issued: state.issued,
            circulating,
            spent,
        })
    }
}

struct MemoryTxn<'a> {
    base: &'a State,
    staged: Staged,
}

impl Transaction for MemoryTxn<'_> {
    fn account_for_update(&mut self, id: &AccountId) -> Result<Account> {
        if let Some(account) = self.staged.accounts.get(id) {
            return Ok(account.clone());
        }

        let account = self
            .base
            .accounts
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NoSuchUser(id.to_string()))?;
        self.staged.accounts.insert(*id, account.clone());
        Ok(account)
    }

    fn put_balance(&mut self, id: &AccountId, balance: Coins) -> Result<()> {
        let mut account = self.account_for_update(id)?;
        account.balance = balance;
        self.staged.accounts.insert(*id, account);
        Ok(())
    }

    fn append_entry(
        &mut self,
        sender: &AccountId,
        receiver: &AccountId,
        amount: Coins,
    ) -> Result<LedgerEntry> {
        let entry = LedgerEntry {
            sequence: (self.base.entries.len() + self.staged.entries.len()) as u64,
            sender: *sender,
            receiver: *receiver,
            amount,
            created_at: Utc::now(),
        };
        self.staged.entries.push(entry.clone());
        Ok(entry)
    }

    fn append_grant(&mut self, owner: &AccountId, item: &CatalogItem) -> Result<InventoryGrant> {
        let grant = InventoryGrant {
            sequence: (self.base.grants.len() + self.staged.grants.len()) as u64,
            owner: *owner,
            item: item.name.clone(),
            price: item.price,
            acquired_at: Utc::now(),
        };
        self.staged.grants.push(grant.clone());
        Ok(grant)
    }
}
