//! Transfer history
//!
//! Entries are appended inside atomic units via [`Transaction::record`]; this
//! module is the read side. It turns the raw log of account ids into the
//! per-user sent/received view shown to people, resolving every distinct
//! counterparty with one batched lookup.
//!
//! [`Transaction::record`]: crate::store::Transaction::record

use crate::{
    error::{Error, Result},
    store::{AccountStore, LedgerStore},
    types::{AccountId, CoinHistory, Coins, LedgerEntry, ReceivedCoins, SentCoins},
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Sum of everything an account has sent and received
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    /// Coins sent
    pub sent: Coins,
    /// Coins received
    pub received: Coins,
}

/// Read side of the transfer log
#[derive(Debug)]
pub struct Ledger<S> {
    store: Arc<S>,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AccountStore + LedgerStore> Ledger<S> {
    /// Create ledger view over a store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Raw entries for an account, in insertion order
    pub fn entries_for(&self, account: &AccountId) -> Result<Vec<LedgerEntry>> {
        self.store.account(account)?;
        self.store.entries_for(account)
    }

    /// Sent and received transfers with counterparty names, in ledger order.
    ///
    /// All-or-nothing: if any counterparty fails to resolve, the whole query
    /// fails with that error.
    pub fn history_for(&self, account: &AccountId) -> Result<CoinHistory> {
        let entries = self.entries_for(account)?;

        let counterparties: BTreeSet<AccountId> = entries
            .iter()
            .map(|entry| counterparty(entry, account))
            .collect();
        let names = self.store.accounts(&counterparties)?;

        let mut history = CoinHistory::default();
        for entry in &entries {
            let other = counterparty(entry, account);
            let name = names
                .get(&other)
                .map(|acc| acc.name.clone())
                .ok_or_else(|| Error::NoSuchUser(other.to_string()))?;

            if entry.sender == *account {
                history.sent.push(SentCoins {
                    to_user: name,
                    amount: entry.amount,
                });
            } else {
                history.received.push(ReceivedCoins {
                    from_user: name,
                    amount: entry.amount,
                });
            }
        }

        tracing::debug!(
            account = %account,
            sent = history.sent.len(),
            received = history.received.len(),
            counterparties = counterparties.len(),
            "History resolved"
        );

        Ok(history)
    }

    /// Totals over the account's entries
    pub fn totals_for(&self, account: &AccountId) -> Result<LedgerTotals> {
        let mut totals = LedgerTotals::default();
        for entry in self.entries_for(account)? {
            if entry.sender == *account {
                totals.sent += entry.amount;
            }
            if entry.receiver == *account {
                totals.received += entry.amount;
            }
        }
        Ok(totals)
    }
}

fn counterparty(entry: &LedgerEntry, account: &AccountId) -> AccountId {
    if entry.sender == *account {
        entry.receiver
    } else {
        entry.sender
    }
}
