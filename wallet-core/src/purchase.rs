//! Shop purchases and inventory
//!
//! A purchase resolves the item in the catalog first (reference data, read
//! outside the unit), then checks the balance, debits the price and grants one
//! unit of the item as a single atomic unit. Any failure ends in
//! [`PurchaseStage::Aborted`] with nothing applied.

use crate::{
    catalog::Catalog,
    error::{Error, Result},
    store::{Cancellation, Store},
    types::{AccountId, InventoryGrant, InventoryLine},
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Progress of a single purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseStage {
    /// Item found in the catalog
    Resolved,
    /// Buyer balance covers the price
    BalanceChecked,
    /// Price debit staged
    Debited,
    /// Inventory grant staged
    Granted,
    /// Unit committed (terminal)
    Committed,
    /// Unit rolled back with nothing applied (terminal)
    Aborted,
}

/// Orchestrates purchases and aggregates inventory
#[derive(Debug)]
pub struct PurchaseEngine<S, C> {
    store: Arc<S>,
    catalog: Arc<C>,
    lock_timeout: Duration,
}

impl<S, C> Clone for PurchaseEngine<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
            lock_timeout: self.lock_timeout,
        }
    }
}

impl<S: Store, C: Catalog> PurchaseEngine<S, C> {
    /// Create engine
    pub fn new(store: Arc<S>, catalog: Arc<C>, lock_timeout: Duration) -> Self {
        Self {
            store,
            catalog,
            lock_timeout,
        }
    }

    /// Buy one unit of `item_name` with the default timeout
    pub fn purchase(&self, user: &AccountId, item_name: &str) -> Result<InventoryGrant> {
        self.purchase_within(user, item_name, self.lock_timeout)
    }

    /// Buy one unit, waiting at most `timeout` for the unit to start
    pub fn purchase_within(
        &self,
        user: &AccountId,
        item_name: &str,
        timeout: Duration,
    ) -> Result<InventoryGrant> {
        self.purchase_unless_cancelled(user, item_name, timeout, &Cancellation::new())
    }

    /// Buy one unit unless `cancel` is set by the time the unit holds the
    /// writer lock. Fails with [`Error::Cancelled`] in that case.
    pub fn purchase_unless_cancelled(
        &self,
        user: &AccountId,
        item_name: &str,
        timeout: Duration,
        cancel: &Cancellation,
    ) -> Result<InventoryGrant> {
        let mut stage = None;
        let result = self.run(user, item_name, timeout, cancel, &mut stage);

        match &result {
            Ok(grant) => tracing::info!(
                user = %user,
                item = item_name,
                price = grant.price,
                sequence = grant.sequence,
                "Purchase committed"
            ),
            Err(err) => tracing::warn!(
                user = %user,
                item = item_name,
                stage = ?PurchaseStage::Aborted,
                aborted_after = ?stage,
                error = %err,
                "Purchase aborted"
            ),
        }

        result
    }

    fn run(
        &self,
        user: &AccountId,
        item_name: &str,
        timeout: Duration,
        cancel: &Cancellation,
        stage: &mut Option<PurchaseStage>,
    ) -> Result<InventoryGrant> {
        let item = self
            .catalog
            .find_by_name(item_name)?
            .ok_or_else(|| Error::NoSuchItem(item_name.to_string()))?;
        advance(stage, PurchaseStage::Resolved);

        let grant = self.store.atomically(timeout, |txn| {
            cancel.check()?;

            let balance = txn.balance(user)?;
            if balance < item.price {
                return Err(Error::InsufficientFunds {
                    account: *user,
                    balance,
                    requested: item.price,
                });
            }
            advance(stage, PurchaseStage::BalanceChecked);

            txn.debit(user, item.price)?;
            advance(stage, PurchaseStage::Debited);

            let grant = txn.grant(user, &item)?;
            advance(stage, PurchaseStage::Granted);

            Ok(grant)
        })?;

        advance(stage, PurchaseStage::Committed);
        Ok(grant)
    }

    /// Owned items grouped by name, ordered by name
    pub fn inventory_for(&self, user: &AccountId) -> Result<Vec<InventoryLine>> {
        self.store.account(user)?;

        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for grant in self.store.grants_for(user)? {
            *counts.entry(grant.item).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(item, quantity)| InventoryLine { item, quantity })
            .collect())
    }
}

fn advance(stage: &mut Option<PurchaseStage>, next: PurchaseStage) {
    tracing::debug!(stage = ?next, "Purchase stage");
    *stage = Some(next);
}
