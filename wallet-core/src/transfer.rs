//! Peer-to-peer coin transfers
//!
//! # State machine
//!
//! ```text
//! Validated → BalanceChecked → Debited → Credited → Logged → Committed
//!     │              │             │          │         │
//!     └──────────────┴─────────────┴──────────┴─────────┴──→ Aborted
//! ```
//!
//! Everything after `Validated` runs inside one atomic unit, so an abort at
//! any stage leaves balances and the ledger exactly as they were. A unit whose
//! [`Cancellation`] is already set when it takes the writer lock aborts before
//! `BalanceChecked`.

use crate::{
    error::{Error, Result},
    store::{Cancellation, Store},
    types::{AccountId, Coins, LedgerEntry},
};
use std::sync::Arc;
use std::time::Duration;

/// Progress of a single transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    /// Amount and parties accepted
    Validated,
    /// Sender balance covers the amount
    BalanceChecked,
    /// Sender debit staged
    Debited,
    /// Receiver credit staged
    Credited,
    /// Ledger entry staged
    Logged,
    /// Unit committed (terminal)
    Committed,
    /// Unit rolled back with nothing applied (terminal)
    Aborted,
}

/// Orchestrates transfers: check, debit, credit, log, as one unit
#[derive(Debug)]
pub struct TransferEngine<S> {
    store: Arc<S>,
    lock_timeout: Duration,
}

impl<S> Clone for TransferEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lock_timeout: self.lock_timeout,
        }
    }
}

impl<S: Store> TransferEngine<S> {
    /// Create engine; `lock_timeout` is the default wait for a unit to start
    pub fn new(store: Arc<S>, lock_timeout: Duration) -> Self {
        Self {
            store,
            lock_timeout,
        }
    }

    /// Move `amount` coins from `from` to `to` with the default timeout
    pub fn transfer(&self, from: &AccountId, to: &AccountId, amount: Coins) -> Result<LedgerEntry> {
        self.transfer_within(from, to, amount, self.lock_timeout)
    }

    /// Move `amount` coins, waiting at most `timeout` for the unit to start
    pub fn transfer_within(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Coins,
        timeout: Duration,
    ) -> Result<LedgerEntry> {
        self.transfer_unless_cancelled(from, to, amount, timeout, &Cancellation::new())
    }

    /// Move `amount` coins unless `cancel` is set by the time the unit holds
    /// the writer lock. Fails with [`Error::Cancelled`] in that case.
    pub fn transfer_unless_cancelled(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Coins,
        timeout: Duration,
        cancel: &Cancellation,
    ) -> Result<LedgerEntry> {
        let mut stage = None;
        let result = self.run(from, to, amount, timeout, cancel, &mut stage);

        match &result {
            Ok(entry) => tracing::info!(
                from = %from,
                to = %to,
                amount,
                sequence = entry.sequence,
                "Transfer committed"
            ),
            Err(err) => tracing::warn!(
                from = %from,
                to = %to,
                amount,
                stage = ?TransferStage::Aborted,
                aborted_after = ?stage,
                error = %err,
                "Transfer aborted"
            ),
        }

        result
    }

    fn run(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Coins,
        timeout: Duration,
        cancel: &Cancellation,
        stage: &mut Option<TransferStage>,
    ) -> Result<LedgerEntry> {
        validate(from, to, amount)?;
        advance(stage, TransferStage::Validated);

        let entry = self.store.atomically(timeout, |txn| {
            cancel.check()?;

            let balance = txn.balance(from)?;
            if balance < amount {
                return Err(Error::InsufficientFunds {
                    account: *from,
                    balance,
                    requested: amount,
                });
            }
            advance(stage, TransferStage::BalanceChecked);

            txn.debit(from, amount)?;
            advance(stage, TransferStage::Debited);

            txn.credit(to, amount)?;
            advance(stage, TransferStage::Credited);

            let entry = txn.record(from, to, amount)?;
            advance(stage, TransferStage::Logged);

            Ok(entry)
        })?;

        advance(stage, TransferStage::Committed);
        Ok(entry)
    }
}

fn validate(from: &AccountId, to: &AccountId, amount: Coins) -> Result<()> {
    if amount == 0 {
        return Err(Error::InvalidAmount(amount));
    }
    if from == to {
        return Err(Error::SelfTransfer(*from));
    }
    Ok(())
}

fn advance(stage: &mut Option<TransferStage>, next: TransferStage) {
    tracing::debug!(stage = ?next, "Transfer stage");
    *stage = Some(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::faults::{FaultPoint, FaultyStore};
    use crate::memory::MemoryStore;
    use crate::store::{AccountStore, LedgerStore};
    use std::thread;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn engine_with(balances: &[(&str, Coins)]) -> (TransferEngine<MemoryStore>, Vec<AccountId>) {
        let store = Arc::new(MemoryStore::new());
        let ids = balances
            .iter()
            .map(|(name, balance)| store.create_account(name, *balance).unwrap().id)
            .collect();
        (TransferEngine::new(store, TIMEOUT), ids)
    }

    #[test]
    fn test_transfer_moves_coins_and_logs() {
        let (engine, ids) = engine_with(&[("sofia", 1000), ("mary", 1000)]);
        let (sofia, mary) = (ids[0], ids[1]);

        let entry = engine.transfer(&sofia, &mary, 200).unwrap();
        assert_eq!((entry.sender, entry.receiver, entry.amount), (sofia, mary, 200));

        assert_eq!(engine.store.balance(&sofia).unwrap(), 800);
        assert_eq!(engine.store.balance(&mary).unwrap(), 1200);
        assert_eq!(engine.store.entries_for(&sofia).unwrap(), vec![entry]);
    }

    #[test]
    fn test_whole_balance_can_be_sent() {
        let (engine, ids) = engine_with(&[("sofia", 50), ("mary", 0)]);

        engine.transfer(&ids[0], &ids[1], 50).unwrap();
        assert_eq!(engine.store.balance(&ids[0]).unwrap(), 0);
        assert_eq!(engine.store.balance(&ids[1]).unwrap(), 50);
    }

    #[test]
    fn test_insufficient_funds_changes_nothing() {
        let (engine, ids) = engine_with(&[("sofia", 100), ("mary", 1000)]);

        let err = engine.transfer(&ids[0], &ids[1], 101).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientFunds {
                balance: 100,
                requested: 101,
                ..
            }
        ));
        assert_eq!(engine.store.balance(&ids[0]).unwrap(), 100);
        assert_eq!(engine.store.balance(&ids[1]).unwrap(), 1000);
        assert!(engine.store.entries_for(&ids[0]).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_zero_and_self_transfer() {
        let (engine, ids) = engine_with(&[("sofia", 100), ("mary", 100)]);

        assert!(matches!(
            engine.transfer(&ids[0], &ids[1], 0),
            Err(Error::InvalidAmount(0))
        ));
        assert!(matches!(
            engine.transfer(&ids[0], &ids[0], 10),
            Err(Error::SelfTransfer(_))
        ));
        assert_eq!(engine.store.balance(&ids[0]).unwrap(), 100);
    }

    #[test]
    fn test_unknown_receiver_rolls_back_debit() {
        let (engine, ids) = engine_with(&[("sofia", 100)]);

        let err = engine
            .transfer(&ids[0], &AccountId::generate(), 10)
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchUser(_)));
        assert_eq!(engine.store.balance(&ids[0]).unwrap(), 100);
    }

    #[test]
    fn test_unknown_sender() {
        let (engine, ids) = engine_with(&[("mary", 100)]);

        let err = engine
            .transfer(&AccountId::generate(), &ids[0], 10)
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchUser(_)));
    }

    #[test]
    fn test_injected_failures_roll_back() {
        for fault in [
            FaultPoint::Debit,
            FaultPoint::Credit,
            FaultPoint::Record,
            FaultPoint::Commit,
        ] {
            let store = Arc::new(FaultyStore::new(fault));
            let sofia = store.create_account("sofia", 1000).unwrap().id;
            let mary = store.create_account("mary", 1000).unwrap().id;
            let engine = TransferEngine::new(Arc::clone(&store), TIMEOUT);

            let err = engine.transfer(&sofia, &mary, 200).unwrap_err();
            assert!(matches!(err, Error::Storage(_)), "{:?}: {}", fault, err);

            assert_eq!(store.balance(&sofia).unwrap(), 1000, "{:?}", fault);
            assert_eq!(store.balance(&mary).unwrap(), 1000, "{:?}", fault);
            assert!(store.entries_for(&sofia).unwrap().is_empty(), "{:?}", fault);
            assert!(store.supply().unwrap().is_conserved());
        }
    }

    #[test]
    fn test_cancelled_unit_stages_nothing() {
        let (engine, ids) = engine_with(&[("sofia", 1000), ("mary", 1000)]);
        let cancel = Cancellation::new();
        cancel.cancel();

        let mut stage = None;
        let err = engine
            .run(&ids[0], &ids[1], 200, TIMEOUT, &cancel, &mut stage)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(stage, Some(TransferStage::Validated));

        assert_eq!(engine.store.balance(&ids[0]).unwrap(), 1000);
        assert_eq!(engine.store.balance(&ids[1]).unwrap(), 1000);
        assert!(engine.store.entries_for(&ids[0]).unwrap().is_empty());

        // A fresh flag lets the same request through
        engine
            .transfer_unless_cancelled(&ids[0], &ids[1], 200, TIMEOUT, &Cancellation::new())
            .unwrap();
        assert_eq!(engine.store.balance(&ids[0]).unwrap(), 800);
    }

    #[test]
    fn test_stage_reached_before_abort() {
        let (engine, ids) = engine_with(&[("sofia", 10), ("mary", 0)]);
        let mut stage = None;
        engine
            .run(&ids[0], &ids[1], 11, TIMEOUT, &Cancellation::new(), &mut stage)
            .unwrap_err();
        assert_eq!(stage, Some(TransferStage::Validated));

        let store = Arc::new(FaultyStore::new(FaultPoint::Record));
        let sofia = store.create_account("sofia", 100).unwrap().id;
        let mary = store.create_account("mary", 0).unwrap().id;
        let engine = TransferEngine::new(store, TIMEOUT);

        let mut stage = None;
        engine
            .run(&sofia, &mary, 10, TIMEOUT, &Cancellation::new(), &mut stage)
            .unwrap_err();
        assert_eq!(stage, Some(TransferStage::Credited));

        let mut stage = None;
        let (engine, ids) = engine_with(&[("sofia", 10), ("mary", 0)]);
        engine
            .run(&ids[0], &ids[1], 10, TIMEOUT, &Cancellation::new(), &mut stage)
            .unwrap();
        assert_eq!(stage, Some(TransferStage::Committed));
    }

    #[test]
    fn test_concurrent_spends_cannot_overdraw() {
        let (engine, ids) = engine_with(&[("sofia", 100), ("mary", 0), ("ivan", 0)]);
        let (sofia, mary, ivan) = (ids[0], ids[1], ids[2]);

        let handles: Vec<_> = [mary, ivan]
            .into_iter()
            .map(|to| {
                let engine = engine.clone();
                thread::spawn(move || engine.transfer(&sofia, &to, 100))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(Error::InsufficientFunds { .. }))));
        assert_eq!(engine.store.balance(&sofia).unwrap(), 0);
        assert_eq!(engine.store.entries_for(&sofia).unwrap().len(), 1);
    }
}
