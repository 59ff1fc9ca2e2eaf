//! Property-based tests for wallet invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Coin conservation: issued == Σ(balances) + Σ(purchase debits)
//! - Non-negativity: a failed spend never moves a balance
//! - Ledger totals: balance == initial - sent + received - spent
//! - Idempotent reads: balance and history do not change when read twice

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use wallet_core::{
    config::default_catalog, AccountId, AccountStore, Coins, Config, Error, InventoryStore, Ledger,
    MemoryStore, PurchaseEngine, StaticCatalog, Store, TransferEngine, Wallet,
};

const TIMEOUT: Duration = Duration::from_secs(1);
const USERS: usize = 4;

/// One request against the core
#[derive(Debug, Clone)]
enum Op {
    Send { from: usize, to: usize, amount: Coins },
    Buy { user: usize, item: String },
}

/// Strategy for generating item names, including a few that do not exist
fn item_strategy() -> impl Strategy<Value = String> {
    let mut names: Vec<String> = default_catalog().into_iter().map(|i| i.name).collect();
    names.push("t-shi".to_string());
    names.push("HOODY".to_string());
    prop::sample::select(names)
}

/// Strategy for generating operations
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..USERS, 0..USERS, 0u64..700)
            .prop_map(|(from, to, amount)| Op::Send { from, to, amount }),
        1 => (0..USERS, item_strategy()).prop_map(|(user, item)| Op::Buy { user, item }),
    ]
}

/// Core engines over a fresh in-memory store
struct Harness {
    store: Arc<MemoryStore>,
    transfers: TransferEngine<MemoryStore>,
    purchases: PurchaseEngine<MemoryStore, StaticCatalog>,
    ledger: Ledger<MemoryStore>,
    users: Vec<AccountId>,
}

impl Harness {
    fn new(balances: &[Coins]) -> Self {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(StaticCatalog::new(default_catalog()));
        let users = balances
            .iter()
            .enumerate()
            .map(|(i, balance)| store.create_account(&format!("user-{}", i), *balance).unwrap().id)
            .collect();

        Self {
            transfers: TransferEngine::new(Arc::clone(&store), TIMEOUT),
            purchases: PurchaseEngine::new(Arc::clone(&store), catalog, TIMEOUT),
            ledger: Ledger::new(Arc::clone(&store)),
            store,
            users,
        }
    }

    fn apply(&self, op: &Op) -> Result<(), Error> {
        match op {
            Op::Send { from, to, amount } => self
                .transfers
                .transfer(&self.users[*from], &self.users[*to], *amount)
                .map(|_| ()),
            Op::Buy { user, item } => self.purchases.purchase(&self.users[*user], item).map(|_| ()),
        }
    }

    fn balances(&self) -> Vec<Coins> {
        self.users
            .iter()
            .map(|id| self.store.balance(id).unwrap())
            .collect()
    }
}

fn balances_strategy() -> impl Strategy<Value = Vec<Coins>> {
    prop::collection::vec(0u64..2_000, USERS)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: every issued coin is either held or spent, whatever happens
    #[test]
    fn prop_coin_conservation(
        balances in balances_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let harness = Harness::new(&balances);
        for op in &ops {
            let _ = harness.apply(op);
        }

        let supply = harness.store.supply().unwrap();
        prop_assert_eq!(supply.issued, balances.iter().sum::<Coins>());
        prop_assert!(supply.is_conserved());
        prop_assert_eq!(
            supply.circulating,
            harness.balances().iter().sum::<Coins>()
        );
    }

    /// Property: a rejected operation leaves every balance as it was
    #[test]
    fn prop_failed_operations_change_nothing(
        balances in balances_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let harness = Harness::new(&balances);
        for op in &ops {
            let before = harness.balances();
            match harness.apply(op) {
                Ok(()) => {}
                Err(Error::InsufficientFunds { balance, requested, .. }) => {
                    prop_assert!(balance < requested);
                    prop_assert_eq!(harness.balances(), before);
                }
                Err(_) => prop_assert_eq!(harness.balances(), before),
            }
        }
    }

    /// Property: balance == initial - sent + received - spent for every account
    #[test]
    fn prop_ledger_totals_explain_balances(
        balances in balances_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let harness = Harness::new(&balances);
        for op in &ops {
            let _ = harness.apply(op);
        }

        for (i, id) in harness.users.iter().enumerate() {
            let totals = harness.ledger.totals_for(id).unwrap();
            let spent: Coins = harness
                .store
                .grants_for(id)
                .unwrap()
                .iter()
                .map(|grant| grant.price)
                .sum();

            prop_assert_eq!(
                balances[i] + totals.received,
                harness.store.balance(id).unwrap() + totals.sent + spent
            );
        }
    }

    /// Property: reads are idempotent
    #[test]
    fn prop_idempotent_reads(
        balances in balances_strategy(),
        ops in prop::collection::vec(op_strategy(), 0..30),
    ) {
        let harness = Harness::new(&balances);
        for op in &ops {
            let _ = harness.apply(op);
        }

        for id in &harness.users {
            prop_assert_eq!(
                harness.store.balance(id).unwrap(),
                harness.store.balance(id).unwrap()
            );
            prop_assert_eq!(
                harness.ledger.history_for(id).unwrap(),
                harness.ledger.history_for(id).unwrap()
            );
            prop_assert_eq!(
                harness.purchases.inventory_for(id).unwrap(),
                harness.purchases.inventory_for(id).unwrap()
            );
        }
    }

    /// Property: a transfer of `amount` succeeds exactly when the sender holds it
    #[test]
    fn prop_transfer_succeeds_iff_covered(balance in 0u64..1_000, amount in 1u64..1_000) {
        let harness = Harness::new(&[balance, 0]);
        let result = harness.apply(&Op::Send { from: 0, to: 1, amount });

        if amount <= balance {
            prop_assert!(result.is_ok());
            prop_assert_eq!(harness.balances(), vec![balance - amount, amount]);
        } else {
            prop_assert!(
                matches!(result, Err(Error::InsufficientFunds { .. })),
                "unexpected result: {:?}",
                result
            );
            prop_assert_eq!(harness.balances(), vec![balance, 0]);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Property: concurrent sends through the async wallet conserve coins
    #[test]
    fn prop_concurrent_sends_conserve_coins(
        amounts in prop::collection::vec(1u64..400, 1..16),
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let config = Config::default();
            let catalog = Arc::new(StaticCatalog::from_config(&config));
            let wallet = Arc::new(
                Wallet::with_parts(Arc::new(MemoryStore::new()), catalog, config).unwrap(),
            );
            let sofia = wallet.register("sofia").await.unwrap().id;
            let mary = wallet.register("mary").await.unwrap().id;

            let tasks: Vec<_> = amounts
                .iter()
                .map(|amount| {
                    let wallet = Arc::clone(&wallet);
                    let amount = *amount;
                    tokio::spawn(async move { wallet.send_coin(sofia, "mary", amount).await })
                })
                .collect();

            let mut sent = 0;
            for (task, amount) in tasks.into_iter().zip(&amounts) {
                if task.await.unwrap().is_ok() {
                    sent += amount;
                }
            }

            prop_assert!(sent <= 1000);
            prop_assert_eq!(wallet.balance(sofia).await.unwrap(), 1000 - sent);
            prop_assert_eq!(wallet.balance(mary).await.unwrap(), 1000 + sent);
            prop_assert!(wallet.check_coin_conservation().await.unwrap());
            Ok(())
        })?;
    }
}
