//! Wallet facade
//!
//! Async entry point used by the request-handling layer. Every operation runs
//! on the blocking pool. Dropping the returned future aborts a task that has
//! not started yet and flags the request as cancelled; a send or buy that
//! sees the flag once it holds the writer lock stages nothing. A unit already
//! past that point runs to completion.
//!
//! # Example
//!
//! ```no_run
//! use wallet_core::{Config, Wallet};
//!
//! #[tokio::main]
//! async fn main() -> wallet_core::Result<()> {
//!     let wallet = Wallet::open(Config::default()).await?;
//!
//!     let sofia = wallet.ensure_account("sofia").await?;
//!     wallet.ensure_account("mary").await?;
//!
//!     wallet.send_coin(sofia.id, "mary", 200).await?;
//!     wallet.buy_item(sofia.id, "t-shirt").await?;
//!
//!     let info = wallet.info(sofia.id).await?;
//!     assert_eq!(info.coins, 720);
//!     Ok(())
//! }
//! ```

use crate::{
    catalog::{Catalog, StaticCatalog},
    error::{Error, Result},
    ledger::Ledger,
    metrics::Metrics,
    purchase::PurchaseEngine,
    storage::RocksStore,
    store::{Cancellation, Store},
    transfer::TransferEngine,
    types::{Account, AccountId, AccountSummary, CoinHistory, Coins, InventoryLine, SupplySnapshot},
    Config,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Main wallet interface
#[derive(Debug)]
pub struct Wallet<S = RocksStore, C = StaticCatalog> {
    store: Arc<S>,
    catalog: Arc<C>,
    transfers: TransferEngine<S>,
    purchases: PurchaseEngine<S, C>,
    ledger: Ledger<S>,
    metrics: Metrics,
    config: Config,
}

impl Wallet {
    /// Open the RocksDB-backed wallet with the configured catalog
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(RocksStore::open(&config)?);
        let catalog = Arc::new(StaticCatalog::from_config(&config));
        tracing::info!(
            data_dir = %config.data_dir.display(),
            items = catalog.len(),
            "Wallet opened"
        );

        Self::with_parts(store, catalog, config)
    }
}

impl<S, C> Wallet<S, C>
where
    S: Store + 'static,
    C: Catalog + 'static,
{
    /// Assemble a wallet from an existing store and catalog
    pub fn with_parts(store: Arc<S>, catalog: Arc<C>, config: Config) -> Result<Self> {
        let timeout = config.wallet.lock_timeout();

        Ok(Self {
            transfers: TransferEngine::new(Arc::clone(&store), timeout),
            purchases: PurchaseEngine::new(Arc::clone(&store), Arc::clone(&catalog), timeout),
            ledger: Ledger::new(Arc::clone(&store)),
            metrics: Metrics::new()?,
            store,
            catalog,
            config,
        })
    }

    /// Create an account with the starting balance.
    ///
    /// Fails with [`Error::DuplicateName`] if the name is taken.
    pub async fn register(&self, name: &str) -> Result<Account> {
        let store = Arc::clone(&self.store);
        let name = name.to_string();
        let starting_balance = self.config.wallet.starting_balance;

        let account = self
            .blocking("register", move |_| store.create_account(&name, starting_balance))
            .await?;
        self.metrics.record_account_created();
        Ok(account)
    }

    /// Existing account by name, or a new one with the starting balance
    pub async fn ensure_account(&self, name: &str) -> Result<Account> {
        let store = Arc::clone(&self.store);
        let name = name.to_string();
        let starting_balance = self.config.wallet.starting_balance;

        let (account, created) = self
            .blocking("ensure_account", move |_| match store.account_by_name(&name) {
                Ok(account) => Ok((account, false)),
                Err(Error::NoSuchUser(_)) => match store.create_account(&name, starting_balance) {
                    Ok(account) => Ok((account, true)),
                    // Lost a registration race; the winner's account is the answer
                    Err(Error::DuplicateName(_)) => Ok((store.account_by_name(&name)?, false)),
                    Err(err) => Err(err),
                },
                Err(err) => Err(err),
            })
            .await?;

        if created {
            self.metrics.record_account_created();
        }
        Ok(account)
    }

    /// Account by id
    pub async fn account(&self, id: AccountId) -> Result<Account> {
        let store = Arc::clone(&self.store);
        self.blocking("account", move |_| store.account(&id)).await
    }

    /// Account by display name
    pub async fn account_by_name(&self, name: &str) -> Result<Account> {
        let store = Arc::clone(&self.store);
        let name = name.to_string();
        self.blocking("account_by_name", move |_| store.account_by_name(&name))
            .await
    }

    /// Send coins to the user named `to_name`
    pub async fn send_coin(&self, from: AccountId, to_name: &str, amount: Coins) -> Result<()> {
        self.send_coin_within(from, to_name, amount, self.config.wallet.lock_timeout())
            .await
    }

    /// Send coins, waiting at most `timeout` for the atomic unit to start
    pub async fn send_coin_within(
        &self,
        from: AccountId,
        to_name: &str,
        amount: Coins,
        timeout: Duration,
    ) -> Result<()> {
        let store = Arc::clone(&self.store);
        let transfers = self.transfers.clone();
        let to_name = to_name.to_string();

        let entry = self
            .blocking("send_coin", move |cancel| {
                if amount == 0 {
                    return Err(Error::InvalidAmount(amount));
                }
                let to = store.account_by_name(&to_name)?;
                transfers.transfer_unless_cancelled(&from, &to.id, amount, timeout, cancel)
            })
            .await?;

        self.metrics.record_transfer(entry.amount);
        Ok(())
    }

    /// Buy one unit of `item_name`
    pub async fn buy_item(&self, user: AccountId, item_name: &str) -> Result<()> {
        self.buy_item_within(user, item_name, self.config.wallet.lock_timeout())
            .await
    }

    /// Buy one unit, waiting at most `timeout` for the atomic unit to start
    pub async fn buy_item_within(
        &self,
        user: AccountId,
        item_name: &str,
        timeout: Duration,
    ) -> Result<()> {
        let purchases = self.purchases.clone();
        let item_name = item_name.to_string();

        let grant = self
            .blocking("buy_item", move |cancel| {
                purchases.purchase_unless_cancelled(&user, &item_name, timeout, cancel)
            })
            .await?;

        self.metrics.record_purchase(grant.price);
        Ok(())
    }

    /// Current balance
    pub async fn balance(&self, user: AccountId) -> Result<Coins> {
        let store = Arc::clone(&self.store);
        self.blocking("balance", move |_| store.balance(&user)).await
    }

    /// Sent and received transfers with counterparty names
    pub async fn history(&self, user: AccountId) -> Result<CoinHistory> {
        let ledger = self.ledger.clone();
        self.blocking("history", move |_| ledger.history_for(&user))
            .await
    }

    /// Owned items grouped by name
    pub async fn inventory(&self, user: AccountId) -> Result<Vec<InventoryLine>> {
        let purchases = self.purchases.clone();
        self.blocking("inventory", move |_| purchases.inventory_for(&user))
            .await
    }

    /// Balance, inventory and history in one response
    pub async fn info(&self, user: AccountId) -> Result<AccountSummary> {
        let store = Arc::clone(&self.store);
        let purchases = self.purchases.clone();
        let ledger = self.ledger.clone();

        self.blocking("info", move |_| {
            Ok(AccountSummary {
                coins: store.balance(&user)?,
                inventory: purchases.inventory_for(&user)?,
                coin_history: ledger.history_for(&user)?,
            })
        })
        .await
    }

    /// Issued, circulating and spent coins
    pub async fn supply(&self) -> Result<SupplySnapshot> {
        let store = Arc::clone(&self.store);
        self.blocking("supply", move |_| store.supply()).await
    }

    /// True when every issued coin is either held or spent
    pub async fn check_coin_conservation(&self) -> Result<bool> {
        let supply = self.supply().await?;
        let conserved = supply.is_conserved();

        if !conserved {
            tracing::error!(
                issued = supply.issued,
                circulating = supply.circulating,
                spent = supply.spent,
                "Coin conservation violated"
            );
        }

        Ok(conserved)
    }

    /// Shop catalog
    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn blocking<T, F>(&self, operation: &'static str, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Cancellation) -> Result<T> + Send + 'static,
    {
        let started = Instant::now();
        let cancel = Cancellation::new();
        let seen_by_task = cancel.clone();
        let mut job = CancelOnDrop {
            handle: tokio::task::spawn_blocking(move || task(&seen_by_task)),
            cancel,
        };

        let result = match (&mut job.handle).await {
            Ok(result) => result,
            Err(err) => Err(Error::from(err)),
        };
        self.metrics.observe(operation, started, &result);
        result
    }
}

/// Blocking task that is aborted and flagged as cancelled when dropped.
///
/// Abort only stops a task still queued on the pool; a running task sees the
/// flag through its [`Cancellation`].
struct CancelOnDrop<T> {
    handle: JoinHandle<T>,
    cancel: Cancellation,
}

impl<T> Drop for CancelOnDrop<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}
