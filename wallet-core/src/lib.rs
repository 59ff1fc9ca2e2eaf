//! Wallet Core
//!
//! Virtual-coin wallet and shop ledger: balances, peer-to-peer transfers with
//! an immutable history, and catalog purchases that turn coins into inventory.
//!
//! # Architecture
//!
//! - **Capability stores**: Engines see storage through small traits, so
//!   RocksDB and the in-memory store are interchangeable
//! - **Atomic units**: Check-then-act runs inside one serialized unit that
//!   commits as a single write batch
//! - **Append-only logs**: Transfers and grants are never modified or deleted
//!
//! # Invariants
//!
//! - Coin conservation: issued == Σ(balances) + Σ(purchase debits)
//! - Non-negativity: no balance ever drops below zero
//! - Atomicity: a transfer or purchase applies fully or not at all

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod purchase;
pub mod storage;
pub mod store;
pub mod transfer;
pub mod types;
pub mod wallet;

// Re-exports
pub use catalog::{Catalog, StaticCatalog};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use ledger::{Ledger, LedgerTotals};
pub use memory::MemoryStore;
pub use metrics::Metrics;
pub use purchase::{PurchaseEngine, PurchaseStage};
pub use storage::RocksStore;
pub use store::{AccountStore, Cancellation, InventoryStore, LedgerStore, Store, Transaction};
pub use transfer::{TransferEngine, TransferStage};
pub use types::{
    Account, AccountId, AccountSummary, CatalogItem, CoinHistory, Coins, InventoryGrant,
    InventoryLine, LedgerEntry, ReceivedCoins, SentCoins, SupplySnapshot,
};
pub use wallet::Wallet;
