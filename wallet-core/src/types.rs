//! Core types for the wallet
//!
//! All persisted types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (whole coins as `u64`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Whole coins. There are no fractional amounts.
pub type Coins = u64;

/// Opaque account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Generate a new time-ordered id
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user's identity plus coin balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID
    pub id: AccountId,

    /// Unique, case-sensitive display name
    pub name: String,

    /// Current balance
    pub balance: Coins,

    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

/// Immutable record of one coin transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Position in the append-only log
    pub sequence: u64,

    /// Sender account
    pub sender: AccountId,

    /// Receiver account
    pub receiver: AccountId,

    /// Amount moved (always positive)
    pub amount: Coins,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Purchasable good with a fixed price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Unique item name
    pub name: String,

    /// Price in coins
    pub price: Coins,
}

impl CatalogItem {
    /// Create catalog item
    pub fn new(name: impl Into<String>, price: Coins) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }
}

/// Record that an account acquired one unit of an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryGrant {
    /// Position in the append-only grant log
    pub sequence: u64,

    /// Owning account
    pub owner: AccountId,

    /// Catalog item name
    pub item: String,

    /// Price debited for this unit
    pub price: Coins,

    /// Acquisition timestamp
    pub acquired_at: DateTime<Utc>,
}

/// One outgoing transfer, as shown to the sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentCoins {
    /// Receiver display name
    pub to_user: String,
    /// Amount sent
    pub amount: Coins,
}

/// One incoming transfer, as shown to the receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedCoins {
    /// Sender display name
    pub from_user: String,
    /// Amount received
    pub amount: Coins,
}

/// Per-account transfer history, in ledger order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinHistory {
    /// Incoming transfers
    pub received: Vec<ReceivedCoins>,
    /// Outgoing transfers
    pub sent: Vec<SentCoins>,
}

/// Item count owned by an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLine {
    /// Item name
    #[serde(rename = "type")]
    pub item: String,
    /// Number of grants for this item
    pub quantity: u64,
}

/// Balance, inventory and history in one read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    /// Current balance
    pub coins: Coins,
    /// Owned items grouped by name
    pub inventory: Vec<InventoryLine>,
    /// Transfer history
    pub coin_history: CoinHistory,
}

/// Coin supply totals read from one consistent view of the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupplySnapshot {
    /// Coins created at account registration
    pub issued: Coins,

    /// Sum of all balances
    pub circulating: Coins,

    /// Sum of all purchase debits
    pub spent: Coins,
}

impl SupplySnapshot {
    /// Transfers and purchases neither create nor destroy coins
    pub fn is_conserved(&self) -> bool {
        self.circulating.checked_add(self.spent) == Some(self.issued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_ids_are_unique() {
        let a = AccountId::generate();
        let b = AccountId::generate();
        assert_ne!(a, b);
        assert_eq!(AccountId::from_uuid(*a.as_uuid()), a);
    }

    #[test]
    fn test_supply_conservation() {
        let snapshot = SupplySnapshot {
            issued: 2000,
            circulating: 1920,
            spent: 80,
        };
        assert!(snapshot.is_conserved());

        let leaked = SupplySnapshot {
            circulating: 1921,
            ..snapshot
        };
        assert!(!leaked.is_conserved());
    }

    #[test]
    fn test_summary_wire_names() {
        let summary = AccountSummary {
            coins: 920,
            inventory: vec![InventoryLine {
                item: "cup".to_string(),
                quantity: 2,
            }],
            coin_history: CoinHistory {
                received: vec![ReceivedCoins {
                    from_user: "mary".to_string(),
                    amount: 10,
                }],
                sent: vec![SentCoins {
                    to_user: "mary".to_string(),
                    amount: 50,
                }],
            },
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["coins"], 920);
        assert_eq!(json["inventory"][0]["type"], "cup");
        assert_eq!(json["inventory"][0]["quantity"], 2);
        assert_eq!(json["coinHistory"]["received"][0]["fromUser"], "mary");
        assert_eq!(json["coinHistory"]["sent"][0]["toUser"], "mary");
    }
}
