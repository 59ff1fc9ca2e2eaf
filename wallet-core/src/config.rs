//! Configuration for the wallet

use crate::types::{CatalogItem, Coins};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Wallet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Address the server exposes `/metrics` on
    pub metrics_listen_addr: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Account and atomic unit settings
    pub wallet: WalletConfig,

    /// Shop catalog
    pub catalog: Vec<CatalogItem>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/wallet"),
            service_name: "wallet-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            rocksdb: RocksDBConfig::default(),
            wallet: WalletConfig::default(),
            catalog: default_catalog(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 3,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Account and atomic unit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Balance granted at registration
    pub starting_balance: Coins,

    /// Default time an atomic unit waits for the writer lock (milliseconds)
    pub lock_timeout_ms: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            starting_balance: 1000,
            lock_timeout_ms: 5_000,
        }
    }
}

impl WalletConfig {
    /// Lock timeout as a duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// The merch shop price list
pub fn default_catalog() -> Vec<CatalogItem> {
    [
        ("t-shirt", 80),
        ("cup", 20),
        ("book", 50),
        ("pen", 10),
        ("powerbank", 200),
        ("hoody", 300),
        ("umbrella", 200),
        ("socks", 10),
        ("wallet", 50),
        ("pink-hoody", 500),
    ]
    .into_iter()
    .map(|(name, price)| CatalogItem::new(name, price))
    .collect()
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("WALLET_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("WALLET_METRICS_ADDR") {
            config.metrics_listen_addr = addr;
        }

        if let Ok(balance) = std::env::var("WALLET_STARTING_BALANCE") {
            config.wallet.starting_balance = balance.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid WALLET_STARTING_BALANCE: {}", e))
            })?;
        }

        if let Ok(timeout) = std::env::var("WALLET_LOCK_TIMEOUT_MS") {
            config.wallet.lock_timeout_ms = timeout.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid WALLET_LOCK_TIMEOUT_MS: {}", e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parsed metrics listen address
    pub fn metrics_addr(&self) -> crate::Result<SocketAddr> {
        self.metrics_listen_addr.parse().map_err(|err| {
            crate::Error::Config(format!(
                "Invalid metrics_listen_addr {}: {}",
                self.metrics_listen_addr, err
            ))
        })
    }

    /// Reject settings the core cannot honour
    pub fn validate(&self) -> crate::Result<()> {
        if self.wallet.lock_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "lock_timeout_ms must be positive".to_string(),
            ));
        }

        self.metrics_addr()?;

        let mut seen = HashSet::new();
        for item in &self.catalog {
            if item.price == 0 {
                return Err(crate::Error::Config(format!(
                    "Catalog item {} has zero price",
                    item.name
                )));
            }
            if !seen.insert(item.name.as_str()) {
                return Err(crate::Error::Config(format!(
                    "Catalog item {} listed twice",
                    item.name
                )));
            }
        }

        Ok(())
    }
}
