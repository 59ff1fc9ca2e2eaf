//! Metrics collection for observability
//!
//! Prometheus metrics for the wallet, kept in a private registry so several
//! wallets can live in one process.
//!
//! # Metrics
//!
//! - `wallet_operations_total{operation,outcome}` - Completed operations by outcome
//! - `wallet_operation_duration_seconds{operation}` - Operation latency
//! - `wallet_coins_transferred_total` - Coins moved between accounts
//! - `wallet_coins_spent_total` - Coins spent in the shop
//! - `wallet_accounts_total` - Accounts registered by this process

use crate::error::{Error, Result};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

/// Outcome label for successful operations
const OUTCOME_OK: &str = "ok";

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Operations by name and outcome
    pub operations_total: IntCounterVec,

    /// Operation latency by name
    pub operation_duration: HistogramVec,

    /// Coins moved between accounts
    pub coins_transferred: IntCounter,

    /// Coins spent on items
    pub coins_spent: IntCounter,

    /// Accounts registered by this process
    pub accounts_total: IntGauge,

    registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("coins_transferred", &self.coins_transferred.get())
            .field("coins_spent", &self.coins_spent.get())
            .field("accounts_total", &self.accounts_total.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("wallet_operations_total", "Completed wallet operations"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "wallet_operation_duration_seconds",
                "Histogram of wallet operation latencies",
            )
            .buckets(vec![
                0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 5.0,
            ]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let coins_transferred = IntCounter::new(
            "wallet_coins_transferred_total",
            "Total coins moved between accounts",
        )?;
        registry.register(Box::new(coins_transferred.clone()))?;

        let coins_spent =
            IntCounter::new("wallet_coins_spent_total", "Total coins spent in the shop")?;
        registry.register(Box::new(coins_spent.clone()))?;

        let accounts_total = IntGauge::new(
            "wallet_accounts_total",
            "Accounts registered by this process",
        )?;
        registry.register(Box::new(accounts_total.clone()))?;

        Ok(Self {
            operations_total,
            operation_duration,
            coins_transferred,
            coins_spent,
            accounts_total,
            registry,
        })
    }

    /// Record a finished operation: outcome counter plus latency
    pub fn observe<T>(&self, operation: &str, started: Instant, result: &Result<T>) {
        let outcome = match result {
            Ok(_) => OUTCOME_OK,
            Err(err) => err.kind().as_str(),
        };
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.operation_duration
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());
    }

    /// Record a committed transfer
    pub fn record_transfer(&self, amount: u64) {
        self.coins_transferred.inc_by(amount);
    }

    /// Record a committed purchase
    pub fn record_purchase(&self, price: u64) {
        self.coins_spent.inc_by(price);
    }

    /// Record a new account
    pub fn record_account_created(&self) {
        self.accounts_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Every family in the Prometheus text exposition format
    pub fn export(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|err| Error::Metrics(prometheus::Error::Msg(err.to_string())))
    }
}
