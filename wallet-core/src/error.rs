//! Error types for the wallet core

use crate::types::AccountId;
use std::time::Duration;
use thiserror::Error;

/// Result type for wallet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message returned to callers for failures they cannot correct
const INTERNAL_MESSAGE: &str = "internal error";

/// Wallet errors
#[derive(Error, Debug)]
pub enum Error {
    /// Balance check failed
    #[error("Insufficient funds on {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Account that would have been overdrawn
        account: AccountId,
        /// Balance observed inside the atomic unit
        balance: u64,
        /// Amount the operation tried to debit
        requested: u64,
    },

    /// Referenced account does not exist
    #[error("No such user: {0}")]
    NoSuchUser(String),

    /// Referenced catalog item does not exist
    #[error("No such item: {0}")]
    NoSuchItem(String),

    /// Display name already registered
    #[error("Name already registered: {0}")]
    DuplicateName(String),

    /// Amount is not a positive number of coins
    #[error("Invalid amount: {0}")]
    InvalidAmount(u64),

    /// Sender and receiver are the same account
    #[error("Cannot transfer coins to self: {0}")]
    SelfTransfer(AccountId),

    /// Credit would exceed the representable balance
    #[error("Balance overflow on {0}")]
    BalanceOverflow(AccountId),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Atomic unit could not start before its deadline
    #[error("Timed out after {0:?} waiting for the writer lock")]
    Timeout(Duration),

    /// Caller went away before the atomic unit started; nothing was staged
    #[error("Request cancelled before the atomic unit started")]
    Cancelled,

    /// Concurrency error (blocking task panicked or was cancelled)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Invariant violation (coin conservation, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classes seen by the request-handling layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Balance too low for the requested debit
    InsufficientFunds,
    /// Account absent
    NoSuchUser,
    /// Catalog item absent
    NoSuchItem,
    /// Registration conflict
    DuplicateName,
    /// Request rejected by core validation
    InvalidRequest,
    /// Storage or runtime failure
    Internal,
}

impl ErrorKind {
    /// Stable label, used as the metrics `outcome`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::NoSuchUser => "no_such_user",
            ErrorKind::NoSuchItem => "no_such_item",
            ErrorKind::DuplicateName => "duplicate_name",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Internal => "internal",
        }
    }
}

impl Error {
    /// Classify the error for the caller
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Error::NoSuchUser(_) => ErrorKind::NoSuchUser,
            Error::NoSuchItem(_) => ErrorKind::NoSuchItem,
            Error::DuplicateName(_) => ErrorKind::DuplicateName,
            Error::InvalidAmount(_) | Error::SelfTransfer(_) | Error::BalanceOverflow(_) => {
                ErrorKind::InvalidRequest
            }
            Error::Storage(_)
            | Error::Serialization(_)
            | Error::Timeout(_)
            | Error::Cancelled
            | Error::Concurrency(_)
            | Error::InvariantViolation(_)
            | Error::Metrics(_)
            | Error::Config(_)
            | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Cancelled)
    }

    /// Message safe to show to the end user
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => INTERNAL_MESSAGE.to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Concurrency(err.to_string())
    }
}
