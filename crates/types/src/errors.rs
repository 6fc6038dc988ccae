use std::error::Error;

use bitcoin::Amount;
use derive_more::Display;

#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[display("{_0}")]
    Error(String),

    #[display("Invalid address: {_0}")]
    InvalidAddress(String),

    #[display("Asset {_0} is not supported")]
    AssetMismatch(String),

    #[display("Invalid amount: {_0}")]
    InvalidAmount(String),

    #[display("Invalid transaction: {_0}")]
    InvalidTransaction(String),

    #[display("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: Amount, required: Amount },

    #[display("Conflict: {_0}")]
    Conflict(String),

    /// Timeouts, connection failures and 5xx answers from the chain data provider.
    #[display("Transient provider error: {_0}")]
    TransientProvider(String),

    #[display("Malformed provider response: {_0}")]
    MalformedProviderResponse(String),

    #[display("Not found: {_0}")]
    NotFound(String),

    #[display("Storage error: {_0}")]
    Storage(String),
}

impl NodeError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientProvider(_))
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<rocksdb::Error> for NodeError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl Error for NodeError {}
