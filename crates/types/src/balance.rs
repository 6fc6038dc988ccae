use bitcoin::Amount;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedAddress {
    pub address: String,
}

impl ObservedAddress {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// Cached confirmed balance of an observed address. Only kept while the amount
/// is above zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositiveBalance {
    pub address: String,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount: Amount,
    pub as_of_block: u64,
}
