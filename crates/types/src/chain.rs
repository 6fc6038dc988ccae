use std::collections::BTreeSet;

use bitcoin::Amount;
use serde::{Deserialize, Serialize};

use crate::{errors::NodeError, utxo::checked_sum};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTxInput {
    /// `None` for inputs whose previous output has no standard address.
    pub address: Option<String>,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTxOutput {
    pub addresses: Vec<String>,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
}

/// Provider-independent view of a transaction as seen by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub txid: String,
    pub confirmations: u64,
    pub block_height: Option<u64>,
    pub time: Option<u64>,
    pub inputs: Vec<ChainTxInput>,
    pub outputs: Vec<ChainTxOutput>,
}

impl ChainTransaction {
    #[must_use]
    pub fn input_addresses(&self) -> BTreeSet<&str> {
        self.inputs
            .iter()
            .filter_map(|i| i.address.as_deref())
            .collect()
    }

    /// Sum of the outputs that do not pay back to one of the spending addresses.
    pub fn net_amount(&self) -> Result<Amount, NodeError> {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Ok(Amount::ZERO);
        }

        let senders = self.input_addresses();
        checked_sum(
            self.outputs
                .iter()
                .filter(|o| {
                    !o.addresses.is_empty()
                        && !o.addresses.iter().any(|a| senders.contains(a.as_str()))
                })
                .map(|o| o.value),
        )
    }

    pub fn total_in(&self) -> Result<Amount, NodeError> {
        checked_sum(self.inputs.iter().map(|i| i.value))
    }

    pub fn total_out(&self) -> Result<Amount, NodeError> {
        checked_sum(self.outputs.iter().map(|o| o.value))
    }

    pub fn fee(&self) -> Result<Amount, NodeError> {
        Ok(self
            .total_in()?
            .checked_sub(self.total_out()?)
            .unwrap_or(Amount::ZERO))
    }

    /// Every address touched by an input or an output, without duplicates.
    #[must_use]
    pub fn addresses(&self) -> BTreeSet<String> {
        self.inputs
            .iter()
            .filter_map(|i| i.address.clone())
            .chain(self.outputs.iter().flat_map(|o| o.addresses.iter().cloned()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub txid: String,
}
