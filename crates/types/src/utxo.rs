use std::cmp::Ordering;

use bitcoin::{Amount, OutPoint, ScriptBuf};
use serde::{Deserialize, Serialize};

use crate::errors::NodeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
    pub script_pubkey: ScriptBuf,
    pub confirmations: u32,
}

impl Utxo {
    #[must_use]
    pub const fn is_spendable(&self, min_confirmations: u32) -> bool {
        self.confirmations >= min_confirmations
    }

    /// Most settled first, then lowest output index. Txid breaks the remaining ties
    /// so that selection is reproducible for a given set.
    #[must_use]
    pub fn selection_order(a: &Self, b: &Self) -> Ordering {
        b.confirmations
            .cmp(&a.confirmations)
            .then_with(|| a.outpoint.vout.cmp(&b.outpoint.vout))
            .then_with(|| a.outpoint.txid.cmp(&b.outpoint.txid))
    }
}

/// Sums provider-reported amounts. Overflow means the provider sent nonsense.
pub fn checked_sum(values: impl IntoIterator<Item = Amount>) -> Result<Amount, NodeError> {
    values.into_iter().try_fold(Amount::ZERO, |acc, value| {
        acc.checked_add(value).ok_or_else(|| {
            NodeError::MalformedProviderResponse(format!("Amount overflow adding {value} to {acc}"))
        })
    })
}

pub fn total_value(utxos: &[Utxo]) -> Result<Amount, NodeError> {
    checked_sum(utxos.iter().map(|u| u.value))
}
