use bitcoin::{Address, Amount, Txid};
use dyn_clone::DynClone;
use types::{
    chain::{BroadcastResponse, ChainTransaction},
    errors::NodeError,
    utxo::{Utxo, total_value},
};

/// Read and broadcast access to a chain data provider.
///
/// Lookups that the provider answers with "not found" resolve to empty results
/// (zero balance, no outputs, `None`) rather than errors.
#[async_trait::async_trait]
pub trait Oracle: Send + DynClone + Sync {
    /// Confirmed balance: sum of unspent outputs with at least `min_confirmations`.
    async fn get_balance(&self, address: &Address, min_confirmations: u32) -> Result<Amount, NodeError> {
        let utxos = self.get_unspent_outputs(address, min_confirmations).await?;
        total_value(&utxos)
    }

    async fn get_unspent_outputs(
        &self,
        address: &Address,
        min_confirmations: u32,
    ) -> Result<Vec<Utxo>, NodeError>;

    async fn get_transaction(&self, txid: &Txid) -> Result<Option<ChainTransaction>, NodeError>;

    async fn get_latest_block_height(&self) -> Result<u64, NodeError>;

    async fn broadcast_raw(&self, tx_hex: &str) -> Result<BroadcastResponse, NodeError>;
}

dyn_clone::clone_trait_object!(Oracle);

/// Decodes a hex-encoded raw transaction.
pub fn decode_raw_transaction(tx_hex: &str) -> Result<bitcoin::Transaction, NodeError> {
    let bytes = hex::decode(tx_hex.trim())
        .map_err(|e| NodeError::InvalidTransaction(format!("Invalid hex: {e}")))?;
    bitcoin::consensus::encode::deserialize(&bytes)
        .map_err(|e| NodeError::InvalidTransaction(format!("Cannot decode transaction: {e}")))
}

/// Number of confirmations of something mined at `block_height` when the tip is `tip`.
#[must_use]
pub const fn confirmations_at(tip: u64, block_height: Option<u64>) -> u64 {
    match block_height {
        Some(height) if height <= tip => (tip - height).saturating_add(1),
        _ => 0,
    }
}
