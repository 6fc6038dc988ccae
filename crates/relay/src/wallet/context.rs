use bitcoin::{Amount, Network, Transaction, consensus::encode::serialize_hex};
use serde::{Deserialize, Serialize};
use types::{errors::NodeError, utxo::Utxo};
use uuid::Uuid;

/// Output being spent, with what a signer needs to produce its signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentInput {
    pub txid: String,
    pub vout: u32,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount: Amount,
    pub script_pubkey: String,
}

impl From<&Utxo> for SpentInput {
    fn from(utxo: &Utxo) -> Self {
        Self {
            txid: utxo.outpoint.txid.to_string(),
            vout: utxo.outpoint.vout,
            amount: utxo.value,
            script_pubkey: utxo.script_pubkey.to_hex_string(),
        }
    }
}

/// Unsigned transaction handed to an external signer. Carries no key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignableContext {
    pub operation_id: Uuid,
    pub network: Network,
    pub unsigned_tx: String,
    pub inputs: Vec<SpentInput>,
    pub from_address: String,
    pub to_address: String,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount: Amount,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub fee: Amount,
    #[serde(with = "bitcoin::amount::serde::as_sat::opt")]
    pub change: Option<Amount>,
}

impl SignableContext {
    #[must_use]
    pub fn unsigned_tx_hex(tx: &Transaction) -> String {
        serialize_hex(tx)
    }

    pub fn to_json(&self) -> Result<String, NodeError> {
        serde_json::to_string(self)
            .map_err(|e| NodeError::Error(format!("Failed to serialize signable context: {e}")))
    }

    pub fn from_json(context: &str) -> Result<Self, NodeError> {
        serde_json::from_str(context)
            .map_err(|e| NodeError::Error(format!("Invalid signable context: {e}")))
    }
}
