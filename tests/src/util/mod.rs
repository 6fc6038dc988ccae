use std::sync::Arc;

use bitcoin::{
    Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    WPubkeyHash, Witness, absolute::LockTime, consensus::encode::serialize_hex, hashes::Hash,
    transaction::Version,
};
use db::Db;
use oracle::mock::MockOracle;
use relay::{
    RelayService,
    config::{ProviderConfig, RelayConfig, RelayConfigBuilder},
};
use types::{
    chain::{ChainTransaction, ChainTxInput, ChainTxOutput},
    utxo::Utxo,
};

pub const COIN: u64 = 100_000_000;
pub const TIP: u64 = 800;

pub fn address(byte: u8) -> Address {
    let script = ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([byte; 20]));
    Address::from_script(&script, Network::Regtest).unwrap()
}

pub fn utxo(owner: &Address, txid_byte: u8, vout: u32, sats: u64, confirmations: u32) -> Utxo {
    Utxo {
        outpoint: OutPoint::new(Txid::from_byte_array([txid_byte; 32]), vout),
        value: Amount::from_sat(sats),
        script_pubkey: owner.script_pubkey(),
        confirmations,
    }
}

/// Stands in for the externally signed version of an unsigned transaction.
pub fn sign(unsigned: &Transaction) -> String {
    let mut tx = unsigned.clone();
    for input in &mut tx.input {
        input.witness = Witness::from_slice(&[vec![0x30; 71], vec![0x02; 33]]);
    }
    serialize_hex(&tx)
}

pub fn foreign_signed_tx(from_byte: u8, to: &Address, sats: u64) -> String {
    sign(&Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([from_byte; 32]), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(sats),
            script_pubkey: to.script_pubkey(),
        }],
    })
}

/// Chain view of `tx` once mined, with `from` funding every input.
pub fn mined(
    tx: &Transaction,
    from: &Address,
    spent: Amount,
    confirmations: u64,
) -> ChainTransaction {
    ChainTransaction {
        txid: tx.compute_txid().to_string(),
        confirmations,
        block_height: Some(TIP + 1),
        time: None,
        inputs: vec![ChainTxInput {
            address: Some(from.to_string()),
            value: spent,
        }],
        outputs: tx
            .output
            .iter()
            .map(|out| ChainTxOutput {
                addresses: Address::from_script(&out.script_pubkey, Network::Regtest)
                    .map(|a| vec![a.to_string()])
                    .unwrap_or_default(),
                value: out.value,
            })
            .collect(),
    }
}

pub fn config(database_directory: std::path::PathBuf) -> RelayConfig {
    RelayConfigBuilder::new()
        .network(Network::Regtest)
        .provider(ProviderConfig::Mock)
        .min_confirmations(2)
        .fee_per_vbyte(20)
        .fee_range(Amount::from_sat(5_000), Amount::from_sat(50_000))
        .observation_page_size(3)
        .database_directory(database_directory)
        .build()
        .unwrap()
}

pub fn relay(config: &RelayConfig, db: Arc<dyn Db>) -> (RelayService, MockOracle) {
    let oracle = MockOracle::new(TIP);
    let service = RelayService::new(config, db, Box::new(oracle.clone()));
    (service, oracle)
}
