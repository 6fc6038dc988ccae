
use std::sync::Arc;

use bitcoin::{
    Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    WPubkeyHash, Witness,
    absolute::LockTime,
    consensus::encode::serialize_hex,
    hashes::Hash,
    transaction::Version,
};
use db::{Db, rocksdb::RocksDb};
use oracle::{mock::MockOracle, oracle::Oracle};
use tempfile::TempDir;
use tokio::sync::Notify;
use types::{
    chain::{BroadcastResponse, ChainTransaction, ChainTxInput, ChainTxOutput},
    errors::NodeError,
    utxo::Utxo,
};

use crate::{
    RelayService,
    config::{ProviderConfig, RelayConfig, RelayConfigBuilder},
};

pub const START_HEIGHT: u64 = 100;

pub fn test_address(byte: u8) -> Address {
    let script = ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([byte; 20]));
    Address::from_script(&script, Network::Regtest).unwrap()
}

pub fn utxo_for(address: &Address, txid_byte: u8, vout: u32, sats: u64, confirmations: u32) -> Utxo {
    Utxo {
        outpoint: OutPoint::new(Txid::from_byte_array([txid_byte; 32]), vout),
        value: Amount::from_sat(sats),
        script_pubkey: address.script_pubkey(),
        confirmations,
    }
}

/// Signed-looking transaction spending a made-up output of `from` to `to`.
pub fn signed_tx(from_byte: u8, to: &Address, sats: u64) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([from_byte; 32]), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::from_slice(&[vec![1u8; 72], vec![2u8; 33]]),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(sats),
            script_pubkey: to.script_pubkey(),
        }],
    }
}

pub fn signed_tx_hex(from_byte: u8, to: &Address, sats: u64) -> String {
    serialize_hex(&signed_tx(from_byte, to, sats))
}

/// Chain view of a payment from `from` to `to` with change back to `from`.
pub fn chain_payment(
    txid: &str,
    from: &Address,
    to: &Address,
    paid: u64,
    change: u64,
    fee: u64,
    confirmations: u64,
) -> ChainTransaction {
    ChainTransaction {
        txid: txid.to_string(),
        confirmations,
        block_height: (confirmations > 0).then(|| START_HEIGHT + 1),
        time: None,
        inputs: vec![ChainTxInput {
            address: Some(from.to_string()),
            value: Amount::from_sat(paid + change + fee),
        }],
        outputs: vec![
            ChainTxOutput {
                addresses: vec![to.to_string()],
                value: Amount::from_sat(paid),
            },
            ChainTxOutput {
                addresses: vec![from.to_string()],
                value: Amount::from_sat(change),
            },
        ],
    }
}

pub fn test_config(dir: &TempDir) -> RelayConfig {
    RelayConfigBuilder::new()
        .network(Network::Regtest)
        .provider(ProviderConfig::Mock)
        .asset("BTC", "Bitcoin")
        .min_confirmations(1)
        .fee_per_vbyte(10)
        .fee_range(Amount::from_sat(10_000), Amount::from_sat(100_000))
        .observation_page_size(2)
        .database_directory(dir.path().join("db"))
        .build()
        .unwrap()
}

pub struct TestRelay {
    pub service: RelayService,
    pub oracle: MockOracle,
    pub db: Arc<dyn Db>,
    pub config: RelayConfig,
    _dir: TempDir,
}

impl TestRelay {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        Self::with_config(dir, config)
    }

    pub fn with_config(dir: TempDir, config: RelayConfig) -> Self {
        let db: Arc<dyn Db> = Arc::new(RocksDb::new(&config.database_directory).unwrap());
        let oracle = MockOracle::new(START_HEIGHT);
        let service = RelayService::new(&config, db.clone(), Box::new(oracle.clone()));

        Self {
            service,
            oracle,
            db,
            config,
            _dir: dir,
        }
    }
}

/// Mock provider that stops inside output lookups and broadcasts until released.
#[derive(Clone)]
pub struct GatedOracle {
    pub inner: MockOracle,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl GatedOracle {
    pub fn new(inner: MockOracle) -> Self {
        Self {
            inner,
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    async fn pause(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[async_trait::async_trait]
impl Oracle for GatedOracle {
    async fn get_unspent_outputs(
        &self,
        address: &Address,
        min_confirmations: u32,
    ) -> Result<Vec<Utxo>, NodeError> {
        self.pause().await;
        self.inner.get_unspent_outputs(address, min_confirmations).await
    }

    async fn get_transaction(&self, txid: &Txid) -> Result<Option<ChainTransaction>, NodeError> {
        self.inner.get_transaction(txid).await
    }

    async fn get_latest_block_height(&self) -> Result<u64, NodeError> {
        self.inner.get_latest_block_height().await
    }

    async fn broadcast_raw(&self, tx_hex: &str) -> Result<BroadcastResponse, NodeError> {
        self.pause().await;
        self.inner.broadcast_raw(tx_hex).await
    }
}
