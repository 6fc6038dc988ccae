use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::oracle::{Oracle, decode_raw_transaction};
use bitcoin::{Address, Txid};
use tracing::info;
use types::{
    chain::{BroadcastResponse, ChainTransaction},
    errors::NodeError,
    utxo::Utxo,
};

/// How the mock answers `broadcast_raw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastBehavior {
    Accept,
    /// Provider accepts the call but reports no txid.
    EmptyTxid,
    Fail(NodeError),
}

#[derive(Debug)]
struct MockState {
    utxos: HashMap<String, Vec<Utxo>>,
    transactions: HashMap<Txid, ChainTransaction>,
    height: u64,
    broadcast_behavior: BroadcastBehavior,
    failing_addresses: HashSet<String>,
    failing_transactions: HashSet<Txid>,
    broadcasted: Vec<String>,
    utxo_queries: usize,
}

/// In-memory chain. Clones share state, so a test can keep a handle and script the chain
/// while the service holds another.
#[derive(Debug, Clone)]
pub struct MockOracle {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MockOracle {
    #[must_use]
    pub fn new(height: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                utxos: HashMap::new(),
                transactions: HashMap::new(),
                height,
                broadcast_behavior: BroadcastBehavior::Accept,
                failing_addresses: HashSet::new(),
                failing_transactions: HashSet::new(),
                broadcasted: Vec::new(),
                utxo_queries: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_utxos(&self, address: &Address, utxos: Vec<Utxo>) {
        self.state().utxos.insert(address.to_string(), utxos);
    }

    pub fn clear_utxos(&self, address: &Address) {
        self.state().utxos.remove(&address.to_string());
    }

    pub fn add_transaction(&self, tx: ChainTransaction) -> Result<(), NodeError> {
        let txid: Txid = tx
            .txid
            .parse()
            .map_err(|e| NodeError::InvalidTransaction(format!("Invalid txid: {e}")))?;
        self.state().transactions.insert(txid, tx);
        Ok(())
    }

    pub fn set_height(&self, height: u64) {
        self.state().height = height;
    }

    pub fn set_broadcast_behavior(&self, behavior: BroadcastBehavior) {
        self.state().broadcast_behavior = behavior;
    }

    /// Lookups for `address` fail with a transient provider error until cleared.
    pub fn fail_address(&self, address: &Address) {
        self.state().failing_addresses.insert(address.to_string());
    }

    /// Lookups of `txid` fail with a transient provider error until cleared.
    pub fn fail_transaction(&self, txid: Txid) {
        self.state().failing_transactions.insert(txid);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failing_addresses.clear();
        state.failing_transactions.clear();
    }

    #[must_use]
    pub fn broadcasted(&self) -> Vec<String> {
        self.state().broadcasted.clone()
    }

    #[must_use]
    pub fn utxo_queries(&self) -> usize {
        self.state().utxo_queries
    }
}

#[async_trait::async_trait]
impl Oracle for MockOracle {
    async fn get_unspent_outputs(
        &self,
        address: &Address,
        min_confirmations: u32,
    ) -> Result<Vec<Utxo>, NodeError> {
        let mut state = self.state();
        state.utxo_queries += 1;

        let key = address.to_string();
        if state.failing_addresses.contains(&key) {
            return Err(NodeError::TransientProvider(format!(
                "Mock provider unavailable for {key}"
            )));
        }

        Ok(state
            .utxos
            .get(&key)
            .map(|utxos| {
                utxos
                    .iter()
                    .filter(|u| u.is_spendable(min_confirmations))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_transaction(&self, txid: &Txid) -> Result<Option<ChainTransaction>, NodeError> {
        let state = self.state();
        if state.failing_transactions.contains(txid) {
            return Err(NodeError::TransientProvider(format!(
                "Mock provider unavailable for {txid}"
            )));
        }
        Ok(state.transactions.get(txid).cloned())
    }

    async fn get_latest_block_height(&self) -> Result<u64, NodeError> {
        Ok(self.state().height)
    }

    async fn broadcast_raw(&self, tx_hex: &str) -> Result<BroadcastResponse, NodeError> {
        let tx = decode_raw_transaction(tx_hex)?;
        let mut state = self.state();

        match state.broadcast_behavior.clone() {
            BroadcastBehavior::Accept => {
                let txid = tx.compute_txid().to_string();
                info!("Mock broadcast of {txid}");
                state.broadcasted.push(txid.clone());
                Ok(BroadcastResponse { txid })
            }
            BroadcastBehavior::EmptyTxid => Ok(BroadcastResponse {
                txid: String::new(),
            }),
            BroadcastBehavior::Fail(e) => Err(e),
        }
    }
}
