use std::time::Duration;

use crate::{
    oracle::{Oracle, confirmations_at, decode_raw_transaction},
    retry::{RetryPolicy, with_retry},
};
use bitcoin::{Address, Amount, Network, OutPoint, Script, Txid};
use esplora_client::{AsyncClient, Builder};
use tracing::{debug, info};
use types::{
    chain::{BroadcastResponse, ChainTransaction, ChainTxInput, ChainTxOutput},
    errors::NodeError,
    utxo::Utxo,
};

const DEFAULT_MAX_HISTORY_PAGES: u32 = 20;

#[derive(Clone)]
pub struct EsploraOracle {
    pub client: AsyncClient,
    pub network: Network,
    pub retry: RetryPolicy,
    pub max_history_pages: u32,
}

#[must_use]
pub const fn default_url(network: Network) -> Option<&'static str> {
    match network {
        Network::Bitcoin => Some("https://blockstream.info/api"),
        Network::Testnet => Some("https://blockstream.info/testnet/api"),
        Network::Signet => Some("https://blockstream.info/signet/api"),
        _ => None,
    }
}

impl EsploraOracle {
    pub fn new(
        network: Network,
        url: Option<&str>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, NodeError> {
        let url = url.or_else(|| default_url(network)).ok_or_else(|| {
            NodeError::Error(format!("No default Esplora endpoint for {network}, set provider url"))
        })?;

        let client = Builder::new(url)
            .timeout(timeout.as_secs().max(1))
            .build_async()
            .map_err(|e| NodeError::Error(format!("Cannot build Esplora client: {e}")))?;

        info!("Using Esplora provider at {url}");

        Ok(Self {
            client,
            network,
            retry,
            max_history_pages: DEFAULT_MAX_HISTORY_PAGES,
        })
    }

    fn address_of(&self, script: &Script) -> Option<String> {
        Address::from_script(script, self.network)
            .ok()
            .map(|a| a.to_string())
    }

    async fn tip(&self) -> Result<u64, NodeError> {
        with_retry(self.retry, "esplora get_height", move || async move {
            self.client.get_height().await.map_err(map_esplora_error)
        })
        .await
        .map(u64::from)
    }

    async fn script_history(
        &self,
        script: &Script,
        last_seen: Option<Txid>,
    ) -> Result<Vec<esplora_client::Tx>, NodeError> {
        with_retry(self.retry, "esplora scripthash_txs", move || async move {
            self.client
                .scripthash_txs(script, last_seen)
                .await
                .map_err(map_esplora_error)
        })
        .await
    }

    async fn is_spent(&self, txid: Txid, vout: u64) -> Result<bool, NodeError> {
        let status = with_retry(self.retry, "esplora get_output_status", move || async move {
            self.client
                .get_output_status(&txid, vout)
                .await
                .map_err(map_esplora_error)
        })
        .await;

        match status {
            Ok(status) => Ok(status.is_some_and(|s| s.spent)),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn to_chain_transaction(&self, tx: esplora_client::Tx, tip: u64) -> ChainTransaction {
        let block_height = tx.status.block_height.map(u64::from);

        ChainTransaction {
            txid: tx.txid.to_string(),
            confirmations: confirmations_at(tip, block_height),
            block_height,
            time: tx.status.block_time,
            inputs: tx
                .vin
                .iter()
                .filter_map(|vin| vin.prevout.as_ref())
                .map(|prevout| ChainTxInput {
                    address: self.address_of(&prevout.scriptpubkey),
                    value: Amount::from_sat(prevout.value),
                })
                .collect(),
            outputs: tx
                .vout
                .iter()
                .map(|vout| ChainTxOutput {
                    addresses: self.address_of(&vout.scriptpubkey).into_iter().collect(),
                    value: Amount::from_sat(vout.value),
                })
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl Oracle for EsploraOracle {
    async fn get_unspent_outputs(
        &self,
        address: &Address,
        min_confirmations: u32,
    ) -> Result<Vec<Utxo>, NodeError> {
        let tip = self.tip().await?;
        let script = address.script_pubkey();
        let history = walk_history(
            self.max_history_pages,
            |tx: &esplora_client::Tx| tx.txid,
            |last_seen| self.script_history(&script, last_seen),
        )
        .await
        .map_err(|e| match e {
            NodeError::TransientProvider(reason) => {
                NodeError::TransientProvider(format!("{address}: {reason}"))
            }
            other => other,
        })?;

        let mut unspent = Vec::new();
        for tx in history {
            let confirmations = confirmations_at(tip, tx.status.block_height.map(u64::from));
            let confirmations = u32::try_from(confirmations).unwrap_or(u32::MAX);
            if confirmations < min_confirmations {
                continue;
            }

            for (vout, output) in tx.vout.iter().enumerate() {
                if output.scriptpubkey != script {
                    continue;
                }
                let vout = u32::try_from(vout).map_err(|_| {
                    NodeError::MalformedProviderResponse("Output index overflow".to_string())
                })?;
                if self.is_spent(tx.txid, u64::from(vout)).await? {
                    continue;
                }
                unspent.push(Utxo {
                    outpoint: OutPoint::new(tx.txid, vout),
                    value: Amount::from_sat(output.value),
                    script_pubkey: script.clone(),
                    confirmations,
                });
            }
        }

        debug!(
            "Found {} unspent outputs for {address} at tip {tip}",
            unspent.len()
        );
        Ok(unspent)
    }

    async fn get_transaction(&self, txid: &Txid) -> Result<Option<ChainTransaction>, NodeError> {
        let txid = *txid;
        let tx = with_retry(self.retry, "esplora get_tx_info", move || async move {
            self.client
                .get_tx_info(&txid)
                .await
                .map_err(map_esplora_error)
        })
        .await;

        let tx = match tx {
            Ok(Some(tx)) => tx,
            Ok(None) => return Ok(None),
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let tip = self.tip().await?;
        Ok(Some(self.to_chain_transaction(tx, tip)))
    }

    async fn get_latest_block_height(&self) -> Result<u64, NodeError> {
        self.tip().await
    }

    async fn broadcast_raw(&self, tx_hex: &str) -> Result<BroadcastResponse, NodeError> {
        let tx = decode_raw_transaction(tx_hex)?;
        let tx_ref = &tx;

        with_retry(self.retry, "esplora broadcast", move || async move {
            self.client
                .broadcast(tx_ref)
                .await
                .map(|_| ())
                .map_err(map_esplora_error)
        })
        .await?;

        Ok(BroadcastResponse {
            txid: tx.compute_txid().to_string(),
        })
    }
}

/// Reads a txid-paged history until the provider runs out of pages. Fails rather
/// than returning a partial history when more than `max_pages` pages exist.
async fn walk_history<T, C, F, Fut>(max_pages: u32, cursor: C, mut fetch: F) -> Result<Vec<T>, NodeError>
where
    C: Fn(&T) -> Txid,
    F: FnMut(Option<Txid>) -> Fut,
    Fut: Future<Output = Result<Vec<T>, NodeError>>,
{
    let mut items = Vec::new();
    let mut last_seen = None;

    for page in 0..=max_pages {
        let batch = match fetch(last_seen).await {
            Ok(batch) => batch,
            Err(e) if e.is_not_found() => break,
            Err(e) => return Err(e),
        };
        let Some(last) = batch.last() else {
            break;
        };
        if page == max_pages {
            return Err(NodeError::TransientProvider(format!(
                "History is longer than {max_pages} pages"
            )));
        }

        last_seen = Some(cursor(last));
        items.extend(batch);
    }

    Ok(items)
}

fn map_esplora_error(e: esplora_client::Error) -> NodeError {
    match e {
        esplora_client::Error::HttpResponse { status: 404, message } => NodeError::NotFound(message),
        esplora_client::Error::HttpResponse { status, message } if status == 429 || status >= 500 => {
            NodeError::TransientProvider(format!("HTTP {status}: {message}"))
        }
        esplora_client::Error::HttpResponse { status, message } => {
            NodeError::MalformedProviderResponse(format!("HTTP {status}: {message}"))
        }
        esplora_client::Error::Reqwest(e) => NodeError::TransientProvider(e.to_string()),
        other => NodeError::MalformedProviderResponse(other.to_string()),
    }
}
