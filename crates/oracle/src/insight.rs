use std::{str::FromStr, time::Duration};

use crate::{
    oracle::{Oracle, decode_raw_transaction},
    retry::{RetryPolicy, with_retry},
};
use bitcoin::{Address, Amount, Denomination, OutPoint, ScriptBuf, Txid};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;
use types::{
    chain::{BroadcastResponse, ChainTransaction, ChainTxInput, ChainTxOutput},
    errors::NodeError,
    utxo::Utxo,
};

/// Client for an Insight-style block explorer API.
#[derive(Clone)]
pub struct InsightOracle {
    pub client: Client,
    pub base_url: String,
    pub retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct InsightUtxo {
    txid: String,
    vout: u32,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: String,
    satoshis: u64,
    #[serde(default)]
    confirmations: u64,
}

#[derive(Debug, Deserialize)]
struct InsightVin {
    addr: Option<String>,
    #[serde(rename = "valueSat", default)]
    value_sat: u64,
}

#[derive(Debug, Default, Deserialize)]
struct InsightScriptPubKey {
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct InsightVout {
    value: String,
    #[serde(rename = "scriptPubKey", default)]
    script_pub_key: Option<InsightScriptPubKey>,
}

#[derive(Debug, Deserialize)]
struct InsightTx {
    txid: String,
    #[serde(default)]
    vin: Vec<InsightVin>,
    #[serde(default)]
    vout: Vec<InsightVout>,
    #[serde(default)]
    confirmations: u64,
    #[serde(default)]
    blockheight: Option<i64>,
    #[serde(default)]
    time: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct InsightStatus {
    info: InsightInfo,
}

#[derive(Debug, Deserialize)]
struct InsightInfo {
    blocks: u64,
}

#[derive(Debug, Deserialize)]
struct InsightSendResponse {
    #[serde(default)]
    txid: String,
}

impl InsightOracle {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, NodeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::Error(format!("Cannot build Insight client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, NodeError> {
        let url = format!("{}{path}", self.base_url);
        let url = url.as_str();

        with_retry(self.retry, "insight GET", move || async move {
            debug!("GET {url}");
            let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let response = check_status(response)?;
            let body = response.text().await.map_err(map_reqwest_error)?;
            parse_json(&body).map(Some)
        })
        .await
    }

    fn to_chain_transaction(tx: InsightTx) -> Result<ChainTransaction, NodeError> {
        let outputs = tx
            .vout
            .into_iter()
            .map(|vout| {
                Ok(ChainTxOutput {
                    addresses: vout.script_pub_key.unwrap_or_default().addresses,
                    value: parse_coin_value(&vout.value)?,
                })
            })
            .collect::<Result<Vec<_>, NodeError>>()?;

        Ok(ChainTransaction {
            txid: tx.txid,
            confirmations: tx.confirmations,
            block_height: tx.blockheight.and_then(|h| u64::try_from(h).ok()),
            time: tx.time,
            inputs: tx
                .vin
                .into_iter()
                .map(|vin| ChainTxInput {
                    address: vin.addr,
                    value: Amount::from_sat(vin.value_sat),
                })
                .collect(),
            outputs,
        })
    }
}

#[async_trait::async_trait]
impl Oracle for InsightOracle {
    async fn get_unspent_outputs(
        &self,
        address: &Address,
        min_confirmations: u32,
    ) -> Result<Vec<Utxo>, NodeError> {
        let utxos: Vec<InsightUtxo> = self
            .get_json(&format!("/addr/{address}/utxo"))
            .await?
            .unwrap_or_default();

        let utxos = utxos
            .into_iter()
            .map(|u| {
                let txid = Txid::from_str(&u.txid).map_err(|e| {
                    NodeError::MalformedProviderResponse(format!("Invalid txid {}: {e}", u.txid))
                })?;
                let script_pubkey = ScriptBuf::from_hex(&u.script_pub_key).map_err(|e| {
                    NodeError::MalformedProviderResponse(format!("Invalid scriptPubKey: {e}"))
                })?;
                Ok(Utxo {
                    outpoint: OutPoint::new(txid, u.vout),
                    value: Amount::from_sat(u.satoshis),
                    script_pubkey,
                    confirmations: u32::try_from(u.confirmations).unwrap_or(u32::MAX),
                })
            })
            .collect::<Result<Vec<_>, NodeError>>()?;

        Ok(utxos
            .into_iter()
            .filter(|u| u.is_spendable(min_confirmations))
            .collect())
    }

    async fn get_transaction(&self, txid: &Txid) -> Result<Option<ChainTransaction>, NodeError> {
        self.get_json::<InsightTx>(&format!("/tx/{txid}"))
            .await?
            .map(Self::to_chain_transaction)
            .transpose()
    }

    async fn get_latest_block_height(&self) -> Result<u64, NodeError> {
        let status: InsightStatus = self
            .get_json("/status?q=getInfo")
            .await?
            .ok_or_else(|| NodeError::MalformedProviderResponse("Missing status".to_string()))?;
        Ok(status.info.blocks)
    }

    async fn broadcast_raw(&self, tx_hex: &str) -> Result<BroadcastResponse, NodeError> {
        decode_raw_transaction(tx_hex)?;

        let url = format!("{}/tx/send", self.base_url);
        let url = url.as_str();
        let body = serde_json::json!({ "rawtx": tx_hex.trim() });
        let body = &body;

        let response: InsightSendResponse =
            with_retry(self.retry, "insight broadcast", move || async move {
                let response = self
                    .client
                    .post(url)
                    .json(body)
                    .send()
                    .await
                    .map_err(map_reqwest_error)?;
                let response = check_status(response)?;
                let text = response.text().await.map_err(map_reqwest_error)?;
                parse_json(&text)
            })
            .await?;

        Ok(BroadcastResponse {
            txid: response.txid,
        })
    }
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, NodeError> {
    serde_json::from_str(body).map_err(|e| NodeError::MalformedProviderResponse(e.to_string()))
}

fn parse_coin_value(value: &str) -> Result<Amount, NodeError> {
    Amount::from_str_in(value, Denomination::Bitcoin)
        .map_err(|e| NodeError::MalformedProviderResponse(format!("Invalid value {value}: {e}")))
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, NodeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(NodeError::TransientProvider(format!("HTTP {status}")));
    }
    Err(NodeError::MalformedProviderResponse(format!("HTTP {status}")))
}

fn map_reqwest_error(e: reqwest::Error) -> NodeError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        NodeError::TransientProvider(e.to_string())
    } else {
        NodeError::MalformedProviderResponse(e.to_string())
    }
}
