use std::time::Duration;

use bitcoin::{Network, Txid, hashes::Hash};
use oracle::{esplora::EsploraOracle, oracle::Oracle, retry::RetryPolicy};

fn testnet_oracle() -> EsploraOracle {
    dotenvy::dotenv().ok();
    let url = std::env::var("ESPLORA_URL").ok();
    EsploraOracle::new(
        Network::Testnet,
        url.as_deref(),
        Duration::from_secs(20),
        RetryPolicy::default(),
    )
    .unwrap()
}

#[ignore]
#[tokio::test]
async fn test_live_tip_and_unknown_transaction() {
    let oracle = testnet_oracle();

    let tip = oracle.get_latest_block_height().await.unwrap();
    assert!(tip > 2_500_000);

    let unknown = Txid::from_byte_array([0x42; 32]);
    assert!(oracle.get_transaction(&unknown).await.unwrap().is_none());
}

#[ignore]
#[tokio::test]
async fn test_live_rejects_garbage_broadcast() {
    let oracle = testnet_oracle();
    assert!(oracle.broadcast_raw("00").await.is_err());
}
