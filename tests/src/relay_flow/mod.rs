use std::sync::Arc;

use assert_matches::assert_matches;
use bitcoin::{Amount, Transaction, consensus::encode::deserialize_hex};
use db::{Db, rocksdb::RocksDb};
use relay::wallet::{BuildRequest, SignableContext};
use tempfile::TempDir;
use types::{broadcast::BroadcastState, errors::NodeError};
use uuid::Uuid;

use crate::util::{COIN, TIP, address, config, foreign_signed_tx, mined, relay, sign, utxo};

#[tokio::test]
async fn test_spend_lifecycle_across_restart() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path().join("db"));
    let sender = address(1);
    let recipient = address(2);
    let operation_id = Uuid::new_v4();

    let signed_tx = {
        let db: Arc<dyn Db> = Arc::new(RocksDb::new(&config.database_directory).unwrap());
        let (service, oracle) = relay(&config, db);

        service
            .register_observed_address(&sender.to_string())
            .unwrap();
        oracle.set_utxos(
            &sender,
            vec![
                utxo(&sender, 0x01, 0, 3 * COIN, 2),
                utxo(&sender, 0x02, 0, 5 * COIN, 10),
                utxo(&sender, 0x03, 0, COIN, 1),
            ],
        );

        let sweep = service.sweep_balances().await.unwrap();
        assert_eq!(sweep.refreshed, 1);
        let page = service.list_positive_balances(10, None).unwrap();
        assert_eq!(page.items[0].amount, Amount::from_sat(8 * COIN));

        let request = BuildRequest {
            operation_id,
            asset_id: "BTC".to_string(),
            from_address: sender.to_string(),
            to_address: recipient.to_string(),
            amount: Amount::from_sat(4 * COIN),
            include_fee: false,
        };
        let context = SignableContext::from_json(&service.build_transaction(&request).await.unwrap())
            .unwrap();
        assert_eq!(context.inputs.len(), 1);
        assert_eq!(context.inputs[0].amount, Amount::from_sat(5 * COIN));
        assert_eq!(context.fee, Amount::from_sat(5_000));
        assert_eq!(context.change, Some(Amount::from_sat(COIN - 5_000)));

        let unsigned: Transaction = deserialize_hex(&context.unsigned_tx).unwrap();
        let signed = sign(&unsigned);
        assert_eq!(
            service.broadcast(operation_id, &signed).await.unwrap(),
            BroadcastState::Broadcasted
        );

        let signed_tx: Transaction = deserialize_hex(&signed).unwrap();
        oracle
            .add_transaction(mined(&signed_tx, &sender, Amount::from_sat(5 * COIN), 1))
            .unwrap();
        let summary = service.reconcile_broadcasts().await.unwrap();
        assert_eq!(summary.completed, 0);

        signed_tx
    };
    let hash = signed_tx.compute_txid().to_string();

    // restart on the same store
    let db: Arc<dyn Db> = Arc::new(RocksDb::new(&config.database_directory).unwrap());
    let (service, oracle) = relay(&config, db.clone());

    let rebuild = service.rebuild_in_flight_index().unwrap();
    assert_eq!((rebuild.restored, rebuild.removed), (0, 0));
    assert_eq!(db.get_all_in_flight().unwrap().len(), 1);

    let record = service.get_broadcast(operation_id).unwrap().unwrap();
    assert_eq!(record.hash, hash);
    assert_eq!(record.block, Some(TIP));

    oracle
        .add_transaction(mined(&signed_tx, &sender, Amount::from_sat(5 * COIN), 2))
        .unwrap();
    oracle.set_utxos(
        &sender,
        vec![
            utxo(&sender, 0x01, 0, 3 * COIN, 3),
            utxo(&sender, 0x09, 1, COIN - 5_000, 2),
        ],
    );

    let summary = service.reconcile_broadcasts().await.unwrap();
    assert_eq!(summary.completed, 1);
    assert!(db.get_all_in_flight().unwrap().is_empty());

    let record = service.get_broadcast(operation_id).unwrap().unwrap();
    assert_eq!(record.state, BroadcastState::Completed);
    assert_eq!(record.amount, Some(Amount::from_sat(4 * COIN)));
    assert_eq!(record.fee, Some(Amount::from_sat(5_000)));
    assert_eq!(
        db.get_positive_balance(&sender.to_string())
            .unwrap()
            .unwrap()
            .amount,
        Amount::from_sat(4 * COIN - 5_000)
    );

    assert!(service.delete_broadcast(operation_id).unwrap());
    assert!(db.get_pending_build(operation_id).unwrap().is_none());
    assert!(!service.delete_broadcast(operation_id).unwrap());

    assert!(
        service
            .unregister_observed_address(&sender.to_string())
            .unwrap()
    );
    assert!(service.list_positive_balances(10, None).unwrap().items.is_empty());
}

#[tokio::test]
async fn test_insufficient_funds_then_retry_with_included_fee() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path().join("db"));
    let db: Arc<dyn Db> = Arc::new(RocksDb::new(&config.database_directory).unwrap());
    let (service, oracle) = relay(&config, db);
    let sender = address(3);
    oracle.set_utxos(&sender, vec![utxo(&sender, 0x04, 0, 100_000, 6)]);

    let mut request = BuildRequest {
        operation_id: Uuid::new_v4(),
        asset_id: "BTC".to_string(),
        from_address: sender.to_string(),
        to_address: address(4).to_string(),
        amount: Amount::from_sat(100_000),
        include_fee: false,
    };
    assert_matches!(
        service.build_transaction(&request).await,
        Err(NodeError::InsufficientFunds { available, required }) => {
            assert_eq!(available, Amount::from_sat(100_000));
            assert!(required > available);
        }
    );

    request.include_fee = true;
    let context = SignableContext::from_json(&service.build_transaction(&request).await.unwrap())
        .unwrap();
    assert_eq!(context.amount + context.fee, Amount::from_sat(100_000));
}

#[tokio::test]
async fn test_rejected_broadcast_is_terminal() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path().join("db"));
    let db: Arc<dyn Db> = Arc::new(RocksDb::new(&config.database_directory).unwrap());
    let (service, oracle) = relay(&config, db.clone());
    oracle.set_broadcast_behavior(oracle::mock::BroadcastBehavior::Fail(
        NodeError::TransientProvider("connection reset".to_string()),
    ));

    let operation_id = Uuid::new_v4();
    let state = service
        .broadcast(operation_id, &foreign_signed_tx(0x40, &address(5), 20_000))
        .await
        .unwrap();
    assert_eq!(state, BroadcastState::Failed);

    oracle.set_broadcast_behavior(oracle::mock::BroadcastBehavior::Accept);
    assert_matches!(
        service
            .broadcast(operation_id, &foreign_signed_tx(0x40, &address(5), 20_000))
            .await,
        Err(NodeError::Conflict(_))
    );

    let summary = service.reconcile_broadcasts().await.unwrap();
    assert_eq!(summary.checked, 0);
    assert!(db.get_all_in_flight().unwrap().is_empty());
    assert!(oracle.broadcasted().is_empty());
}
