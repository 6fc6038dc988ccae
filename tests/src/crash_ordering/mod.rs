use std::sync::Arc;

use bitcoin::{Amount, Transaction, consensus::encode::deserialize_hex};
use db::Db;
use relay::RelayService;
use tempfile::TempDir;
use types::broadcast::BroadcastState;
use uuid::Uuid;

use crate::{
    mocks::db::MockDb,
    util::{COIN, address, config, foreign_signed_tx, mined, relay, utxo},
};

fn service_with_mock_db() -> (RelayService, oracle::mock::MockOracle, Arc<MockDb>, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path().join("unused"));
    let db = Arc::new(MockDb::new());
    let (service, oracle) = relay(&config, db.clone());
    (service, oracle, db, dir)
}

#[tokio::test]
async fn test_unregister_drops_cache_entry_first() {
    let (service, oracle, db, _dir) = service_with_mock_db();
    let watched = address(1);
    service
        .register_observed_address(&watched.to_string())
        .unwrap();
    oracle.set_utxos(&watched, vec![utxo(&watched, 0x01, 0, COIN, 4)]);
    service.refresh_address(&watched.to_string()).await.unwrap();

    db.fail_on("delete_observed_address");
    assert!(
        service
            .unregister_observed_address(&watched.to_string())
            .is_err()
    );

    // a crash here leaves an observation without a cache entry, never the reverse
    assert!(service.is_observed(&watched.to_string()).unwrap());
    assert!(db.get_positive_balance(&watched.to_string()).unwrap().is_none());

    db.heal();
    assert!(
        service
            .unregister_observed_address(&watched.to_string())
            .unwrap()
    );
    let writes = db.writes();
    let balance_delete = writes
        .iter()
        .position(|w| *w == "delete_positive_balance")
        .unwrap();
    let observation_delete = writes
        .iter()
        .position(|w| *w == "delete_observed_address")
        .unwrap();
    assert!(balance_delete < observation_delete);
}

#[tokio::test]
async fn test_completion_survives_lost_index_delete() {
    let (service, oracle, db, _dir) = service_with_mock_db();
    let sender = address(1);
    let operation_id = Uuid::new_v4();
    let signed = foreign_signed_tx(0x20, &address(2), 30_000);

    service.broadcast(operation_id, &signed).await.unwrap();
    let tx: Transaction = deserialize_hex(&signed).unwrap();
    oracle
        .add_transaction(mined(&tx, &sender, Amount::from_sat(31_000), 6))
        .unwrap();

    db.fail_on("delete_in_flight");
    let summary = service.reconcile_broadcasts().await.unwrap();
    assert_eq!(summary.failed, 1);

    let completed = service.get_broadcast(operation_id).unwrap().unwrap();
    assert_eq!(completed.state, BroadcastState::Completed);
    assert_eq!(db.get_all_in_flight().unwrap().len(), 1);

    db.heal();
    let summary = service.reconcile_broadcasts().await.unwrap();
    assert_eq!(summary.removed, 1);
    assert!(db.get_all_in_flight().unwrap().is_empty());
    assert_eq!(service.get_broadcast(operation_id).unwrap(), Some(completed));
}

#[tokio::test]
async fn test_lost_index_insert_is_restored_at_startup() {
    let (service, _oracle, db, _dir) = service_with_mock_db();
    let operation_id = Uuid::new_v4();

    db.fail_on("insert_in_flight");
    assert!(
        service
            .broadcast(operation_id, &foreign_signed_tx(0x21, &address(2), 30_000))
            .await
            .is_err()
    );
    assert!(service.get_broadcast(operation_id).unwrap().unwrap().is_pending());

    db.heal();
    let rebuild = service.rebuild_in_flight_index().unwrap();
    assert_eq!(rebuild.restored, 1);
    assert_eq!(db.get_all_in_flight().unwrap()[0].operation_id, operation_id);
}

#[tokio::test]
async fn test_delete_order_is_record_index_build() {
    let (service, _oracle, db, _dir) = service_with_mock_db();
    let operation_id = Uuid::new_v4();
    service
        .broadcast(operation_id, &foreign_signed_tx(0x22, &address(2), 30_000))
        .await
        .unwrap();

    assert!(service.delete_broadcast(operation_id).unwrap());

    let writes = db.writes();
    let tail = &writes[writes.len() - 3..];
    assert_eq!(
        tail,
        ["delete_broadcast", "delete_in_flight", "delete_pending_build"]
    );
}
