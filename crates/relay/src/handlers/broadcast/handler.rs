use std::collections::HashSet;

use bitcoin::Txid;
use oracle::oracle::decode_raw_transaction;
use tracing::{debug, error, info, warn};
use types::{
    broadcast::{BroadcastRecord, InFlightBroadcast},
    chain::ChainTransaction,
    errors::NodeError,
};
use uuid::Uuid;

use crate::{
    handlers::{
        CycleGuard, OperationReservation,
        broadcast::{BroadcastCoordinator, IndexRebuild, ReconcileSummary},
    },
    wallet::parse_address,
};

enum EntryOutcome {
    Completed,
    Waiting,
    Removed,
}

impl BroadcastCoordinator {
    /// Submits a signed transaction once per operation id.
    ///
    /// Rejections by the provider are stored as a `Failed` record instead of being
    /// returned, so the caller always gets the record back.
    pub async fn broadcast(
        &self,
        operation_id: Uuid,
        signed_tx_hex: &str,
    ) -> Result<BroadcastRecord, NodeError> {
        let Some(_reservation) = OperationReservation::try_reserve(&self.submitting, operation_id)
        else {
            return Err(NodeError::Conflict(format!(
                "Operation {operation_id} is already being broadcasted"
            )));
        };
        if self.db.get_broadcast(operation_id)?.is_some() {
            return Err(NodeError::Conflict(format!(
                "Operation {operation_id} was already broadcasted"
            )));
        }

        let tx = decode_raw_transaction(signed_tx_hex)?;
        let local_hash = tx.compute_txid().to_string();
        let block = self.oracle.get_latest_block_height().await?;

        let record = match self.oracle.broadcast_raw(signed_tx_hex).await {
            Ok(response) if !response.txid.is_empty() => {
                if response.txid != local_hash {
                    warn!(
                        "Provider reported txid {} for operation {operation_id}, computed {local_hash}",
                        response.txid
                    );
                }
                BroadcastRecord::broadcasted(operation_id, response.txid, block)
            }
            Ok(_) => BroadcastRecord::failed(
                operation_id,
                local_hash,
                "Provider returned an empty transaction id".to_string(),
                block,
            ),
            Err(e) => {
                error!("Broadcast of operation {operation_id} failed: {e}");
                BroadcastRecord::failed(operation_id, local_hash, e.to_string(), block)
            }
        };

        self.db.put_broadcast(&record)?;
        if record.is_pending() {
            self.db.insert_in_flight(&InFlightBroadcast::from(&record))?;
        }

        metrics::counter!("relay_broadcasts_total", "state" => record.state.to_string())
            .increment(1);
        info!(
            "Operation {operation_id} broadcast as {} ({})",
            record.hash, record.state
        );
        Ok(record)
    }

    /// Checks every in-flight broadcast against the chain and completes the ones
    /// with enough confirmations.
    #[allow(clippy::cast_precision_loss)]
    pub async fn reconcile(&self) -> Result<ReconcileSummary, NodeError> {
        let Some(_guard) = CycleGuard::try_acquire(&self.running) else {
            debug!("Broadcast reconciliation already running, skipping");
            return Ok(ReconcileSummary {
                skipped: true,
                ..ReconcileSummary::default()
            });
        };

        let entries = self.db.get_all_in_flight()?;
        let mut summary = ReconcileSummary::default();

        for entry in entries {
            summary.checked += 1;
            match self.reconcile_entry(&entry).await {
                Ok(EntryOutcome::Completed) => summary.completed += 1,
                Ok(EntryOutcome::Removed) => summary.removed += 1,
                Ok(EntryOutcome::Waiting) => {}
                Err(e) => {
                    warn!(
                        "Failed to check broadcast of operation {}: {e}",
                        entry.operation_id
                    );
                    summary.failed += 1;
                }
            }
        }

        let remaining = self.db.get_all_in_flight()?.len();
        metrics::gauge!("relay_in_flight_broadcasts").set(remaining as f64);

        if summary.checked > 0 {
            info!(
                "Reconciled {} broadcasts: {} completed, {} removed, {} failed",
                summary.checked, summary.completed, summary.removed, summary.failed
            );
        }
        Ok(summary)
    }

    async fn reconcile_entry(&self, entry: &InFlightBroadcast) -> Result<EntryOutcome, NodeError> {
        let Some(mut record) = self
            .db
            .get_broadcast(entry.operation_id)?
            .filter(BroadcastRecord::is_pending)
        else {
            self.db.delete_in_flight(entry.operation_id)?;
            return Ok(EntryOutcome::Removed);
        };

        let txid: Txid = entry.hash.parse().map_err(|e| {
            NodeError::InvalidTransaction(format!("Bad transaction id {}: {e}", entry.hash))
        })?;

        let Some(tx) = self.oracle.get_transaction(&txid).await? else {
            debug!("Transaction {txid} not seen yet");
            return Ok(EntryOutcome::Waiting);
        };
        if tx.confirmations < u64::from(self.min_confirmations) {
            debug!(
                "Transaction {txid} has {} of {} confirmations",
                tx.confirmations, self.min_confirmations
            );
            return Ok(EntryOutcome::Waiting);
        }

        let block = tx.block_height.or(record.block).unwrap_or_default();
        if record.complete(tx.net_amount()?, tx.fee()?, block) {
            self.db.put_broadcast(&record)?;
            metrics::counter!("relay_broadcasts_completed_total").increment(1);
            info!(
                "Operation {} completed in block {block}",
                record.operation_id
            );
        }
        self.db.delete_in_flight(entry.operation_id)?;

        self.refresh_touched_addresses(&tx).await;
        Ok(EntryOutcome::Completed)
    }

    async fn refresh_touched_addresses(&self, tx: &ChainTransaction) {
        for reported in tx.addresses() {
            let address = match parse_address(&reported, self.balances.network) {
                Ok(parsed) => parsed.to_string(),
                Err(e) => {
                    debug!("Skipping {reported}: {e}");
                    continue;
                }
            };
            match self.balances.is_observed(&address) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    debug!("Skipping {address}: {e}");
                    continue;
                }
            }

            let refreshed = match self.balances.has_positive_balance(&address) {
                Ok(hint) => self.balances.refresh_observed(&address, hint).await,
                Err(e) => Err(e),
            };
            if let Err(e) = refreshed {
                warn!("Failed to refresh balance of {address}: {e}");
            }
        }
    }

    /// Removes the record of an operation together with its index entry and build.
    /// Returns `false` when no record exists.
    pub fn delete(&self, operation_id: Uuid) -> Result<bool, NodeError> {
        let Some(record) = self.db.get_broadcast(operation_id)? else {
            return Ok(false);
        };

        self.db.delete_broadcast(operation_id)?;
        if record.is_pending() {
            self.db.delete_in_flight(operation_id)?;
        }
        self.db.delete_pending_build(operation_id)?;

        info!("Deleted broadcast of operation {operation_id}");
        Ok(true)
    }

    pub fn get(&self, operation_id: Uuid) -> Result<Option<BroadcastRecord>, NodeError> {
        self.db.get_broadcast(operation_id)
    }

    /// Makes the in-flight index match the `Broadcasted` records exactly.
    #[allow(clippy::cast_precision_loss)]
    pub fn rebuild_in_flight_index(&self) -> Result<IndexRebuild, NodeError> {
        let pending: Vec<BroadcastRecord> = self
            .db
            .get_all_broadcasts()?
            .into_iter()
            .filter(BroadcastRecord::is_pending)
            .collect();
        let indexed: HashSet<Uuid> = self
            .db
            .get_all_in_flight()?
            .into_iter()
            .map(|entry| entry.operation_id)
            .collect();
        let expected: HashSet<Uuid> = pending.iter().map(|r| r.operation_id).collect();

        let mut rebuild = IndexRebuild::default();
        for record in pending.iter().filter(|r| !indexed.contains(&r.operation_id)) {
            self.db.insert_in_flight(&InFlightBroadcast::from(record))?;
            rebuild.restored += 1;
        }
        for stale in indexed.difference(&expected) {
            self.db.delete_in_flight(*stale)?;
            rebuild.removed += 1;
        }

        metrics::gauge!("relay_in_flight_broadcasts").set(expected.len() as f64);
        if rebuild != IndexRebuild::default() {
            info!(
                "Rebuilt in-flight index: {} restored, {} removed",
                rebuild.restored, rebuild.removed
            );
        }
        Ok(rebuild)
    }
}
