use std::sync::Arc;

use bitcoin::{Amount, Network};
use db::Db;
use oracle::oracle::Oracle;
use types::{
    asset::{Asset, Capabilities},
    balance::PositiveBalance,
    broadcast::{BroadcastRecord, BroadcastState},
    errors::NodeError,
    page::Page,
};
use uuid::Uuid;

use crate::{
    config::RelayConfig,
    handlers::{
        balance::{BalanceReconciler, SweepSummary},
        broadcast::{BroadcastCoordinator, IndexRebuild, ReconcileSummary},
    },
    wallet::{BuildRequest, CoinSelector, TransactionBuilder, parse_address},
};

pub mod config;
pub mod handlers;
pub mod start_service;
pub mod timer_adapter;
pub mod wallet;

#[cfg(test)]
mod tests;

/// Entry point of the relay: one instance per configured chain and asset.
#[derive(Clone)]
pub struct RelayService {
    pub network: Network,
    pub asset: Asset,
    pub builder: TransactionBuilder,
    pub broadcasts: BroadcastCoordinator,
    pub balances: BalanceReconciler,
}

impl RelayService {
    #[must_use]
    pub fn new(config: &RelayConfig, db: Arc<dyn Db>, oracle: Box<dyn Oracle>) -> Self {
        let balances = BalanceReconciler::new(
            db.clone(),
            oracle.clone(),
            config.network,
            config.min_confirmations,
            config.observation_page_size,
        );
        let broadcasts = BroadcastCoordinator::new(
            db.clone(),
            oracle.clone(),
            balances.clone(),
            config.min_confirmations,
        );
        let builder = TransactionBuilder::new(
            db,
            oracle,
            balances.clone(),
            config.network,
            config.asset(),
            CoinSelector {
                fee_policy: config.fee_policy(),
                min_confirmations: config.min_confirmations,
            },
        );

        Self {
            network: config.network,
            asset: config.asset(),
            builder,
            broadcasts,
            balances,
        }
    }

    pub async fn build_transaction(&self, request: &BuildRequest) -> Result<String, NodeError> {
        self.builder.build(request).await
    }

    pub async fn broadcast(
        &self,
        operation_id: Uuid,
        signed_tx_hex: &str,
    ) -> Result<BroadcastState, NodeError> {
        Ok(self.broadcasts.broadcast(operation_id, signed_tx_hex).await?.state)
    }

    pub fn get_broadcast(&self, operation_id: Uuid) -> Result<Option<BroadcastRecord>, NodeError> {
        self.broadcasts.get(operation_id)
    }

    pub fn delete_broadcast(&self, operation_id: Uuid) -> Result<bool, NodeError> {
        self.broadcasts.delete(operation_id)
    }

    pub fn register_observed_address(&self, address: &str) -> Result<(), NodeError> {
        self.balances.register(address)
    }

    pub fn unregister_observed_address(&self, address: &str) -> Result<bool, NodeError> {
        self.balances.unregister(address)
    }

    pub fn list_positive_balances(
        &self,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<Page<PositiveBalance>, NodeError> {
        self.balances
            .list_positive_balances(page_size, continuation)
    }

    pub async fn reconcile_broadcasts(&self) -> Result<ReconcileSummary, NodeError> {
        self.broadcasts.reconcile().await
    }

    pub async fn sweep_balances(&self) -> Result<SweepSummary, NodeError> {
        self.balances.sweep_all().await
    }

    pub async fn refresh_address(&self, address: &str) -> Result<Amount, NodeError> {
        let canonical = parse_address(address, self.network)?.to_string();
        let hint = self.balances.has_positive_balance(&canonical)?;
        self.balances.refresh_address(&canonical, hint).await
    }

    pub fn rebuild_in_flight_index(&self) -> Result<IndexRebuild, NodeError> {
        self.broadcasts.rebuild_in_flight_index()
    }

    #[must_use]
    pub fn is_valid_address(&self, address: &str) -> bool {
        wallet::is_valid_address(address, self.network)
    }

    #[must_use]
    pub fn assets(&self) -> Vec<Asset> {
        vec![self.asset.clone()]
    }

    #[must_use]
    pub fn asset(&self, asset_id: &str) -> Option<Asset> {
        (self.asset.id == asset_id).then(|| self.asset.clone())
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    pub fn is_observed(&self, address: &str) -> Result<bool, NodeError> {
        self.balances.is_observed(address)
    }

    /// Confirmed balance straight from the chain, without touching the cache.
    pub async fn get_address_balance(&self, address: &str) -> Result<Amount, NodeError> {
        let address = parse_address(address, self.network)?;
        self.balances
            .oracle
            .get_balance(&address, self.balances.min_confirmations)
            .await
    }
}
