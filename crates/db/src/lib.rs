use types::{
    balance::{ObservedAddress, PositiveBalance},
    broadcast::{BroadcastRecord, InFlightBroadcast},
    errors::NodeError,
    page::Page,
    pending_build::PendingBuild,
};
use uuid::Uuid;

pub mod rocksdb;

/// Persistent store of the relay. Every write is a single-key upsert or delete;
/// there are no cross-key transactions.
pub trait Db: Send + Sync {
    fn insert_observed_address(&self, address: &ObservedAddress) -> Result<(), NodeError>;
    fn get_observed_address(&self, address: &str) -> Result<Option<ObservedAddress>, NodeError>;
    /// Returns `false` when the address was not observed.
    fn delete_observed_address(&self, address: &str) -> Result<bool, NodeError>;
    fn get_observed_addresses(
        &self,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<Page<ObservedAddress>, NodeError>;

    fn upsert_positive_balance(&self, balance: &PositiveBalance) -> Result<(), NodeError>;
    fn get_positive_balance(&self, address: &str) -> Result<Option<PositiveBalance>, NodeError>;
    fn delete_positive_balance(&self, address: &str) -> Result<bool, NodeError>;
    fn get_positive_balances(
        &self,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<Page<PositiveBalance>, NodeError>;
    fn get_all_positive_balances(&self) -> Result<Vec<PositiveBalance>, NodeError>;

    fn put_broadcast(&self, record: &BroadcastRecord) -> Result<(), NodeError>;
    fn get_broadcast(&self, operation_id: Uuid) -> Result<Option<BroadcastRecord>, NodeError>;
    fn delete_broadcast(&self, operation_id: Uuid) -> Result<bool, NodeError>;
    fn get_all_broadcasts(&self) -> Result<Vec<BroadcastRecord>, NodeError>;

    fn insert_in_flight(&self, entry: &InFlightBroadcast) -> Result<(), NodeError>;
    fn get_all_in_flight(&self) -> Result<Vec<InFlightBroadcast>, NodeError>;
    fn delete_in_flight(&self, operation_id: Uuid) -> Result<bool, NodeError>;

    fn insert_pending_build(&self, build: &PendingBuild) -> Result<(), NodeError>;
    fn get_pending_build(&self, operation_id: Uuid) -> Result<Option<PendingBuild>, NodeError>;
    fn delete_pending_build(&self, operation_id: Uuid) -> Result<bool, NodeError>;
}
