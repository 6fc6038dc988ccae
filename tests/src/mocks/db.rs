use std::{
    collections::{BTreeMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use db::Db;
use types::{
    balance::{ObservedAddress, PositiveBalance},
    broadcast::{BroadcastRecord, InFlightBroadcast},
    errors::NodeError,
    page::Page,
    pending_build::PendingBuild,
};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    observed: BTreeMap<String, ObservedAddress>,
    balances: BTreeMap<String, PositiveBalance>,
    broadcasts: BTreeMap<String, BroadcastRecord>,
    in_flight: BTreeMap<String, InFlightBroadcast>,
    builds: BTreeMap<String, PendingBuild>,
    failing: HashSet<&'static str>,
    writes: Vec<&'static str>,
}

/// In-memory store that records the order of writes and can be told to fail a
/// given operation, to simulate a crash between two writes.
#[derive(Default)]
pub struct MockDb {
    tables: Mutex<Tables>,
}

impl MockDb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every later call of `operation` fail with a storage error.
    pub fn fail_on(&self, operation: &'static str) {
        self.tables().failing.insert(operation);
    }

    pub fn heal(&self) {
        self.tables().failing.clear();
    }

    /// Names of the successful write operations, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<&'static str> {
        self.tables().writes.clone()
    }

    fn write(&self, operation: &'static str) -> Result<MutexGuard<'_, Tables>, NodeError> {
        let mut tables = self.tables();
        if tables.failing.contains(operation) {
            return Err(NodeError::Storage(format!("{operation} failed")));
        }
        tables.writes.push(operation);
        Ok(tables)
    }
}

fn page<T: Clone>(
    table: &BTreeMap<String, T>,
    page_size: usize,
    continuation: Option<&str>,
) -> Result<Page<T>, NodeError> {
    if page_size == 0 {
        return Err(NodeError::Error("Page size must be positive".to_string()));
    }

    let start = match continuation {
        Some(token) => {
            let bytes = hex::decode(token)
                .map_err(|_| NodeError::Error(format!("Invalid continuation token {token}")))?;
            String::from_utf8(bytes)
                .map_err(|_| NodeError::Error(format!("Invalid continuation token {token}")))?
        }
        None => String::new(),
    };

    let mut entries = table.range(start..);
    let items: Vec<T> = entries
        .by_ref()
        .take(page_size)
        .map(|(_, value)| value.clone())
        .collect();
    let continuation = entries.next().map(|(key, _)| hex::encode(key));

    Ok(Page {
        items,
        continuation,
    })
}

impl Db for MockDb {
    fn insert_observed_address(&self, address: &ObservedAddress) -> Result<(), NodeError> {
        self.write("insert_observed_address")?
            .observed
            .insert(address.address.clone(), address.clone());
        Ok(())
    }

    fn get_observed_address(&self, address: &str) -> Result<Option<ObservedAddress>, NodeError> {
        Ok(self.tables().observed.get(address).cloned())
    }

    fn delete_observed_address(&self, address: &str) -> Result<bool, NodeError> {
        Ok(self
            .write("delete_observed_address")?
            .observed
            .remove(address)
            .is_some())
    }

    fn get_observed_addresses(
        &self,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<Page<ObservedAddress>, NodeError> {
        page(&self.tables().observed, page_size, continuation)
    }

    fn upsert_positive_balance(&self, balance: &PositiveBalance) -> Result<(), NodeError> {
        self.write("upsert_positive_balance")?
            .balances
            .insert(balance.address.clone(), balance.clone());
        Ok(())
    }

    fn get_positive_balance(&self, address: &str) -> Result<Option<PositiveBalance>, NodeError> {
        Ok(self.tables().balances.get(address).cloned())
    }

    fn delete_positive_balance(&self, address: &str) -> Result<bool, NodeError> {
        Ok(self
            .write("delete_positive_balance")?
            .balances
            .remove(address)
            .is_some())
    }

    fn get_positive_balances(
        &self,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<Page<PositiveBalance>, NodeError> {
        page(&self.tables().balances, page_size, continuation)
    }

    fn get_all_positive_balances(&self) -> Result<Vec<PositiveBalance>, NodeError> {
        Ok(self.tables().balances.values().cloned().collect())
    }

    fn put_broadcast(&self, record: &BroadcastRecord) -> Result<(), NodeError> {
        self.write("put_broadcast")?
            .broadcasts
            .insert(record.operation_id.to_string(), record.clone());
        Ok(())
    }

    fn get_broadcast(&self, operation_id: Uuid) -> Result<Option<BroadcastRecord>, NodeError> {
        Ok(self
            .tables()
            .broadcasts
            .get(&operation_id.to_string())
            .cloned())
    }

    fn delete_broadcast(&self, operation_id: Uuid) -> Result<bool, NodeError> {
        Ok(self
            .write("delete_broadcast")?
            .broadcasts
            .remove(&operation_id.to_string())
            .is_some())
    }

    fn get_all_broadcasts(&self) -> Result<Vec<BroadcastRecord>, NodeError> {
        Ok(self.tables().broadcasts.values().cloned().collect())
    }

    fn insert_in_flight(&self, entry: &InFlightBroadcast) -> Result<(), NodeError> {
        self.write("insert_in_flight")?
            .in_flight
            .insert(entry.operation_id.to_string(), entry.clone());
        Ok(())
    }

    fn get_all_in_flight(&self) -> Result<Vec<InFlightBroadcast>, NodeError> {
        Ok(self.tables().in_flight.values().cloned().collect())
    }

    fn delete_in_flight(&self, operation_id: Uuid) -> Result<bool, NodeError> {
        Ok(self
            .write("delete_in_flight")?
            .in_flight
            .remove(&operation_id.to_string())
            .is_some())
    }

    fn insert_pending_build(&self, build: &PendingBuild) -> Result<(), NodeError> {
        self.write("insert_pending_build")?
            .builds
            .insert(build.operation_id.to_string(), build.clone());
        Ok(())
    }

    fn get_pending_build(&self, operation_id: Uuid) -> Result<Option<PendingBuild>, NodeError> {
        Ok(self.tables().builds.get(&operation_id.to_string()).cloned())
    }

    fn delete_pending_build(&self, operation_id: Uuid) -> Result<bool, NodeError> {
        Ok(self
            .write("delete_pending_build")?
            .builds
            .remove(&operation_id.to_string())
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_matches_store_contract() {
        let db = MockDb::new();
        for name in ["a", "b", "c"] {
            db.insert_observed_address(&ObservedAddress::new(name)).unwrap();
        }

        let first = db.get_observed_addresses(2, None).unwrap();
        assert_eq!(first.items.len(), 2);
        let second = db
            .get_observed_addresses(2, first.continuation.as_deref())
            .unwrap();
        assert_eq!(second.items, vec![ObservedAddress::new("c")]);
        assert!(second.is_last());
        assert!(db.get_observed_addresses(0, None).is_err());
    }

    #[test]
    fn test_failing_operation_leaves_table_untouched() {
        let db = MockDb::new();
        db.fail_on("insert_observed_address");

        assert!(db.insert_observed_address(&ObservedAddress::new("a")).is_err());
        assert!(db.get_observed_address("a").unwrap().is_none());
        assert!(db.writes().is_empty());
    }
}
