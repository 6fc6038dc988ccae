use rocksdb::{ColumnFamily, DB, Direction, IteratorMode};
use serde::{Serialize, de::DeserializeOwned};
use std::{path::Path, sync::Arc};
use tracing::debug;
use uuid::Uuid;

use crate::Db;
use types::{
    balance::{ObservedAddress, PositiveBalance},
    broadcast::{BroadcastRecord, InFlightBroadcast},
    errors::NodeError,
    page::Page,
    pending_build::PendingBuild,
};

pub const OBSERVED_ADDRESSES: &str = "observed_addresses";
pub const POSITIVE_BALANCES: &str = "positive_balances";
pub const BROADCASTS: &str = "broadcasts";
pub const BROADCASTS_IN_PROGRESS: &str = "broadcasts_in_progress";
pub const BUILDS: &str = "builds";

const COLUMN_FAMILIES: [&str; 5] = [
    OBSERVED_ADDRESSES,
    POSITIVE_BALANCES,
    BROADCASTS,
    BROADCASTS_IN_PROGRESS,
    BUILDS,
];

#[derive(Clone)]
pub struct RocksDb {
    pub db: Arc<DB>,
}

impl RocksDb {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path.as_ref(), COLUMN_FAMILIES)?;
        debug!("Opened store at {}", path.as_ref().display());

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, NodeError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| NodeError::Storage(format!("Missing column family {name}")))
    }

    fn put<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<(), NodeError> {
        let bytes = encode(value)?;
        self.db.put_cf(self.cf(cf)?, key, bytes)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>, NodeError> {
        self.db
            .get_cf(self.cf(cf)?, key)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn delete(&self, cf: &str, key: &[u8]) -> Result<bool, NodeError> {
        let handle = self.cf(cf)?;
        if self.db.get_pinned_cf(handle, key)?.is_none() {
            return Ok(false);
        }
        self.db.delete_cf(handle, key)?;
        Ok(true)
    }

    fn all<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>, NodeError> {
        let mut items = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_, value) = item?;
            items.push(decode(&value)?);
        }
        Ok(items)
    }

    /// Key-ordered page. The continuation token is the hex of the first key of the next page.
    fn page<T: DeserializeOwned>(
        &self,
        cf: &str,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<Page<T>, NodeError> {
        if page_size == 0 {
            return Err(NodeError::Error("Page size must be positive".to_string()));
        }

        let start = continuation
            .map(|token| {
                hex::decode(token)
                    .map_err(|_| NodeError::Error(format!("Invalid continuation token {token}")))
            })
            .transpose()?;

        let mode = start
            .as_deref()
            .map_or(IteratorMode::Start, |key| IteratorMode::From(key, Direction::Forward));

        let mut items = Vec::with_capacity(page_size);
        let mut continuation = None;
        for item in self.db.iterator_cf(self.cf(cf)?, mode) {
            let (key, value) = item?;
            if items.len() == page_size {
                continuation = Some(hex::encode(key));
                break;
            }
            items.push(decode(&value)?);
        }

        Ok(Page {
            items,
            continuation,
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, NodeError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| NodeError::Storage(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, NodeError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| NodeError::Storage(e.to_string()))?;
    Ok(value)
}

fn id_key(operation_id: Uuid) -> String {
    operation_id.to_string()
}

impl Db for RocksDb {
    fn insert_observed_address(&self, address: &ObservedAddress) -> Result<(), NodeError> {
        self.put(OBSERVED_ADDRESSES, address.address.as_bytes(), address)
    }

    fn get_observed_address(&self, address: &str) -> Result<Option<ObservedAddress>, NodeError> {
        self.get(OBSERVED_ADDRESSES, address.as_bytes())
    }

    fn delete_observed_address(&self, address: &str) -> Result<bool, NodeError> {
        self.delete(OBSERVED_ADDRESSES, address.as_bytes())
    }

    fn get_observed_addresses(
        &self,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<Page<ObservedAddress>, NodeError> {
        self.page(OBSERVED_ADDRESSES, page_size, continuation)
    }

    fn upsert_positive_balance(&self, balance: &PositiveBalance) -> Result<(), NodeError> {
        self.put(POSITIVE_BALANCES, balance.address.as_bytes(), balance)
    }

    fn get_positive_balance(&self, address: &str) -> Result<Option<PositiveBalance>, NodeError> {
        self.get(POSITIVE_BALANCES, address.as_bytes())
    }

    fn delete_positive_balance(&self, address: &str) -> Result<bool, NodeError> {
        self.delete(POSITIVE_BALANCES, address.as_bytes())
    }

    fn get_positive_balances(
        &self,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<Page<PositiveBalance>, NodeError> {
        self.page(POSITIVE_BALANCES, page_size, continuation)
    }

    fn get_all_positive_balances(&self) -> Result<Vec<PositiveBalance>, NodeError> {
        self.all(POSITIVE_BALANCES)
    }

    fn put_broadcast(&self, record: &BroadcastRecord) -> Result<(), NodeError> {
        self.put(BROADCASTS, id_key(record.operation_id).as_bytes(), record)
    }

    fn get_broadcast(&self, operation_id: Uuid) -> Result<Option<BroadcastRecord>, NodeError> {
        self.get(BROADCASTS, id_key(operation_id).as_bytes())
    }

    fn delete_broadcast(&self, operation_id: Uuid) -> Result<bool, NodeError> {
        self.delete(BROADCASTS, id_key(operation_id).as_bytes())
    }

    fn get_all_broadcasts(&self) -> Result<Vec<BroadcastRecord>, NodeError> {
        self.all(BROADCASTS)
    }

    fn insert_in_flight(&self, entry: &InFlightBroadcast) -> Result<(), NodeError> {
        self.put(
            BROADCASTS_IN_PROGRESS,
            id_key(entry.operation_id).as_bytes(),
            entry,
        )
    }

    fn get_all_in_flight(&self) -> Result<Vec<InFlightBroadcast>, NodeError> {
        self.all(BROADCASTS_IN_PROGRESS)
    }

    fn delete_in_flight(&self, operation_id: Uuid) -> Result<bool, NodeError> {
        self.delete(BROADCASTS_IN_PROGRESS, id_key(operation_id).as_bytes())
    }

    fn insert_pending_build(&self, build: &PendingBuild) -> Result<(), NodeError> {
        self.put(BUILDS, id_key(build.operation_id).as_bytes(), build)
    }

    fn get_pending_build(&self, operation_id: Uuid) -> Result<Option<PendingBuild>, NodeError> {
        self.get(BUILDS, id_key(operation_id).as_bytes())
    }

    fn delete_pending_build(&self, operation_id: Uuid) -> Result<bool, NodeError> {
        self.delete(BUILDS, id_key(operation_id).as_bytes())
    }
}
