use bitcoin::Amount;
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastState {
    /// Accepted by the provider, waiting for confirmations.
    Broadcasted,
    /// Reached the confirmation threshold.
    Completed,
    /// Rejected at submission time. Terminal.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastRecord {
    pub operation_id: Uuid,
    pub state: BroadcastState,
    pub hash: String,
    #[serde(with = "bitcoin::amount::serde::as_sat::opt")]
    pub amount: Option<Amount>,
    #[serde(with = "bitcoin::amount::serde::as_sat::opt")]
    pub fee: Option<Amount>,
    pub error: Option<String>,
    pub block: Option<u64>,
    pub broadcasted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl BroadcastRecord {
    #[must_use]
    pub fn broadcasted(operation_id: Uuid, hash: String, block: u64) -> Self {
        Self {
            operation_id,
            state: BroadcastState::Broadcasted,
            hash,
            amount: None,
            fee: None,
            error: None,
            block: Some(block),
            broadcasted_at: Some(Utc::now()),
            completed_at: None,
            failed_at: None,
        }
    }

    #[must_use]
    pub fn failed(operation_id: Uuid, hash: String, error: String, block: u64) -> Self {
        Self {
            operation_id,
            state: BroadcastState::Failed,
            hash,
            amount: None,
            fee: None,
            error: Some(error),
            block: Some(block),
            broadcasted_at: None,
            completed_at: None,
            failed_at: Some(Utc::now()),
        }
    }

    /// Moves a `Broadcasted` record to `Completed`. Returns `false` and leaves the
    /// record untouched for any other state.
    pub fn complete(&mut self, amount: Amount, fee: Amount, block: u64) -> bool {
        if self.state != BroadcastState::Broadcasted {
            return false;
        }
        self.state = BroadcastState::Completed;
        self.amount = Some(amount);
        self.fee = Some(fee);
        self.block = Some(block);
        self.completed_at = Some(Utc::now());
        true
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.state, BroadcastState::Broadcasted)
    }

    /// Time of the latest state transition.
    #[must_use]
    pub const fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.state {
            BroadcastState::Broadcasted => self.broadcasted_at,
            BroadcastState::Completed => self.completed_at,
            BroadcastState::Failed => self.failed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightBroadcast {
    pub operation_id: Uuid,
    pub hash: String,
}

impl From<&BroadcastRecord> for InFlightBroadcast {
    fn from(record: &BroadcastRecord) -> Self {
        Self {
            operation_id: record.operation_id,
            hash: record.hash.clone(),
        }
    }
}
