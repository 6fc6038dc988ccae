use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Signable context produced for an operation id, replayed verbatim on retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBuild {
    pub operation_id: Uuid,
    pub transaction_context: String,
}
