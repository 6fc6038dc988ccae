use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    /// Number of decimal places of the base unit.
    pub accuracy: u8,
}

impl Asset {
    pub const ACCURACY: u8 = 8;

    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            accuracy: Self::ACCURACY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub is_transactions_rebuilding_supported: bool,
    pub is_batched_transactions_supported: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            is_transactions_rebuilding_supported: false,
            is_batched_transactions_supported: false,
        }
    }
}
