use serde::{Deserialize, Serialize};

/// One page of a keyed table. `continuation` is `None` on the last page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub continuation: Option<String>,
}

impl<T> Page<T> {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            continuation: None,
        }
    }

    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.continuation.is_none()
    }
}
