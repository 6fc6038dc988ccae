use std::{
    collections::HashSet,
    sync::{Arc, Mutex, atomic::AtomicBool},
};

use db::Db;
use oracle::oracle::Oracle;
use uuid::Uuid;

use crate::handlers::balance::BalanceReconciler;

pub mod handler;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub checked: usize,
    pub completed: usize,
    /// Index entries dropped because their record is gone or already resolved.
    pub removed: usize,
    pub failed: usize,
    pub skipped: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexRebuild {
    pub restored: usize,
    pub removed: usize,
}

/// Submits signed transactions and follows them until they confirm.
#[derive(Clone)]
pub struct BroadcastCoordinator {
    pub db: Arc<dyn Db>,
    pub oracle: Box<dyn Oracle>,
    pub balances: BalanceReconciler,
    pub min_confirmations: u32,
    running: Arc<AtomicBool>,
    /// Operation ids with a broadcast call in progress.
    submitting: Arc<Mutex<HashSet<Uuid>>>,
}

impl BroadcastCoordinator {
    #[must_use]
    pub fn new(
        db: Arc<dyn Db>,
        oracle: Box<dyn Oracle>,
        balances: BalanceReconciler,
        min_confirmations: u32,
    ) -> Self {
        Self {
            db,
            oracle,
            balances,
            min_confirmations,
            running: Arc::new(AtomicBool::new(false)),
            submitting: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}
