use std::sync::{Arc, Mutex, atomic::AtomicBool};

use bitcoin::Network;
use db::Db;
use oracle::oracle::Oracle;

pub mod handler;

/// Outcome of one sweep over the observed addresses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub refreshed: usize,
    pub failed: usize,
    /// Another sweep was already running.
    pub skipped: bool,
}

/// Keeps the positive balance cache of observed addresses in line with the chain.
#[derive(Clone)]
pub struct BalanceReconciler {
    pub db: Arc<dyn Db>,
    pub oracle: Box<dyn Oracle>,
    pub network: Network,
    pub min_confirmations: u32,
    pub page_size: usize,
    running: Arc<AtomicBool>,
    cache: Arc<Mutex<()>>,
}

impl BalanceReconciler {
    #[must_use]
    pub fn new(
        db: Arc<dyn Db>,
        oracle: Box<dyn Oracle>,
        network: Network,
        min_confirmations: u32,
        page_size: usize,
    ) -> Self {
        Self {
            db,
            oracle,
            network,
            min_confirmations,
            page_size,
            running: Arc::new(AtomicBool::new(false)),
            cache: Arc::new(Mutex::new(())),
        }
    }
}
