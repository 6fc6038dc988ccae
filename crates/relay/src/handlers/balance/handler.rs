use std::{
    collections::HashSet,
    sync::{MutexGuard, PoisonError},
};

use bitcoin::Amount;
use tracing::{debug, info, warn};
use types::{
    balance::{ObservedAddress, PositiveBalance},
    errors::NodeError,
    page::Page,
};

use crate::{
    handlers::{
        CycleGuard,
        balance::{BalanceReconciler, SweepSummary},
    },
    wallet::parse_address,
};

impl BalanceReconciler {
    fn canonical(&self, address: &str) -> Result<String, NodeError> {
        Ok(parse_address(address, self.network)?.to_string())
    }

    /// Serializes cache writes of cycles against `unregister`.
    fn cache_lock(&self) -> MutexGuard<'_, ()> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-reads the confirmed balance of `address` and updates its cache entry.
    ///
    /// A zero balance only deletes the entry when `delete_zero_hint` says one is
    /// believed to exist.
    pub async fn refresh_address(
        &self,
        address: &str,
        delete_zero_hint: bool,
    ) -> Result<Amount, NodeError> {
        self.refresh(address, delete_zero_hint, false).await
    }

    /// Refresh on behalf of a periodic cycle. Nothing is written for an address
    /// that stopped being observed while the provider was queried.
    pub(crate) async fn refresh_observed(
        &self,
        address: &str,
        delete_zero_hint: bool,
    ) -> Result<Amount, NodeError> {
        self.refresh(address, delete_zero_hint, true).await
    }

    async fn refresh(
        &self,
        address: &str,
        delete_zero_hint: bool,
        observed_only: bool,
    ) -> Result<Amount, NodeError> {
        let parsed = parse_address(address, self.network)?;
        let address = parsed.to_string();

        let balance = self
            .oracle
            .get_balance(&parsed, self.min_confirmations)
            .await?;
        metrics::counter!("relay_balance_refreshes_total").increment(1);

        if balance > Amount::ZERO {
            if self.db.get_positive_balance(&address)?.map(|c| c.amount) == Some(balance) {
                return Ok(balance);
            }
            let as_of_block = self.oracle.get_latest_block_height().await?;

            let _cache = self.cache_lock();
            if observed_only && self.db.get_observed_address(&address)?.is_none() {
                debug!("{address} was unobserved during refresh, not caching its balance");
                return Ok(balance);
            }
            self.db.upsert_positive_balance(&PositiveBalance {
                address: address.clone(),
                amount: balance,
                as_of_block,
            })?;
            debug!("Balance of {address} is now {balance} at block {as_of_block}");
        } else if delete_zero_hint && self.db.delete_positive_balance(&address)? {
            metrics::counter!("relay_positive_balances_deleted_total").increment(1);
            info!("Balance of {address} dropped to zero");
        }

        Ok(balance)
    }

    /// Refreshes every observed address, page by page. Failures for one address are
    /// logged and do not stop the sweep.
    pub async fn sweep_all(&self) -> Result<SweepSummary, NodeError> {
        let Some(_guard) = CycleGuard::try_acquire(&self.running) else {
            debug!("Balance sweep already running, skipping");
            return Ok(SweepSummary {
                skipped: true,
                ..SweepSummary::default()
            });
        };

        let positive: HashSet<String> = self
            .db
            .get_all_positive_balances()?
            .into_iter()
            .map(|b| b.address)
            .collect();

        let mut summary = SweepSummary::default();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .db
                .get_observed_addresses(self.page_size, continuation.as_deref())?;

            for observed in page.items {
                let hint = positive.contains(&observed.address);
                match self.refresh_observed(&observed.address, hint).await {
                    Ok(_) => summary.refreshed += 1,
                    Err(e) => {
                        warn!("Failed to refresh balance of {}: {e}", observed.address);
                        summary.failed += 1;
                    }
                }
            }

            match page.continuation {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        info!(
            "Balance sweep finished: {} refreshed, {} failed",
            summary.refreshed, summary.failed
        );
        Ok(summary)
    }

    /// Caches `amount` for an observed address that has no entry yet. Returns
    /// whether an entry was written.
    pub fn seed_balance(
        &self,
        address: &str,
        amount: Amount,
        as_of_block: u64,
    ) -> Result<bool, NodeError> {
        let address = self.canonical(address)?;
        let _cache = self.cache_lock();
        if amount == Amount::ZERO
            || self.db.get_observed_address(&address)?.is_none()
            || self.db.get_positive_balance(&address)?.is_some()
        {
            return Ok(false);
        }

        self.db.upsert_positive_balance(&PositiveBalance {
            address,
            amount,
            as_of_block,
        })?;
        Ok(true)
    }

    pub fn register(&self, address: &str) -> Result<(), NodeError> {
        let address = self.canonical(address)?;
        if self.db.get_observed_address(&address)?.is_some() {
            return Err(NodeError::Conflict(format!(
                "{address} is already observed"
            )));
        }

        self.db
            .insert_observed_address(&ObservedAddress::new(address.clone()))?;
        info!("Observing {address}");
        Ok(())
    }

    /// Removes the cache entry before the observation so that a crash in between
    /// never leaves a balance for an address nobody observes.
    pub fn unregister(&self, address: &str) -> Result<bool, NodeError> {
        let address = self.canonical(address)?;
        if self.db.get_observed_address(&address)?.is_none() {
            return Ok(false);
        }

        let _cache = self.cache_lock();
        self.db.delete_positive_balance(&address)?;
        self.db.delete_observed_address(&address)?;
        info!("Stopped observing {address}");
        Ok(true)
    }

    pub fn is_observed(&self, address: &str) -> Result<bool, NodeError> {
        let address = self.canonical(address)?;
        Ok(self.db.get_observed_address(&address)?.is_some())
    }

    /// Whether a cache entry currently exists for `address`.
    pub fn has_positive_balance(&self, address: &str) -> Result<bool, NodeError> {
        let address = self.canonical(address)?;
        Ok(self.db.get_positive_balance(&address)?.is_some())
    }

    pub fn list_positive_balances(
        &self,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<Page<PositiveBalance>, NodeError> {
        self.db.get_positive_balances(page_size, continuation)
    }
}
