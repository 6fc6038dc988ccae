use std::time::Duration;

use round_timer::start_round_timer;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::error;

use crate::RelayService;

pub trait RoundTimerControl {
    fn launch_balance_timer(
        &self,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()>;

    fn launch_broadcast_timer(
        &self,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()>;
}

impl RoundTimerControl for RelayService {
    fn launch_balance_timer(
        &self,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let balances = self.balances.clone();
        start_round_timer("balance", interval, shutdown, move || {
            let balances = balances.clone();
            async move {
                if let Err(e) = balances.sweep_all().await {
                    error!("Balance sweep failed: {e}");
                }
            }
        })
    }

    fn launch_broadcast_timer(
        &self,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let broadcasts = self.broadcasts.clone();
        start_round_timer("broadcast", interval, shutdown, move || {
            let broadcasts = broadcasts.clone();
            async move {
                if let Err(e) = broadcasts.reconcile().await {
                    error!("Broadcast reconciliation failed: {e}");
                }
            }
        })
    }
}
