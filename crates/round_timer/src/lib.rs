use std::{future::Future, time::Duration};

use tokio::{
    runtime::Handle,
    sync::broadcast,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info};

/// Runs `task` every `tick_interval` until a shutdown signal arrives.
///
/// A cycle runs to completion inside the timer loop, so cycles of one timer never
/// overlap. Ticks missed while a cycle is running are skipped. Shutdown is only
/// observed between cycles.
pub fn start_round_timer<F, Fut>(
    name: &'static str,
    tick_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
    mut task: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    Handle::current().spawn(async move {
        let mut ticker = interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Starting {name} timer every {}ms", tick_interval.as_millis());

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Stopping {name} timer");
                    break;
                }
                _ = ticker.tick() => {
                    debug!("{name} cycle started");
                    task().await;
                    metrics::counter!("relay_timer_cycles_total", "timer" => name).increment(1);
                }
            }
        }
    })
}
