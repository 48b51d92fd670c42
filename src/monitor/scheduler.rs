//! Periodic engine tasks.

use super::Monitor;
use log::info;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Spawn the transition and duration engines on independent timers.
///
/// Both tasks stop when `shutdown` is cancelled. Ticks are serialized by the
/// monitor itself, not by the scheduling.
pub fn spawn_engines(
    monitor: Arc<Monitor>,
    period: Duration,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    info!(
        "[Monitor] Checking sensor every {:?}, long-open threshold {:?}",
        period,
        monitor.max_open_duration()
    );

    let transition_monitor = monitor.clone();
    let transition = spawn_periodic("transition", period, shutdown.clone(), move || {
        transition_monitor.transition_tick();
    });
    let duration = spawn_periodic("open-alert", period, shutdown, move || {
        monitor.duration_tick();
    });
    vec![transition, duration]
}

fn spawn_periodic<F>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("[Monitor] {} engine stopped", name);
                    break;
                }
                _ = interval.tick() => tick(),
            }
        }
    })
}
