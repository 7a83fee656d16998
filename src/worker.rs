// Background workers: the cycle trigger (fixed interval or cron in the stats zone)
// and the snapshot writer that persists each published snapshot.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::models::Snapshot;
use crate::service::EnergyStatsService;
use crate::store::{SeriesStore, SqliteStore};

/// Config for the cycle trigger.
#[derive(Debug, Clone)]
pub struct CycleWorkerConfig {
    pub cycle_interval_secs: u64,
    /// Optional cron expression (e.g. "0 */5 * * * *"). Evaluated in `tz`.
    pub cycle_schedule: Option<String>,
    pub tz: Tz,
}

/// Spawns the cycle worker. Runs until `shutdown_rx` fires or its sender is dropped.
pub fn spawn<S: SeriesStore + 'static>(
    service: Arc<EnergyStatsService<S>>,
    config: CycleWorkerConfig,
    shutdown_rx: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(service, config, shutdown_rx).await;
    })
}

#[instrument(skip(service, shutdown_rx), fields(interval_secs = config.cycle_interval_secs))]
async fn run<S: SeriesStore + 'static>(
    service: Arc<EnergyStatsService<S>>,
    config: CycleWorkerConfig,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
    let scheduler = tokio::spawn(cycle_scheduler(config, trigger_tx));

    let mut cycles_total: u64 = 0;
    loop {
        tokio::select! {
            trigger = trigger_rx.recv() => {
                if trigger.is_none() {
                    warn!("cycle scheduler stopped; no further cycles");
                    break;
                }
                service.run_cycle(Utc::now()).await;
                cycles_total += 1;
            }
            _ = &mut shutdown_rx => {
                debug!(cycles_total, "Cycle worker shutting down");
                break;
            }
        }
    }
    scheduler.abort();
}

/// Sends a trigger at each cycle time (cron or fixed interval; the first interval tick is immediate).
async fn cycle_scheduler(config: CycleWorkerConfig, tx: mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.cycle_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid cycle_schedule; no cycles will run");
            return;
        };
        loop {
            let now = Utc::now().with_timezone(&config.tz);
            let next = schedule.after(&now).next();
            if let Some(next) = next {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let mut tick = tokio::time::interval(Duration::from_secs(config.cycle_interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}

/// Spawns the task that persists every broadcast snapshot to `store`.
/// On shutdown, saves snapshots already queued and exits; also exits when the channel closes.
pub fn spawn_snapshot_writer(
    mut rx: broadcast::Receiver<Arc<Snapshot>>,
    store: Arc<SqliteStore>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut saved_total: u64 = 0;
        loop {
            tokio::select! {
                result = rx.recv() => match result {
                    Ok(snapshot) => {
                        if save(&store, &snapshot).await {
                            saved_total += 1;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("snapshot writer lagged, skipped {} snapshots", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = &mut shutdown_rx => {
                    while let Ok(snapshot) = rx.try_recv() {
                        if save(&store, &snapshot).await {
                            saved_total += 1;
                        }
                    }
                    break;
                }
            }
        }
        info!(saved_total, "Snapshot writer shutting down");
    })
}

async fn save(store: &SqliteStore, snapshot: &Snapshot) -> bool {
    match store.save_snapshot(snapshot).await {
        Ok(()) => {
            debug!(
                operation = "save_snapshot",
                entries = snapshot.entries.len(),
                "Snapshot saved"
            );
            true
        }
        Err(e) => {
            warn!(error = %e, "snapshot writer: save_snapshot failed");
            false
        }
    }
}
