use anyhow::Result;
use homestats::*;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let periods = Arc::new(app_config.period_table()?);
    let metrics = app_config.metric_queries(&periods)?;
    let service_config = app_config.service_config()?;

    let store = Arc::new(
        store::SqliteStore::connect(&app_config.database.path, app_config.database.max_pool_size)
            .await?,
    );
    store.init().await?;

    let publisher = sink::SnapshotPublisher::new(app_config.stats.broadcast_capacity);
    let (writer_shutdown_tx, writer_shutdown_rx) = tokio::sync::oneshot::channel();
    let writer_handle = app_config.stats.persist_snapshots.then(|| {
        worker::spawn_snapshot_writer(publisher.subscribe(), store.clone(), writer_shutdown_rx)
    });

    let service = Arc::new(service::EnergyStatsService::new(
        store.clone(),
        periods.clone(),
        metrics,
        service_config,
        publisher.clone(),
    )?);
    tracing::info!(
        periods = periods.len(),
        pairs = service.pair_count(),
        timezone = %service_config.tz,
        "stats engine configured"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let worker_handle = worker::spawn(
        service.clone(),
        worker::CycleWorkerConfig {
            cycle_interval_secs: app_config.stats.cycle_interval_secs,
            cycle_schedule: app_config.stats.cycle_schedule.clone(),
            tz: service_config.tz,
        },
        shutdown_rx,
    );

    let app = routes::app(publisher, periods, Arc::new(AtomicUsize::new(0)));
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            let _ = worker_handle.await;
            let _ = writer_shutdown_tx.send(());
            if let Some(handle) = writer_handle {
                let _ = handle.await;
            }
        }
    }

    Ok(())
}
