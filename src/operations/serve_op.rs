use anyhow::{Context, Result};
use clap::ArgMatches;
use log::{debug, info, warn};
use rnvr::config_loader::MasterConfig;
use rnvr::Engine;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::operations::op_helper;

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Long-running mode: record (and by default live-capture) the selected cameras until
/// Ctrl-C, with a periodic retention sweep.
pub async fn handle_run_cli(
    master_config: &MasterConfig,
    engine: &Engine,
    args: &ArgMatches,
) -> Result<()> {
    let run_start = Instant::now();
    let with_preview = !args.get_flag("no-preview");
    let cameras =
        op_helper::determine_target_cameras(engine, args.get_one::<String>("cameras"), "Run")?;

    for cam in &cameras {
        if !engine.start_recording(cam.id, &cam.source_url).await {
            warn!("Camera {} ('{}') was already recording.", cam.id, cam.name);
        }
        if with_preview && !engine.start_stream(cam.id, &cam.source_url).await {
            warn!("Camera {} ('{}') was already streaming.", cam.id, cam.name);
        }
    }

    let app_settings = &master_config.app_settings;
    let sweeper_cancel = CancellationToken::new();
    let sweeper = engine.spawn_retention_sweeper(
        app_settings.retention_days,
        Duration::from_secs(app_settings.cleanup_interval_secs.max(1)),
        sweeper_cancel.clone(),
    );

    info!("🟢 Running {} camera(s). Press Ctrl-C to stop.", cameras.len());
    let mut status_tick = tokio::time::interval(STATUS_LOG_INTERVAL);
    status_tick.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("🛑 Ctrl-C received, stopping all workers...");
                break;
            }
            _ = status_tick.tick() => {
                let workers = engine.active_workers().await;
                info!(
                    "📊 {} worker(s) registered, {} live frame(s) cached, up {:?}.",
                    workers.len(), engine.cached_frame_count().await, run_start.elapsed()
                );
                for ((camera_id, role), snapshot) in workers {
                    debug!(
                        "  [{} {}] {:?} (retries: {})",
                        role, camera_id, snapshot.status, snapshot.retry_count
                    );
                }
            }
        }
    }

    sweeper_cancel.cancel();
    if let Err(e) = sweeper.await {
        warn!("Retention sweeper ended abnormally: {}", e);
    }
    let stopped = engine.shutdown().await;
    info!("🏁 Run finished after {:?}; {} worker(s) stopped.", run_start.elapsed(), stopped);
    Ok(())
}
