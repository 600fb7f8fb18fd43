use anyhow::{Context, Result};
use clap::ArgMatches;
use log::{info, warn};
use rnvr::engine::worker_registry::{WorkerRole, WorkerStatus};
use rnvr::Engine;
use std::time::{Duration, Instant};

use crate::operations::op_helper;

pub async fn handle_record_cli(engine: &Engine, args: &ArgMatches) -> Result<()> {
    let op_start_time = Instant::now();
    let duration = Duration::from_secs(args.get_one::<u64>("duration").copied().unwrap_or(60));
    let cameras = op_helper::determine_target_cameras(
        engine,
        args.get_one::<String>("cameras"),
        "Video Recording",
    )?;
    if cameras.is_empty() {
        return Ok(());
    }

    info!("📹 Recording {} camera(s) for {:?}.", cameras.len(), duration);
    let mut started = Vec::new();
    for cam in &cameras {
        if engine.start_recording(cam.id, &cam.source_url).await {
            started.push(cam.id);
        } else {
            warn!("Camera {} is already recording; leaving it alone.", cam.id);
        }
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            warn!("🛑 Ctrl-C received, ending the recording early.");
        }
    }

    let mut failed = 0;
    for camera_id in &started {
        if let Some(snapshot) = engine.worker_status(*camera_id, WorkerRole::Recording).await {
            if snapshot.status == WorkerStatus::Failed {
                failed += 1;
                warn!(
                    "⚠️ Camera {} recording failed: {}",
                    camera_id,
                    snapshot.last_error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        engine.stop_recording(*camera_id).await;
    }

    let since = op_start_time.elapsed();
    let recordings = engine.list_recordings(None, None).await;
    let fresh: Vec<_> = recordings
        .iter()
        .filter(|r| started.contains(&r.camera_id))
        .filter(|r| {
            let age = chrono::Local::now().naive_local() - r.timestamp;
            age.to_std().map(|a| a <= since + Duration::from_secs(2)).unwrap_or(true)
        })
        .collect();
    info!("✅ Recorded {} file(s) in {:?}:", fresh.len(), since);
    for entry in &fresh {
        info!("  -> {}", entry.filepath.display());
    }
    if failed > 0 {
        anyhow::bail!("{} of {} camera recording(s) failed", failed, started.len());
    }
    Ok(())
}
