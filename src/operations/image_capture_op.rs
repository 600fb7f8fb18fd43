use anyhow::{Context, Result};
use clap::ArgMatches;
use futures::future::join_all;
use log::{error, info, warn};
use rnvr::camera_config::CameraConfig;
use rnvr::common::file_utils;
use rnvr::common::timestamp_utils::RECORDING_TIMESTAMP_FORMAT;
use rnvr::config_loader::MasterConfig;
use rnvr::engine::worker_registry::{WorkerRole, WorkerStatus};
use rnvr::Engine;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::operations::op_helper;

const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Starts live capture on each camera, saves its first cached frame, and stops it again.
pub async fn handle_snapshot_cli(
    master_config: &MasterConfig,
    engine: &Engine,
    args: &ArgMatches,
) -> Result<()> {
    let op_start_time = Instant::now();
    let timeout = Duration::from_secs(args.get_one::<u64>("timeout").copied().unwrap_or(30));
    let cameras =
        op_helper::determine_target_cameras(engine, args.get_one::<String>("cameras"), "Snapshot")?;
    if cameras.is_empty() {
        return Ok(());
    }
    let output_dir = op_helper::determine_operation_output_dir(
        master_config,
        args,
        "output",
        Some("snapshots"),
        "Snapshot",
    )?;

    let snapshots = cameras.iter().map(|cam| snapshot_one(engine, cam, &output_dir, timeout));
    let results = join_all(snapshots).await;
    let mut saved = 0;
    for (cam, result) in cameras.iter().zip(results) {
        match result {
            Ok(path) => {
                saved += 1;
                info!(
                    "✅ Snapshot for camera {} ('{}') saved to {}",
                    cam.id,
                    cam.name,
                    path.display()
                );
            }
            Err(e) => error!("❌ Snapshot for camera {} ('{}') failed: {:#}", cam.id, cam.name, e),
        }
    }
    info!("📸 Saved {}/{} snapshot(s) in {:?}.", saved, cameras.len(), op_start_time.elapsed());
    if saved == 0 {
        anyhow::bail!("no snapshot could be taken");
    }
    Ok(())
}

async fn snapshot_one(
    engine: &Engine,
    cam: &CameraConfig,
    output_dir: &Path,
    timeout: Duration,
) -> Result<PathBuf> {
    let started_here = engine.start_stream(cam.id, &cam.source_url).await;
    let waited = wait_for_frame(engine, cam, timeout).await;
    if started_here {
        engine.stop_stream(cam.id).await;
    }
    let jpeg = waited?;

    let filename = file_utils::generate_timestamped_filename(
        &format!("snapshot_{}", cam.id),
        RECORDING_TIMESTAMP_FORMAT,
        "jpg",
    );
    let path = output_dir.join(filename);
    tokio::fs::write(&path, &jpeg)
        .await
        .with_context(|| format!("Failed to write snapshot to {}", path.display()))?;
    Ok(path)
}

async fn wait_for_frame(
    engine: &Engine,
    cam: &CameraConfig,
    timeout: Duration,
) -> Result<bytes::Bytes> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(entry) = engine.get_frame(cam.id).await {
            return Ok(entry.data.clone());
        }
        if let Some(snapshot) = engine.worker_status(cam.id, WorkerRole::Capture).await {
            if snapshot.status == WorkerStatus::Failed {
                anyhow::bail!("capture failed: {}", snapshot.last_error.unwrap_or_default());
            }
        }
        if Instant::now() >= deadline {
            warn!("⌛ Camera {} produced no frame within {:?}", cam.id, timeout);
            anyhow::bail!("no frame within {:?}", timeout);
        }
        tokio::time::sleep(FRAME_POLL_INTERVAL).await;
    }
}
