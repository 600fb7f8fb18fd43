use anyhow::{Context, Result};
use clap::ArgMatches;
use futures::StreamExt;
use log::info;
use rnvr::camera::preview::preview_content_type;
use rnvr::common::file_utils;
use rnvr::common::timestamp_utils::RECORDING_TIMESTAMP_FORMAT;
use rnvr::Engine;
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::AsyncWriteExt;

/// Drains a fixed number of live preview parts into a file.
pub async fn handle_preview_cli(engine: &Engine, args: &ArgMatches) -> Result<()> {
    let op_start_time = Instant::now();
    let camera_id = *args.get_one::<u32>("camera").context("--camera is required")?;
    let parts = args.get_one::<usize>("parts").copied().unwrap_or(30);
    let output_path = match args.get_one::<String>("output") {
        Some(p) => PathBuf::from(p),
        None => engine.storage_dir().join(file_utils::generate_timestamped_filename(
            &format!("preview_{}", camera_id),
            RECORDING_TIMESTAMP_FORMAT,
            "mjpeg",
        )),
    };

    let started_here = engine.start_stream_camera(camera_id).await?;
    info!(
        "👀 Writing {} preview part(s) of camera {} ({}) to {}",
        parts,
        camera_id,
        preview_content_type(),
        output_path.display()
    );

    let result = async {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut out = tokio::fs::File::create(&output_path)
            .await
            .with_context(|| format!("Failed to create {}", output_path.display()))?;
        let mut preview = Box::pin(engine.preview_while_capturing(camera_id).await?.take(parts));
        let mut written = 0usize;
        while let Some(part) = preview.next().await {
            let part = part.with_context(|| {
                format!("Preview of camera {} stopped after {} part(s)", camera_id, written)
            })?;
            out.write_all(&part).await?;
            written += 1;
        }
        out.flush().await?;
        Ok::<usize, anyhow::Error>(written)
    }
    .await;

    if started_here {
        engine.stop_stream(camera_id).await;
    }
    let written = result?;
    info!("✅ Wrote {} preview part(s) in {:?}.", written, op_start_time.elapsed());
    Ok(())
}
