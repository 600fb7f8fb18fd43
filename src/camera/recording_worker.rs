use chrono::{Local, NaiveDateTime, Timelike};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::camera::frame_writer::{FrameWriter, FrameWriterFactory};
use crate::camera_config::CameraId;
use crate::common::file_utils;
use crate::engine::capture_source::SourceConnector;
use crate::engine::source_driver::{pace, sleep_or_cancel, RetryPolicy, SourceDriver};
use crate::engine::worker_registry::{WorkerRole, WorkerStatus, WorkerStatusCell};
use crate::errors::AppError;

/// Attempts at finding a file name that is not already taken.
const MAX_NAME_ATTEMPTS: u32 = 3;

/// Everything a recording worker needs, moved into its task.
pub struct RecordingJob {
    pub camera_id: CameraId,
    pub url: String,
    pub connector: Arc<dyn SourceConnector>,
    pub writers: Arc<dyn FrameWriterFactory>,
    pub storage_dir: PathBuf,
    pub policy: RetryPolicy,
    pub frame_interval: Duration,
}

/// One recording file in progress.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub camera_id: CameraId,
    pub file_path: PathBuf,
    pub started_at: NaiveDateTime,
    pub frames_written: u64,
}

/// Records one camera into a single file until cancelled or the source is given up on.
/// Reconnects keep appending to the same file. The terminal status is set last, after
/// the file is closed.
pub async fn run_recording_worker(
    job: RecordingJob,
    cancel: CancellationToken,
    status: WorkerStatusCell,
) {
    let worker_start = Instant::now();
    let camera_id = job.camera_id;
    info!("📹 [recording {}] Worker started.", camera_id);

    let mut driver = SourceDriver::new(
        camera_id,
        WorkerRole::Recording,
        &job.url,
        job.connector.clone(),
        job.policy.clone(),
        cancel.clone(),
        status.clone(),
    );
    let result = record(&job, &mut driver, &cancel).await;
    driver.shutdown().await;

    match result {
        Ok(Some(session)) => {
            info!(
                "🏁 [recording {}] Finished {} after {:?}: {} frame(s).",
                camera_id,
                session.file_path.display(),
                worker_start.elapsed(),
                session.frames_written
            );
            status.set_status(WorkerStatus::Idle);
        }
        Ok(None) => {
            info!(
                "🏁 [recording {}] Stopped before the first frame; no file written.",
                camera_id
            );
            status.set_status(WorkerStatus::Idle);
        }
        Err(e) => {
            error!(
                "❌ [recording {}] Worker failed after {:?}: {}",
                camera_id,
                worker_start.elapsed(),
                e
            );
            status.fail(&e);
        }
    }
}

async fn record(
    job: &RecordingJob,
    driver: &mut SourceDriver,
    cancel: &CancellationToken,
) -> Result<Option<RecordingSession>, AppError> {
    let camera_id = job.camera_id;
    let Some(first_frame) = driver.next_frame().await? else {
        return Ok(None);
    };

    tokio::fs::create_dir_all(&job.storage_dir).await?;
    let extension = job.writers.extension();
    let Some((file_path, started_at)) =
        next_free_recording_path(&job.storage_dir, camera_id, extension, cancel).await?
    else {
        return Ok(None);
    };

    let writers = job.writers.clone();
    let create_path = file_path.clone();
    let (created, first_frame) = tokio::task::spawn_blocking(move || {
        let created = writers.create(camera_id, &create_path, &first_frame);
        (created, first_frame)
    })
    .await?;
    let mut writer: Box<dyn FrameWriter> = created?;
    info!(
        "🎬 [recording {}] Recording {}x{} to {}",
        camera_id, first_frame.width, first_frame.height, writer.path().display()
    );

    let mut session = RecordingSession { camera_id, file_path, started_at, frames_written: 0 };
    let mut pending = Some(first_frame);
    let loop_result: Result<(), AppError> = loop {
        let period_start = Instant::now();
        let frame = match pending.take() {
            Some(frame) => frame,
            None => match driver.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            },
        };

        let (returned, written) = match tokio::task::spawn_blocking(move || {
            let mut writer = writer;
            let written = writer.write_frame(&frame);
            (writer, written)
        })
        .await
        {
            Ok(pair) => pair,
            // The writer went down with the panicked task and closed its file on drop.
            Err(join_err) => return Err(join_err.into()),
        };
        writer = returned;
        if let Err(e) = written {
            break Err(e);
        }
        session.frames_written += 1;
        if session.frames_written % 500 == 0 {
            debug!("[recording {}] {} frame(s) written", camera_id, session.frames_written);
        }

        if !pace(cancel, period_start, job.frame_interval).await {
            break Ok(());
        }
    };

    let finished = tokio::task::spawn_blocking(move || writer.finish()).await?;
    if session.frames_written == 0 {
        discard_empty_recording(&session.file_path).await;
    }
    loop_result?;
    finished?;
    Ok(Some(session))
}

/// A path for a new recording that does not exist yet. Two sessions of one camera in
/// the same second would share a name, so a taken name waits for the next second.
/// `Ok(None)` means cancelled while waiting.
async fn next_free_recording_path(
    dir: &Path,
    camera_id: CameraId,
    extension: &str,
    cancel: &CancellationToken,
) -> Result<Option<(PathBuf, NaiveDateTime)>, AppError> {
    for _ in 0..MAX_NAME_ATTEMPTS {
        let started_at = Local::now().naive_local();
        let path = dir.join(file_utils::recording_file_name(camera_id, &started_at, extension));
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Some((path, started_at)));
        }
        debug!(
            "[recording {}] {} is taken; waiting for the next second.",
            camera_id,
            path.display()
        );
        let into_second = Duration::from_nanos(u64::from(started_at.nanosecond() % 1_000_000_000));
        let wait = Duration::from_secs(1).saturating_sub(into_second) + Duration::from_millis(10);
        if !sleep_or_cancel(cancel, wait).await {
            return Ok(None);
        }
    }
    Err(AppError::Write {
        camera_id,
        details: format!("no free recording file name in {}", dir.display()),
    })
}

async fn discard_empty_recording(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed empty recording {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove empty recording {}: {}", path.display(), e),
    }
}
