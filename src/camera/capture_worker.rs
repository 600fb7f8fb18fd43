use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::camera_config::CameraId;
use crate::engine::capture_source::SourceConnector;
use crate::engine::frame_cache::FrameCache;
use crate::engine::source_driver::{pace, RetryPolicy, SourceDriver};
use crate::engine::worker_registry::{WorkerRole, WorkerStatus, WorkerStatusCell};
use crate::errors::AppError;

/// Everything a live-preview capture worker needs, moved into its task.
pub struct CaptureJob {
    pub camera_id: CameraId,
    pub url: String,
    pub connector: Arc<dyn SourceConnector>,
    pub cache: Arc<FrameCache>,
    pub policy: RetryPolicy,
    pub frame_interval: Duration,
    pub jpeg_quality: u8,
}

/// Reads frames, encodes them to JPEG, and publishes each into the frame cache until
/// cancelled or the source is given up on. A failed worker leaves no stale frame behind.
pub async fn run_capture_worker(
    job: CaptureJob,
    cancel: CancellationToken,
    status: WorkerStatusCell,
) {
    let worker_start = Instant::now();
    let camera_id = job.camera_id;
    info!("🎥 [capture {}] Worker started.", camera_id);

    let mut driver = SourceDriver::new(
        camera_id,
        WorkerRole::Capture,
        &job.url,
        job.connector.clone(),
        job.policy.clone(),
        cancel.clone(),
        status.clone(),
    );
    let mut published: u64 = 0;

    let result: Result<(), AppError> = loop {
        let period_start = Instant::now();
        let frame = match driver.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };

        let quality = job.jpeg_quality;
        let encoded = tokio::task::spawn_blocking(move || {
            let captured_at = frame.captured_at;
            frame.encode_jpeg(quality).map(|jpeg| (jpeg, captured_at))
        })
        .await;
        match encoded {
            Ok(Ok((jpeg, captured_at))) => {
                // A stop that lands during encoding must not republish after the cache was cleared.
                if cancel.is_cancelled() {
                    break Ok(());
                }
                let sequence = job.cache.publish(camera_id, jpeg, captured_at).await;
                published += 1;
                if sequence % 300 == 0 {
                    debug!("[capture {}] Published frame #{}", camera_id, sequence);
                }
            }
            Ok(Err(e)) => warn!("⚠️ [capture {}] Dropping frame: {}", camera_id, e),
            Err(join_err) => break Err(join_err.into()),
        }

        if !pace(&cancel, period_start, job.frame_interval).await {
            break Ok(());
        }
    };

    driver.shutdown().await;
    match result {
        Ok(()) => {
            info!(
                "🏁 [capture {}] Worker stopped after {:?}, {} frame(s) published.",
                camera_id, worker_start.elapsed(), published
            );
            status.set_status(WorkerStatus::Idle);
        }
        Err(e) => {
            job.cache.remove(camera_id).await;
            error!(
                "❌ [capture {}] Worker failed after {:?}: {}",
                camera_id,
                worker_start.elapsed(),
                e
            );
            status.fail(&e);
        }
    }
}
