mod common;

use common::{engine_with, engine_with_writers, Behavior, FakeCameras, RefusingWriters};
use futures::StreamExt;
use rnvr::engine::worker_registry::{WorkerRole, WorkerStatus};
use rnvr::errors::AppError;
use rnvr::Engine;
use std::fs::File;
use std::time::{Duration, Instant, SystemTime};

async fn wait_for_status(engine: &Engine, camera_id: u32, role: WorkerRole, wanted: WorkerStatus) {
    let mut rx = engine.watch_worker(camera_id, role).await.expect("worker slot exists");
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.status == wanted))
        .await
        .expect("status not reached in time")
        .expect("status channel closed");
}

#[tokio::test]
async fn second_start_recording_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(FakeCameras::new(Behavior::Streaming), dir.path());

    assert!(engine.start_recording(1, "fake://cam1").await);
    assert!(!engine.start_recording(1, "fake://cam1").await);
    assert_eq!(engine.active_workers().await.len(), 1);

    assert!(engine.stop_recording(1).await);
    assert!(!engine.stop_recording(1).await);
}

#[tokio::test]
async fn stop_recording_without_session_is_false() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(FakeCameras::new(Behavior::Streaming), dir.path());
    assert!(!engine.stop_recording(3).await);
    assert!(engine.active_workers().await.is_empty());
    assert!(engine.list_recordings(None, None).await.is_empty());
}

#[tokio::test]
async fn recording_lands_in_the_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(FakeCameras::new(Behavior::Streaming), dir.path());

    assert!(engine.start_recording(1, "fake://cam1").await);
    assert!(engine.start_recording(2, "fake://cam2").await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(engine.stop_recording(1).await);
    assert!(engine.stop_recording(2).await);

    let all = engine.list_recordings(None, None).await;
    assert_eq!(all.len(), 2);
    let cam1 = engine.list_recordings(Some(1), None).await;
    assert_eq!(cam1.len(), 1);
    let entry = &cam1[0];
    assert_eq!(entry.camera_id, 1);
    assert!(entry.filename.starts_with("camera_1_"));
    let today = chrono::Local::now().date_naive();
    assert_eq!(engine.list_recordings(Some(1), Some(today)).await.len(), 1);
    let contents = std::fs::read(&entry.filepath).unwrap();
    assert!(contents.starts_with(b"cam1-frame1;cam1-frame2;"));
}

#[tokio::test]
async fn unreachable_camera_fails_and_restart_repeats_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let cameras = FakeCameras::new(Behavior::Unreachable);
    let engine = engine_with(cameras.clone(), dir.path());

    let started = Instant::now();
    assert!(engine.start_recording(5, "fake://cam5").await);
    wait_for_status(&engine, 5, WorkerRole::Recording, WorkerStatus::Failed).await;
    assert!(
        started.elapsed() >= Duration::from_millis(100),
        "two backoffs precede the final failure"
    );
    assert_eq!(cameras.opens(), 3);

    let snapshot = engine.worker_status(5, WorkerRole::Recording).await.unwrap();
    assert_eq!(snapshot.retry_count, 3);
    assert!(snapshot.last_error.unwrap().contains("connection refused"));

    // No further attempts once failed.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cameras.opens(), 3);

    assert!(engine.start_recording(5, "fake://cam5").await);
    wait_for_status(&engine, 5, WorkerRole::Recording, WorkerStatus::Failed).await;
    assert_eq!(cameras.opens(), 6);
    assert!(engine.list_recordings(Some(5), None).await.is_empty());
}

#[tokio::test]
async fn stream_feeds_the_cache_and_stop_clears_it() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(FakeCameras::new(Behavior::Streaming), dir.path());

    assert!(engine.start_stream(2, "fake://cam2").await);
    assert!(!engine.start_stream(2, "fake://cam2").await);
    let mut frame = None;
    for _ in 0..200 {
        frame = engine.get_frame(2).await;
        if frame.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let frame = frame.expect("no frame cached");
    assert_eq!(frame.camera_id, 2);
    assert!(frame.data.starts_with(b"cam2-frame"));
    assert_eq!(engine.cached_frame_count().await, 1);

    assert!(engine.stop_stream(2).await);
    assert!(engine.get_frame(2).await.is_none());
    assert_eq!(engine.cached_frame_count().await, 0);
    assert!(!engine.stop_stream(2).await);
}

#[tokio::test]
async fn recording_and_streaming_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let cameras = FakeCameras::new(Behavior::Streaming);
    let engine = engine_with(cameras.clone(), dir.path());

    assert!(engine.start_recording(4, "fake://cam4").await);
    assert!(engine.start_stream(4, "fake://cam4").await);
    wait_for_status(&engine, 4, WorkerRole::Capture, WorkerStatus::Active).await;
    wait_for_status(&engine, 4, WorkerRole::Recording, WorkerStatus::Active).await;
    // Each worker drives its own session.
    assert_eq!(cameras.opens(), 2);

    assert!(engine.stop_stream(4).await);
    assert!(engine.worker_status(4, WorkerRole::Recording).await.is_some());
    assert_eq!(engine.shutdown().await, 1);
    assert!(engine.active_workers().await.is_empty());
}

#[tokio::test]
async fn blocked_read_does_not_hold_the_slot() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(FakeCameras::new(Behavior::Stuck(Duration::from_secs(3))), dir.path());

    assert!(engine.start_stream(3, "fake://cam3").await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stop_start = Instant::now();
    assert!(engine.stop_stream(3).await);
    assert!(stop_start.elapsed() < Duration::from_secs(1));
    assert!(engine.start_stream(3, "fake://cam3").await);
    engine.shutdown().await;
}

#[tokio::test]
async fn preview_emits_framed_parts() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(FakeCameras::new(Behavior::Streaming), dir.path());
    assert!(engine.start_stream(1, "fake://cam1").await);

    let first_three = engine.generate_preview(1).take(3).collect::<Vec<_>>();
    let parts = tokio::time::timeout(Duration::from_secs(5), first_three).await.unwrap();
    assert_eq!(parts.len(), 3);
    for part in &parts {
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\ncam1-frame"));
        assert!(part.ends_with(b";\r\n"));
    }
    engine.stop_stream(1).await;
}

#[tokio::test]
async fn start_by_id_needs_a_configured_camera() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(FakeCameras::new(Behavior::Streaming), dir.path());
    assert!(matches!(engine.start_recording_camera(42).await, Err(AppError::NotFound(_))));
    assert!(engine.start_stream_camera(1).await.unwrap());
    engine.shutdown().await;
}

#[tokio::test]
async fn cleanup_removes_only_expired_recordings() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(FakeCameras::new(Behavior::Streaming), dir.path());
    let day = Duration::from_secs(24 * 60 * 60);
    for (name, age_days) in [
        ("camera_1_20240101_080000.mjpeg", 10u32),
        ("camera_2_20240101_080000.mjpeg", 8),
        ("camera_1_20240201_080000.mjpeg", 2),
    ] {
        let path = dir.path().join(name);
        std::fs::write(&path, b"x").unwrap();
        let when = SystemTime::now() - day * age_days - Duration::from_secs(60);
        File::options().write(true).open(&path).unwrap().set_modified(when).unwrap();
    }

    assert_eq!(engine.cleanup_older_than(7).await, 2);
    let left = engine.list_recordings(None, None).await;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].filename, "camera_1_20240201_080000.mjpeg");
    assert_eq!(engine.cleanup_older_than(7).await, 0);
}

#[tokio::test]
async fn write_failure_ends_only_that_recording() {
    let dir = tempfile::tempdir().unwrap();
    let cameras = FakeCameras::new(Behavior::Streaming);
    let engine = engine_with_writers(cameras, dir.path(), RefusingWriters::new(3));

    assert!(engine.start_recording(1, "fake://cam1").await);
    assert!(engine.start_recording(3, "fake://cam3").await);
    wait_for_status(&engine, 3, WorkerRole::Recording, WorkerStatus::Failed).await;
    let failed = engine.worker_status(3, WorkerRole::Recording).await.unwrap();
    assert!(failed.last_error.unwrap().contains("disk full"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let healthy = engine.worker_status(1, WorkerRole::Recording).await.unwrap();
    assert_eq!(healthy.status, WorkerStatus::Active);

    // The refused session never got a frame, so its file is gone.
    assert!(engine.list_recordings(Some(3), None).await.is_empty());
    assert!(engine.stop_recording(1).await);
    assert_eq!(engine.list_recordings(Some(1), None).await.len(), 1);
}

#[tokio::test]
async fn preview_ends_when_capture_fails() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(FakeCameras::new(Behavior::Unreachable), dir.path());
    assert!(matches!(engine.preview_while_capturing(5).await, Err(AppError::NotFound(_))));

    assert!(engine.start_stream(5, "fake://cam5").await);
    let mut preview = Box::pin(engine.preview_while_capturing(5).await.unwrap());
    let first = tokio::time::timeout(Duration::from_secs(5), preview.next())
        .await
        .expect("preview kept waiting on a failed camera")
        .expect("preview ended without an item");
    let err = first.unwrap_err();
    assert!(err.to_string().contains("connection refused"), "{}", err);
}
