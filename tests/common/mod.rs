#![allow(dead_code)]

use bytes::Bytes;
use rnvr::camera::frame_writer::{FrameWriter, FrameWriterFactory, MjpegWriterFactory};
use rnvr::camera_config::{CameraConfig, CameraId};
use rnvr::engine::camera_manager::CameraManager;
use rnvr::engine::capture_source::{Frame, SourceConnector, StreamSession};
use rnvr::engine::recording_catalog::AgeBasis;
use rnvr::engine::source_driver::RetryPolicy;
use rnvr::errors::AppError;
use rnvr::{Engine, EngineSettings};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    /// Opens and streams numbered JPEG frames.
    Streaming,
    /// Every open is refused.
    Unreachable,
    /// Opens, then every read blocks for the given time.
    Stuck(Duration),
}

/// In-memory camera network; counts opens per process.
pub struct FakeCameras {
    behavior: Behavior,
    opens: AtomicUsize,
}

impl FakeCameras {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(FakeCameras { behavior, opens: AtomicUsize::new(0) })
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

struct FakeSession {
    camera_id: CameraId,
    behavior: Behavior,
    next: usize,
}

impl SourceConnector for FakeCameras {
    fn open(&self, camera_id: CameraId, url: &str) -> Result<Box<dyn StreamSession>, AppError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Unreachable => Err(AppError::Connect {
                camera_id,
                details: format!("connection refused: {}", url),
            }),
            behavior => Ok(Box::new(FakeSession { camera_id, behavior, next: 0 })),
        }
    }
}

impl StreamSession for FakeSession {
    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((4, 2))
    }

    fn read_frame(&mut self) -> Result<Frame, AppError> {
        if let Behavior::Stuck(d) = self.behavior {
            std::thread::sleep(d);
        }
        self.next += 1;
        let data = Bytes::from(format!("cam{}-frame{};", self.camera_id, self.next));
        Ok(Frame::jpeg(self.camera_id, 4, 2, data))
    }
}

pub fn fast_settings(storage_dir: &Path) -> EngineSettings {
    EngineSettings {
        storage_dir: storage_dir.to_path_buf(),
        retry_policy: RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(50),
            io_timeout: Some(Duration::from_secs(5)),
        },
        preview_interval: Duration::from_millis(10),
        recording_interval: Duration::from_millis(10),
        stop_timeout: Duration::from_millis(500),
        jpeg_quality: 80,
        age_basis: AgeBasis::Modified,
    }
}

pub fn camera(id: CameraId) -> CameraConfig {
    CameraConfig {
        id,
        name: format!("cam-{}", id),
        source_url: format!("fake://cam{}", id),
        enabled: true,
    }
}

pub fn engine_with(cameras: Arc<FakeCameras>, storage_dir: &Path) -> Engine {
    let manager = CameraManager::from_cameras((1..=5).map(camera)).unwrap();
    let writers = Arc::new(MjpegWriterFactory::new("mjpeg", 80));
    Engine::new(fast_settings(storage_dir), manager, cameras, writers)
}

/// MJPEG files for every camera, except that writes for `refused` always fail.
pub struct RefusingWriters {
    refused: CameraId,
    inner: MjpegWriterFactory,
}

impl RefusingWriters {
    pub fn new(refused: CameraId) -> Arc<Self> {
        Arc::new(RefusingWriters { refused, inner: MjpegWriterFactory::new("mjpeg", 80) })
    }
}

struct RefusingWriter {
    camera_id: CameraId,
    inner: Box<dyn FrameWriter>,
}

impl FrameWriter for RefusingWriter {
    fn write_frame(&mut self, _frame: &Frame) -> Result<(), AppError> {
        Err(AppError::Write { camera_id: self.camera_id, details: "disk full".into() })
    }

    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn finish(self: Box<Self>) -> Result<(), AppError> {
        self.inner.finish()
    }
}

impl FrameWriterFactory for RefusingWriters {
    fn extension(&self) -> &str {
        self.inner.extension()
    }

    fn create(
        &self,
        camera_id: CameraId,
        path: &Path,
        first_frame: &Frame,
    ) -> Result<Box<dyn FrameWriter>, AppError> {
        let inner = self.inner.create(camera_id, path, first_frame)?;
        if camera_id == self.refused {
            return Ok(Box::new(RefusingWriter { camera_id, inner }));
        }
        Ok(inner)
    }
}

pub fn engine_with_writers(
    cameras: Arc<FakeCameras>,
    storage_dir: &Path,
    writers: Arc<dyn FrameWriterFactory>,
) -> Engine {
    let manager = CameraManager::from_cameras((1..=5).map(camera)).unwrap();
    Engine::new(fast_settings(storage_dir), manager, cameras, writers)
}
