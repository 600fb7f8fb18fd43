//! The engine: concurrent per-camera recording and live-preview workers over a shared
//! frame cache and a file-system recordings catalog.

pub mod camera_manager;
pub mod capture_source;
pub mod frame_cache;
pub mod recording_catalog;
pub mod source_driver;
pub mod worker_registry;

use bytes::Bytes;
use chrono::NaiveDate;
use futures::stream::{self, Stream, StreamExt};
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::app_config::ApplicationConfig;
use crate::camera::capture_worker::{run_capture_worker, CaptureJob};
use crate::camera::frame_writer::FrameWriterFactory;
use crate::camera::preview;
use crate::camera::recording_worker::{run_recording_worker, RecordingJob};
use crate::camera_config::CameraId;
use crate::config_loader::MasterConfig;
use crate::errors::AppError;

use self::camera_manager::CameraManager;
use self::capture_source::SourceConnector;
use self::frame_cache::{FrameCache, FrameCacheEntry};
use self::recording_catalog::{AgeBasis, CleanupReport, RecordingCatalog, RecordingEntry};
use self::source_driver::RetryPolicy;
use self::worker_registry::{WorkerKey, WorkerRegistry, WorkerRole, WorkerSnapshot, WorkerStatus};

/// Engine tunables, derived from the `application` config section.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub storage_dir: PathBuf,
    pub retry_policy: RetryPolicy,
    pub preview_interval: Duration,
    pub recording_interval: Duration,
    pub stop_timeout: Duration,
    pub jpeg_quality: u8,
    pub age_basis: AgeBasis,
}

impl EngineSettings {
    pub fn from_app_config(app_config: &ApplicationConfig) -> Self {
        EngineSettings {
            storage_dir: app_config.storage_path(),
            retry_policy: app_config.retry_policy(),
            preview_interval: app_config.preview_interval(),
            recording_interval: app_config.recording_interval(),
            stop_timeout: app_config.stop_timeout(),
            jpeg_quality: app_config.jpeg_quality,
            age_basis: AgeBasis::default(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_app_config(&ApplicationConfig::default())
    }
}

struct EngineInner {
    settings: EngineSettings,
    cameras: CameraManager,
    registry: WorkerRegistry,
    cache: Arc<FrameCache>,
    catalog: RecordingCatalog,
    connector: Arc<dyn SourceConnector>,
    writers: Arc<dyn FrameWriterFactory>,
}

/// Cheap to clone; all clones share the same workers, cache and catalog.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        cameras: CameraManager,
        connector: Arc<dyn SourceConnector>,
        writers: Arc<dyn FrameWriterFactory>,
    ) -> Self {
        let catalog = RecordingCatalog::new(settings.storage_dir.clone(), writers.extension())
            .with_age_basis(settings.age_basis);
        let registry = WorkerRegistry::new(settings.stop_timeout);
        info!(
            "🚀 Engine ready: {} camera(s), storage {}, container .{}",
            cameras.len(), settings.storage_dir.display(), writers.extension()
        );
        Engine {
            inner: Arc::new(EngineInner {
                settings,
                cameras,
                registry,
                cache: Arc::new(FrameCache::new()),
                catalog,
                connector,
                writers,
            }),
        }
    }

    /// Engine with the default backends for a loaded configuration.
    pub fn from_config(master_config: &MasterConfig) -> anyhow::Result<Self> {
        let app_config = &master_config.app_settings;
        let cameras = CameraManager::new(master_config)?;
        let writers = crate::camera::writer_factory_for(app_config)?;
        let connector = crate::camera::default_connector(app_config);
        Ok(Self::new(EngineSettings::from_app_config(app_config), cameras, connector, writers))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn cameras(&self) -> &CameraManager {
        &self.inner.cameras
    }

    pub fn storage_dir(&self) -> &Path {
        self.inner.catalog.storage_dir()
    }

    // --- Recording ---

    /// Starts recording `camera_id` from `url`. False if it is already recording.
    pub async fn start_recording(&self, camera_id: CameraId, url: &str) -> bool {
        let job = RecordingJob {
            camera_id,
            url: url.to_string(),
            connector: self.inner.connector.clone(),
            writers: self.inner.writers.clone(),
            storage_dir: self.inner.settings.storage_dir.clone(),
            policy: self.inner.settings.retry_policy.clone(),
            frame_interval: self.inner.settings.recording_interval,
        };
        self.inner
            .registry
            .start(camera_id, WorkerRole::Recording, move |cancel, status| {
                run_recording_worker(job, cancel, status)
            })
            .await
    }

    /// Stops recording. False if no recording worker was running.
    pub async fn stop_recording(&self, camera_id: CameraId) -> bool {
        self.inner.registry.stop(camera_id, WorkerRole::Recording).await.was_running()
    }

    /// Like [`Engine::start_recording`], with the URL looked up in the camera list.
    pub async fn start_recording_camera(&self, camera_id: CameraId) -> Result<bool, AppError> {
        let url = self.inner.cameras.get_camera(camera_id)?.source_url.clone();
        Ok(self.start_recording(camera_id, &url).await)
    }

    // --- Live preview ---

    /// Starts the capture worker that feeds the frame cache. False if already streaming.
    pub async fn start_stream(&self, camera_id: CameraId, url: &str) -> bool {
        let job = CaptureJob {
            camera_id,
            url: url.to_string(),
            connector: self.inner.connector.clone(),
            cache: self.inner.cache.clone(),
            policy: self.inner.settings.retry_policy.clone(),
            frame_interval: self.inner.settings.preview_interval,
            jpeg_quality: self.inner.settings.jpeg_quality,
        };
        self.inner
            .registry
            .start(camera_id, WorkerRole::Capture, move |cancel, status| {
                run_capture_worker(job, cancel, status)
            })
            .await
    }

    /// Stops the capture worker and drops the camera's cached frame. Safe to call when
    /// nothing runs; returns whether a worker was running.
    pub async fn stop_stream(&self, camera_id: CameraId) -> bool {
        let outcome = self.inner.registry.stop(camera_id, WorkerRole::Capture).await;
        self.inner.cache.remove(camera_id).await;
        outcome.was_running()
    }

    pub async fn start_stream_camera(&self, camera_id: CameraId) -> Result<bool, AppError> {
        let url = self.inner.cameras.get_camera(camera_id)?.source_url.clone();
        Ok(self.start_stream(camera_id, &url).await)
    }

    /// Latest cached frame, if the camera is streaming and has produced one.
    pub async fn get_frame(&self, camera_id: CameraId) -> Option<Arc<FrameCacheEntry>> {
        self.inner.cache.get(camera_id).await
    }

    /// Endless multipart JPEG stream of the camera's cached frames. Does not start the
    /// capture worker.
    pub fn generate_preview(
        &self,
        camera_id: CameraId,
    ) -> impl Stream<Item = Bytes> + Send + 'static {
        preview::preview_stream(
            self.inner.cache.clone(),
            camera_id,
            self.inner.settings.preview_interval,
        )
    }

    /// How many cameras currently have a frame in the preview cache.
    pub async fn cached_frame_count(&self) -> usize {
        self.inner.cache.len().await
    }

    /// Preview parts for as long as the camera's capture worker is alive. Ends with an
    /// error once the worker fails or is stopped, instead of waiting forever.
    pub async fn preview_while_capturing(
        &self,
        camera_id: CameraId,
    ) -> Result<impl Stream<Item = Result<Bytes, AppError>> + Send + 'static, AppError> {
        let mut status = self
            .watch_worker(camera_id, WorkerRole::Capture)
            .await
            .ok_or_else(|| {
                AppError::NotFound(format!("no capture worker for camera {}", camera_id))
            })?;
        let ended = stream::once(async move {
            let reason = match status.wait_for(|s| s.status == WorkerStatus::Failed).await {
                Ok(snapshot) => {
                    snapshot.last_error.clone().unwrap_or_else(|| "unknown error".to_string())
                }
                Err(_) => "worker stopped".to_string(),
            };
            Err(AppError::Task(format!("capture for camera {} ended: {}", camera_id, reason)))
        });
        let parts = self.generate_preview(camera_id).map(Ok);
        Ok(stream::select(parts, ended))
    }

    // --- Recordings catalog ---

    /// Recordings newest first. A storage error is logged and yields an empty list.
    pub async fn list_recordings(
        &self,
        camera_id: Option<CameraId>,
        date: Option<NaiveDate>,
    ) -> Vec<RecordingEntry> {
        let catalog = self.inner.catalog.clone();
        match tokio::task::spawn_blocking(move || catalog.list(camera_id, date)).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                error!("❌ Failed to list recordings: {}", e);
                Vec::new()
            }
            Err(e) => {
                error!("❌ Recording listing task failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Deletes recordings older than `retention_days` whole days; returns how many went.
    pub async fn cleanup_older_than(&self, retention_days: u32) -> usize {
        self.cleanup_report(retention_days).await.deleted
    }

    pub async fn cleanup_report(&self, retention_days: u32) -> CleanupReport {
        let catalog = self.inner.catalog.clone();
        let sweep = move || catalog.cleanup_older_than(retention_days, SystemTime::now());
        match tokio::task::spawn_blocking(sweep).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!("❌ Retention sweep failed: {}", e);
                CleanupReport::default()
            }
            Err(e) => {
                error!("❌ Retention sweep task failed: {}", e);
                CleanupReport::default()
            }
        }
    }

    /// Runs a retention sweep every `interval` until `cancel` fires.
    pub fn spawn_retention_sweeper(
        &self,
        retention_days: u32,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            info!(
                "🧹 Retention sweeper running every {:?}, keeping {} day(s).",
                interval, retention_days
            );
            loop {
                let report = engine.cleanup_report(retention_days).await;
                debug!("Retention sweep: {:?}", report);
                if !source_driver::sleep_or_cancel(&cancel, interval).await {
                    break;
                }
            }
            debug!("Retention sweeper stopped.");
        })
    }

    // --- Introspection and lifecycle ---

    pub async fn worker_status(
        &self,
        camera_id: CameraId,
        role: WorkerRole,
    ) -> Option<WorkerSnapshot> {
        self.inner.registry.status(camera_id, role).await
    }

    pub async fn watch_worker(
        &self,
        camera_id: CameraId,
        role: WorkerRole,
    ) -> Option<watch::Receiver<WorkerSnapshot>> {
        self.inner.registry.watch(camera_id, role).await
    }

    pub async fn active_workers(&self) -> Vec<(WorkerKey, WorkerSnapshot)> {
        self.inner.registry.list().await
    }

    /// Opens the source once and reads one frame, without touching any worker.
    pub async fn probe(&self, camera_id: CameraId, url: &str) -> Result<(u32, u32), AppError> {
        let limit = self.inner.settings.retry_policy.io_timeout.unwrap_or(Duration::from_secs(30));
        source_driver::probe_source(self.inner.connector.clone(), camera_id, url, limit).await
    }

    /// Stops every worker and clears the frame cache. Returns how many workers were running.
    pub async fn shutdown(&self) -> usize {
        let shutdown_start = Instant::now();
        let running = self.inner.registry.stop_all().await;
        self.inner.cache.clear().await;
        info!(
            "🛑 Engine shut down in {:?}; {} worker(s) were running.",
            shutdown_start.elapsed(),
            running
        );
        running
    }
}
