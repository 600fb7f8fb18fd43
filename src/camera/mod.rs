pub mod capture_worker;
pub mod frame_writer;
pub mod http_snapshot_source;
pub mod preview;
pub mod recording_worker;

#[cfg(feature = "opencv")]
pub mod camera_media;

use std::sync::Arc;
use std::time::Duration;

use crate::app_config::ApplicationConfig;
use crate::camera::frame_writer::{FrameWriterFactory, MjpegWriterFactory};
use crate::camera::http_snapshot_source::HttpSnapshotConnector;
use crate::camera_config::CameraId;
use crate::engine::capture_source::{SourceConnector, StreamSession};
use crate::errors::AppError;

/// Picks a backend by URL scheme: `http`/`https` snapshot polling, and with the
/// `opencv` feature everything else goes to `VideoCapture` (rtsp, files).
pub struct DefaultConnector {
    http: HttpSnapshotConnector,
    #[cfg(feature = "opencv")]
    opencv: camera_media::OpenCvConnector,
}

impl DefaultConnector {
    pub fn new(request_timeout: Duration) -> Self {
        DefaultConnector {
            http: HttpSnapshotConnector::new(request_timeout),
            #[cfg(feature = "opencv")]
            opencv: camera_media::OpenCvConnector,
        }
    }
}

impl SourceConnector for DefaultConnector {
    fn open(&self, camera_id: CameraId, url: &str) -> Result<Box<dyn StreamSession>, AppError> {
        let scheme = url.split_once("://").map(|(s, _)| s.to_ascii_lowercase()).unwrap_or_default();
        match scheme.as_str() {
            "http" | "https" => self.http.open(camera_id, url),
            #[cfg(feature = "opencv")]
            _ => self.opencv.open(camera_id, url),
            #[cfg(not(feature = "opencv"))]
            _ => Err(AppError::UnsupportedSource {
                camera_id,
                url: crate::engine::capture_source::redact_url(url),
            }),
        }
    }
}

pub fn default_connector(app_config: &ApplicationConfig) -> Arc<dyn SourceConnector> {
    let request_timeout = app_config
        .io_timeout_secs
        .map(Duration::from_secs_f32)
        .unwrap_or(Duration::from_secs(30));
    Arc::new(DefaultConnector::new(request_timeout))
}

/// Writer for the configured container format. `mjpeg` is always available; other
/// containers need the `opencv` feature.
pub fn writer_factory_for(
    app_config: &ApplicationConfig,
) -> Result<Arc<dyn FrameWriterFactory>, AppError> {
    let format = app_config.container_format.to_lowercase();
    match format.as_str() {
        "mjpeg" | "mjpg" => Ok(Arc::new(MjpegWriterFactory::new(format, app_config.jpeg_quality))),
        #[cfg(feature = "opencv")]
        _ => Ok(Arc::new(camera_media::OpenCvWriterFactory::new(
            format,
            app_config.video_codec.clone(),
            f64::from(app_config.recording_fps),
        ))),
        #[cfg(not(feature = "opencv"))]
        other => Err(AppError::Config(format!(
            "container format '{}' needs the opencv feature; \
             use 'mjpeg' or rebuild with --features opencv",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mjpeg_is_always_available() {
        let factory = writer_factory_for(&ApplicationConfig::default()).unwrap();
        assert_eq!(factory.extension(), "mjpeg");
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn other_schemes_need_opencv() {
        let connector = DefaultConnector::new(Duration::from_secs(1));
        let err = connector.open(1, "rtsp://user:pw@10.0.0.1/stream").err().unwrap();
        assert!(matches!(err, AppError::UnsupportedSource { ref url, .. } if !url.contains("pw")));
        assert!(!err.is_retryable());

        let cfg =
            ApplicationConfig { container_format: "mp4".into(), ..ApplicationConfig::default() };
        assert!(matches!(writer_factory_for(&cfg), Err(AppError::Config(_))));
    }
}
