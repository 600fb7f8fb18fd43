use bytes::Bytes;
use image::{ImageFormat, ImageReader};
use log::{debug, info};
use reqwest::blocking::Client;
use std::io::Cursor;
use std::time::{Duration, Instant};

use crate::camera_config::CameraId;
use crate::engine::capture_source::{redact_url, Frame, SourceConnector, StreamSession};
use crate::errors::AppError;

/// Cameras that expose a JPEG snapshot endpoint. Each read is one HTTP GET;
/// credentials in the URL userinfo are sent as basic auth.
#[derive(Debug, Clone)]
pub struct HttpSnapshotConnector {
    request_timeout: Duration,
}

impl HttpSnapshotConnector {
    pub fn new(request_timeout: Duration) -> Self {
        HttpSnapshotConnector { request_timeout }
    }
}

impl SourceConnector for HttpSnapshotConnector {
    fn open(&self, camera_id: CameraId, url: &str) -> Result<Box<dyn StreamSession>, AppError> {
        // Built here, on the blocking pool: the blocking client owns its own runtime.
        let client = Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| AppError::Connect {
                camera_id,
                details: format!("HTTP client setup failed: {}", e),
            })?;

        let mut session = HttpSnapshotSession {
            camera_id,
            url: url.to_string(),
            client,
            dimensions: None,
            pending: None,
        };
        let first = session.fetch().map_err(|e| match e {
            AppError::Read { camera_id, details } => AppError::Connect { camera_id, details },
            other => other,
        })?;
        info!(
            "📷 HTTP snapshot source for camera {} at {} is {}x{}",
            camera_id,
            redact_url(url),
            first.width,
            first.height
        );
        session.dimensions = Some((first.width, first.height));
        session.pending = Some(first);
        Ok(Box::new(session))
    }
}

struct HttpSnapshotSession {
    camera_id: CameraId,
    url: String,
    client: Client,
    dimensions: Option<(u32, u32)>,
    /// Frame fetched while opening, handed out by the first read.
    pending: Option<Frame>,
}

impl HttpSnapshotSession {
    fn fetch(&mut self) -> Result<Frame, AppError> {
        let camera_id = self.camera_id;
        let request_start = Instant::now();
        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| AppError::Read {
                camera_id,
                details: format!("HTTP send failed: {}", e),
            })?;
        if !response.status().is_success() {
            return Err(AppError::Read {
                camera_id,
                details: format!("HTTP request failed with status: {}", response.status()),
            });
        }
        let body: Bytes = response.bytes().map_err(|e| AppError::Read {
            camera_id,
            details: format!("failed to read HTTP body: {}", e),
        })?;
        debug!(
            "Camera {}: received {} bytes in {:?}",
            camera_id,
            body.len(),
            request_start.elapsed()
        );

        let reader = ImageReader::new(Cursor::new(&body[..]))
            .with_guessed_format()
            .map_err(|e| AppError::Read {
                camera_id,
                details: format!("unreadable snapshot: {}", e),
            })?;
        if reader.format() != Some(ImageFormat::Jpeg) {
            return Err(AppError::UnsupportedSource {
                camera_id,
                url: format!(
                    "{} (snapshot is {:?}, expected JPEG)",
                    redact_url(&self.url),
                    reader.format()
                ),
            });
        }
        let (width, height) = reader.into_dimensions().map_err(|e| AppError::Read {
            camera_id,
            details: format!("corrupt JPEG snapshot: {}", e),
        })?;
        Ok(Frame::jpeg(camera_id, width, height, body))
    }
}

impl StreamSession for HttpSnapshotSession {
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    fn read_frame(&mut self) -> Result<Frame, AppError> {
        match self.pending.take() {
            Some(frame) => Ok(frame),
            None => self.fetch(),
        }
    }
}
