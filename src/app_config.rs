use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::source_driver::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApplicationConfig {
    pub storage_directory: String,
    pub retention_days: u32,
    pub container_format: String, // File extension of recordings, e.g. "mjpeg", "mp4"
    pub video_codec: String,      // Only used by the opencv writer, e.g. "mjpeg", "mp4v", "h264"
    pub recording_fps: f32,
    pub jpeg_quality: u8,         // JPEG quality (1-100) for preview and mjpeg recordings
    pub preview_fps: f32,
    pub max_retries: u32,
    pub retry_backoff_secs: f32,
    pub io_timeout_secs: Option<f32>,
    pub stop_timeout_secs: f32,
    pub cleanup_interval_secs: u64,
    pub log_level: Option<String>, // Optional so CLI or RUST_LOG can take precedence
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        ApplicationConfig {
            storage_directory: "./recordings".to_string(),
            retention_days: 7,
            container_format: "mjpeg".to_string(),
            video_codec: "mjpeg".to_string(),
            recording_fps: 15.0,
            jpeg_quality: 80,
            preview_fps: 30.0,
            max_retries: 3,
            retry_backoff_secs: 5.0,
            io_timeout_secs: Some(10.0),
            stop_timeout_secs: 5.0,
            cleanup_interval_secs: 3600,
            log_level: Some("info".to_string()),
        }
    }
}

impl ApplicationConfig {
    pub fn storage_path(&self) -> PathBuf {
        PathBuf::from(&self.storage_directory)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: Duration::from_secs_f32(self.retry_backoff_secs),
            io_timeout: self.io_timeout_secs.map(Duration::from_secs_f32),
        }
    }

    pub fn preview_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.preview_fps)
    }

    pub fn recording_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.recording_fps)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.stop_timeout_secs)
    }
}
