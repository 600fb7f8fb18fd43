use thiserror::Error;

use crate::camera_config::CameraId;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Connect Error for camera {camera_id}: {details}")]
    Connect { camera_id: CameraId, details: String },

    #[error("Read Error for camera {camera_id}: {details}")]
    Read { camera_id: CameraId, details: String },

    #[error("Write Error for camera {camera_id}: {details}")]
    Write { camera_id: CameraId, details: String },

    #[error("Degenerate source for camera {camera_id}: {width}x{height}")]
    DegenerateSource { camera_id: CameraId, width: u32, height: u32 },

    #[error("Unsupported source for camera {camera_id}: {url}")]
    UnsupportedSource { camera_id: CameraId, url: String },

    #[error("Camera {camera_id} already has an active {role} worker")]
    AlreadyActive { camera_id: CameraId, role: String },

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("File I/O Error: {0}")]
    Io(String),

    #[error("Encode Error: {0}")]
    Encode(String),

    #[error("Task Execution Error: {0}")]
    Task(String),
}

impl AppError {
    /// Connect and read failures are transient; everything else ends the worker.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Connect { .. } | AppError::Read { .. })
    }
}

// Allow conversion from std::io::Error to AppError::Io
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Task(err.to_string())
    }
}
