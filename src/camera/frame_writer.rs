use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::camera_config::CameraId;
use crate::engine::capture_source::Frame;
use crate::errors::AppError;

/// Appends frames to one recording file. Calls block.
pub trait FrameWriter: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), AppError>;

    fn path(&self) -> &Path;

    /// Flushes and closes the container.
    fn finish(self: Box<Self>) -> Result<(), AppError>;
}

/// Creates writers for new recording sessions. The extension is the one the
/// recordings catalog looks for.
pub trait FrameWriterFactory: Send + Sync {
    fn extension(&self) -> &str;

    /// Opens a new file at `path`, sized after `first_frame`. Never overwrites.
    fn create(
        &self,
        camera_id: CameraId,
        path: &Path,
        first_frame: &Frame,
    ) -> Result<Box<dyn FrameWriter>, AppError>;
}

/// Containers with a fixed frame size take only frames matching the size they were
/// opened with.
pub fn ensure_frame_size(
    camera_id: CameraId,
    expected: (u32, u32),
    actual: (u32, u32),
) -> Result<(), AppError> {
    if expected == actual {
        return Ok(());
    }
    Err(AppError::Write {
        camera_id,
        details: format!(
            "frame is {}x{} but the recording was opened at {}x{}",
            actual.0, actual.1, expected.0, expected.1
        ),
    })
}

/// Motion-JPEG: every frame is one complete JPEG appended to the file.
#[derive(Debug, Clone)]
pub struct MjpegWriterFactory {
    extension: String,
    jpeg_quality: u8,
}

impl MjpegWriterFactory {
    pub fn new(extension: impl Into<String>, jpeg_quality: u8) -> Self {
        MjpegWriterFactory { extension: extension.into(), jpeg_quality }
    }
}

impl FrameWriterFactory for MjpegWriterFactory {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn create(
        &self,
        camera_id: CameraId,
        path: &Path,
        first_frame: &Frame,
    ) -> Result<Box<dyn FrameWriter>, AppError> {
        let file = OpenOptions::new().write(true).create_new(true).open(path).map_err(|e| {
            let details = if e.kind() == ErrorKind::AlreadyExists {
                format!("refusing to overwrite existing recording {}", path.display())
            } else {
                format!("failed to create {}: {}", path.display(), e)
            };
            AppError::Write { camera_id, details }
        })?;
        debug!(
            "✍️ MJPEG writer opened for camera {} at {} ({}x{})",
            camera_id, path.display(), first_frame.width, first_frame.height
        );
        Ok(Box::new(MjpegFileWriter {
            camera_id,
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            jpeg_quality: self.jpeg_quality,
        }))
    }
}

struct MjpegFileWriter {
    camera_id: CameraId,
    path: PathBuf,
    out: BufWriter<File>,
    jpeg_quality: u8,
}

impl FrameWriter for MjpegFileWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), AppError> {
        let jpeg = frame.encode_jpeg(self.jpeg_quality)?;
        self.out.write_all(&jpeg).map_err(|e| AppError::Write {
            camera_id: self.camera_id,
            details: format!("write to {} failed: {}", self.path.display(), e),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn finish(self: Box<Self>) -> Result<(), AppError> {
        let camera_id = self.camera_id;
        let path = self.path;
        let file = self.out.into_inner().map_err(|e| AppError::Write {
            camera_id,
            details: format!("flush of {} failed: {}", path.display(), e.error()),
        })?;
        file.sync_data().map_err(|e| AppError::Write {
            camera_id,
            details: format!("sync of {} failed: {}", path.display(), e),
        })
    }
}
