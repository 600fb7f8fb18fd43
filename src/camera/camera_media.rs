//! OpenCV backend: RTSP (and anything else `VideoCapture` can open) for reading,
//! `VideoWriter` for container formats other than mjpeg.

use bytes::Bytes;
use log::{debug, info, warn};
use opencv::{core as opencv_core, imgcodecs, prelude::*, videoio};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::camera_config::CameraId;
use crate::camera::frame_writer::{ensure_frame_size, FrameWriter, FrameWriterFactory};
use crate::engine::capture_source::{redact_url, Frame, FramePixels, SourceConnector, StreamSession};
use crate::errors::AppError;

pub fn encode_mat_jpeg(
    camera_id: CameraId,
    mat: &opencv_core::Mat,
    quality: u8,
) -> Result<Bytes, AppError> {
    let mut buf = opencv_core::Vector::<u8>::new();
    let mut params = opencv_core::Vector::<i32>::new();
    params.push(imgcodecs::IMWRITE_JPEG_QUALITY);
    params.push(i32::from(quality));
    let ok = imgcodecs::imencode(".jpg", mat, &mut buf, &params)
        .map_err(|e| AppError::Encode(format!("camera {}: imencode failed: {}", camera_id, e)))?;
    if !ok {
        return Err(AppError::Encode(format!("camera {}: imencode produced no image", camera_id)));
    }
    Ok(Bytes::from(buf.to_vec()))
}

fn decode_to_mat(camera_id: CameraId, frame: &Frame) -> Result<opencv_core::Mat, AppError> {
    match &frame.pixels {
        FramePixels::Mat(mat) => mat
            .try_clone()
            .map_err(|e| AppError::Encode(format!("camera {}: {}", camera_id, e))),
        FramePixels::Jpeg(data) => {
            let buf = opencv_core::Vector::<u8>::from_slice(data);
            imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR)
                .map_err(|e| {
                    AppError::Encode(format!("camera {}: imdecode failed: {}", camera_id, e))
                })
        }
        FramePixels::Bgr8(data) => {
            let flat = opencv_core::Mat::from_slice(data)
                .map_err(|e| AppError::Encode(format!("camera {}: {}", camera_id, e)))?;
            let shaped = flat
                .reshape(3, frame.height as i32)
                .map_err(|e| AppError::Encode(format!("camera {}: {}", camera_id, e)))?;
            shaped.try_clone().map_err(|e| AppError::Encode(format!("camera {}: {}", camera_id, e)))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OpenCvConnector;

impl SourceConnector for OpenCvConnector {
    fn open(&self, camera_id: CameraId, url: &str) -> Result<Box<dyn StreamSession>, AppError> {
        let cap_create_start = Instant::now();
        let cap = videoio::VideoCapture::from_file(url, videoio::CAP_ANY)
            .map_err(|e| AppError::Connect {
                camera_id,
                details: format!("OpenCV: VideoCapture failed: {}", e),
            })?;
        let opened = videoio::VideoCapture::is_opened(&cap)
            .map_err(|e| AppError::Connect {
                camera_id,
                details: format!("OpenCV: is_opened failed: {}", e),
            })?;
        if !opened {
            return Err(AppError::Connect {
                camera_id,
                details: format!(
                    "failed to open stream {} - check camera availability and path",
                    redact_url(url)
                ),
            });
        }
        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0);
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0);
        info!(
            "👍 Stream opened for camera {} in {:?} ({}x{})",
            camera_id, cap_create_start.elapsed(), width, height
        );
        Ok(Box::new(OpenCvSession {
            camera_id,
            cap: Some(cap),
            dimensions: Some((width.max(0.0) as u32, height.max(0.0) as u32)),
        }))
    }
}

struct OpenCvSession {
    camera_id: CameraId,
    cap: Option<videoio::VideoCapture>,
    dimensions: Option<(u32, u32)>,
}

impl StreamSession for OpenCvSession {
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    fn read_frame(&mut self) -> Result<Frame, AppError> {
        let camera_id = self.camera_id;
        let cap = self
            .cap
            .as_mut()
            .ok_or_else(|| AppError::Read { camera_id, details: "session already closed".into() })?;
        let mut mat = opencv_core::Mat::default();
        let grabbed = cap
            .read(&mut mat)
            .map_err(|e| AppError::Read {
                camera_id,
                details: format!("OpenCV: read failed: {}", e),
            })?;
        if !grabbed || mat.empty() {
            return Err(AppError::Read { camera_id, details: "stream returned no frame".into() });
        }
        let (width, height) = (mat.cols().max(0) as u32, mat.rows().max(0) as u32);
        Ok(Frame {
            camera_id,
            width,
            height,
            pixels: FramePixels::Mat(mat),
            captured_at: chrono::Utc::now(),
        })
    }

    fn close(&mut self) {
        if let Some(mut cap) = self.cap.take() {
            if let Err(e) = cap.release() {
                warn!("OpenCV: release failed for camera {}: {}", self.camera_id, e);
            }
        }
    }
}

impl Drop for OpenCvSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Writes recordings through `VideoWriter`, e.g. mp4 or avi.
#[derive(Debug, Clone)]
pub struct OpenCvWriterFactory {
    extension: String,
    video_codec: String,
    fps: f64,
}

impl OpenCvWriterFactory {
    pub fn new(extension: impl Into<String>, video_codec: impl Into<String>, fps: f64) -> Self {
        OpenCvWriterFactory { extension: extension.into(), video_codec: video_codec.into(), fps }
    }

    fn fourcc(&self) -> Result<i32, AppError> {
        let fourcc_str = match self.video_codec.to_lowercase().as_str() {
            "mjpg" | "mjpeg" => "MJPG",
            "xvid" => "XVID",
            "mp4v" => "MP4V",
            "h264" if self.extension.eq_ignore_ascii_case("avi") => "H264",
            "h264" | "avc1" => "avc1",
            codec_val => {
                warn!(
                    "⚠️ Unsupported video_codec '{}' for container '{}'. Defaulting to MJPG.",
                    codec_val, self.extension
                );
                "MJPG"
            }
        };
        let c: Vec<char> = fourcc_str.chars().collect();
        videoio::VideoWriter::fourcc(c[0], c[1], c[2], c[3])
            .map_err(|e| AppError::Config(format!("invalid fourcc {}: {}", fourcc_str, e)))
    }
}

impl FrameWriterFactory for OpenCvWriterFactory {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn create(
        &self,
        camera_id: CameraId,
        path: &Path,
        first_frame: &Frame,
    ) -> Result<Box<dyn FrameWriter>, AppError> {
        if path.exists() {
            return Err(AppError::Write {
                camera_id,
                details: format!("refusing to overwrite existing recording {}", path.display()),
            });
        }
        let path_str = path.to_str().ok_or_else(|| AppError::Write {
            camera_id,
            details: format!("non UTF-8 path {}", path.display()),
        })?;
        let size = opencv_core::Size::new(first_frame.width as i32, first_frame.height as i32);
        let writer = videoio::VideoWriter::new(path_str, self.fourcc()?, self.fps, size, true)
            .map_err(|e| AppError::Write {
                camera_id,
                details: format!("OpenCV: VideoWriter failed: {}", e),
            })?;
        let opened = videoio::VideoWriter::is_opened(&writer)
            .map_err(|e| AppError::Write {
                camera_id,
                details: format!("OpenCV: is_opened failed: {}", e),
            })?;
        if !opened {
            return Err(AppError::Write {
                camera_id,
                details: format!("failed to open VideoWriter at {}", path.display()),
            });
        }
        debug!("✍️ VideoWriter opened for camera {} to {}", camera_id, path.display());
        Ok(Box::new(OpenCvFrameWriter {
            camera_id,
            path: path.to_path_buf(),
            frame_size: (first_frame.width, first_frame.height),
            writer,
        }))
    }
}

struct OpenCvFrameWriter {
    camera_id: CameraId,
    path: PathBuf,
    /// `VideoWriter` silently drops frames of any other size.
    frame_size: (u32, u32),
    writer: videoio::VideoWriter,
}

impl FrameWriter for OpenCvFrameWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), AppError> {
        let mat = decode_to_mat(self.camera_id, frame)?;
        let actual = (mat.cols().max(0) as u32, mat.rows().max(0) as u32);
        ensure_frame_size(self.camera_id, self.frame_size, actual)?;
        self.writer.write(&mat).map_err(|e| AppError::Write {
            camera_id: self.camera_id,
            details: format!("OpenCV: write to {} failed: {}", self.path.display(), e),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn finish(mut self: Box<Self>) -> Result<(), AppError> {
        self.writer.release().map_err(|e| AppError::Write {
            camera_id: self.camera_id,
            details: format!("OpenCV: release of {} failed: {}", self.path.display(), e),
        })
    }
}
