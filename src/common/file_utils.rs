use crate::camera_config::CameraId;
use crate::common::timestamp_utils;
use crate::errors::AppError;
use chrono::NaiveDateTime;
use log::debug;
use std::path::{Path, PathBuf};

const RECORDING_PREFIX: &str = "camera";

/// Name of a recording file: `camera_{id}_{YYYYMMDD_HHMMSS}.{ext}`.
pub fn recording_file_name(
    camera_id: CameraId,
    started_at: &NaiveDateTime,
    extension: &str,
) -> String {
    format!(
        "{}_{}_{}.{}",
        RECORDING_PREFIX,
        camera_id,
        timestamp_utils::format_recording_timestamp(started_at),
        extension
    )
}

/// Inverse of [`recording_file_name`]. Anything that does not split into exactly
/// `camera`, id, date and time tokens yields `None`.
pub fn parse_recording_file_name(
    file_name: &str,
    extension: &str,
) -> Option<(CameraId, NaiveDateTime)> {
    let stem = file_name.strip_suffix(extension)?.strip_suffix('.')?;
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() != 4 || parts[0] != RECORDING_PREFIX {
        return None;
    }
    let camera_id = parts[1].parse::<CameraId>().ok()?;
    let timestamp = timestamp_utils::parse_recording_timestamp(parts[2], parts[3])?;
    Some((camera_id, timestamp))
}

pub fn generate_timestamped_filename(
    base_name: &str,      // e.g., camera name
    timestamp_format: &str, // e.g., "%Y%m%d_%H%M%S"
    extension: &str,      // e.g., "jpg", "mjpeg"
) -> String {
    let timestamp = timestamp_utils::current_local_timestamp_str(timestamp_format);
    format!("{}_{}.{}", base_name, timestamp, extension)
}

pub fn ensure_output_directory(dir_path: &Path) -> Result<PathBuf, AppError> {
    if !dir_path.exists() {
        debug!(
            "Output directory '{}' does not exist, attempting to create it.",
            dir_path.display()
        );
        std::fs::create_dir_all(dir_path).map_err(|e| {
            AppError::Io(format!(
                "Failed to create output directory '{}': {}",
                dir_path.display(),
                e
            ))
        })?;
    } else if !dir_path.is_dir() {
        return Err(AppError::Io(format!(
            "Output path '{}' exists but is not a directory.",
            dir_path.display()
        )));
    }
    Ok(dir_path.to_path_buf())
}
