use serde::Deserialize;
use std::fs;
use std::path::Path;
use crate::app_config::ApplicationConfig;
use crate::camera_config::CameraConfig;
use anyhow::{Result, Context, bail};
use std::collections::HashSet;
use log::{debug, info, warn};
use std::time::Instant;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MasterConfig {
    #[serde(rename = "application", default)]
    pub app_settings: ApplicationConfig,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

pub fn load_config(path: &str) -> Result<MasterConfig> {
    debug!("📄 Attempting to load config from: {}", path);
    let start_time = Instant::now();

    if !Path::new(path).exists() {
        warn!("⚠️ Configuration file '{}' not found. Using defaults with no cameras.", path);
        let config = MasterConfig::default();
        validate_master_config(&config)
            .with_context(|| "Default configuration validation failed 👎")?;
        return Ok(config);
    }

    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file '{}'. 📖", path))?;
    debug!("Read config file in {:?}", start_time.elapsed());

    let config = parse_config(&config_str)
        .with_context(|| format!("Failed to load configuration from '{}'", path))?;

    info!(
        "✅ Successfully loaded and validated configuration from '{}' in {:?}",
        path,
        start_time.elapsed()
    );
    Ok(config)
}

pub fn parse_config(config_str: &str) -> Result<MasterConfig> {
    let parse_start_time = Instant::now();
    let config: MasterConfig = serde_yaml::from_str(config_str)
        .with_context(|| "Failed to parse YAML configuration. 💔")?;
    debug!("Parsed YAML in {:?}", parse_start_time.elapsed());

    validate_master_config(&config).with_context(|| "Master configuration validation failed 👎")?;
    Ok(config)
}

fn is_positive_finite(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

fn validate_master_config(config: &MasterConfig) -> Result<()> {
    debug!("🕵️ Validating master configuration...");
    let validation_start_time = Instant::now();
    let settings = &config.app_settings;

    if settings.storage_directory.is_empty() {
        bail!("❌ Application storage_directory cannot be empty.");
    }
    let storage_path = Path::new(&settings.storage_directory);
    if !storage_path.exists() {
        debug!(
            "Storage directory '{}' does not exist. Attempting to create it.",
            settings.storage_directory
        );
        fs::create_dir_all(storage_path)
            .with_context(|| {
                format!(
                    "Storage directory '{}' is not writable or cannot be created 📂💥",
                    settings.storage_directory
                )
            })?;
        info!("📁 Created storage directory: {}", settings.storage_directory);
    } else if !storage_path.is_dir() {
        bail!(
            "❌ Storage directory '{}' exists but is not a directory.",
            settings.storage_directory
        );
    }

    if settings.container_format.is_empty()
        || settings.container_format.contains(&['.', '/', '\\', '_'][..])
    {
        bail!(
            "❌ container_format '{}' must be a bare extension such as 'mjpeg' or 'mp4'.",
            settings.container_format
        );
    }
    // Every one of these ends up in a `Duration`, which panics on NaN and infinity.
    if !is_positive_finite(settings.preview_fps)
        || !is_positive_finite(settings.recording_fps)
        || !is_positive_finite(1.0 / settings.preview_fps)
        || !is_positive_finite(1.0 / settings.recording_fps)
    {
        bail!("❌ preview_fps and recording_fps must be positive numbers.");
    }
    if !(settings.retry_backoff_secs.is_finite() && settings.retry_backoff_secs >= 0.0)
        || !is_positive_finite(settings.stop_timeout_secs)
    {
        bail!("❌ retry_backoff_secs must be >= 0 and stop_timeout_secs must be positive.");
    }
    if matches!(settings.io_timeout_secs, Some(t) if !is_positive_finite(t)) {
        bail!("❌ io_timeout_secs must be positive when set.");
    }
    if settings.jpeg_quality == 0 || settings.jpeg_quality > 100 {
        bail!("❌ jpeg_quality must be within 1..=100, got {}.", settings.jpeg_quality);
    }

    if config.cameras.is_empty() {
        warn!(
            "⚠️ No cameras defined in the configuration. \
             This might be intentional for some operations."
        );
    }

    let mut camera_ids = HashSet::new();
    for (idx, camera) in config.cameras.iter().enumerate() {
        debug!("Validating camera #{}: {} (id {})", idx + 1, camera.name, camera.id);
        if camera.id == 0 {
            bail!("❌ Camera id must be non-zero for camera #{} ('{}').", idx + 1, camera.name);
        }
        if !camera_ids.insert(camera.id) {
            bail!("❌ Duplicate camera id found: {}", camera.id);
        }
        if camera.name.is_empty() {
            bail!("❌ Camera name cannot be empty for camera #{}.", idx + 1);
        }
        if camera.source_url.is_empty() {
            bail!("❌ source_url for camera '{}' cannot be empty.", camera.name);
        }
        if !camera.source_url.contains("://") {
            bail!(
                "❌ source_url '{}' for camera '{}' has no scheme.",
                camera.source_url,
                camera.name
            );
        }
        debug!("Camera '{}' validated successfully.", camera.name);
    }
    info!(
        "👍 Master configuration validated successfully in {:?}.",
        validation_start_time.elapsed()
    );
    Ok(())
}
