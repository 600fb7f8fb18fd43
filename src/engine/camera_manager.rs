use crate::camera_config::{CameraConfig, CameraId};
use crate::config_loader::MasterConfig;
use crate::errors::AppError;
use anyhow::{Result, bail};
use log::{info, debug};
use std::collections::BTreeMap;
use std::time::Instant;

/// Read-only view of the configured cameras. The engine never mutates it.
#[derive(Debug, Clone, Default)]
pub struct CameraManager {
    cameras: BTreeMap<CameraId, CameraConfig>,
}

impl CameraManager {
    pub fn new(master_config: &MasterConfig) -> Result<Self> {
        Self::from_cameras(master_config.cameras.iter().cloned())
    }

    pub fn from_cameras(configs: impl IntoIterator<Item = CameraConfig>) -> Result<Self> {
        debug!("🛠️ Initializing CameraManager...");
        let start_time = Instant::now();
        let mut cameras = BTreeMap::new();
        for (idx, cam_config) in configs.into_iter().enumerate() {
            debug!(
                "  Processing camera config #{}: {} (id {})",
                idx + 1,
                cam_config.name,
                cam_config.id
            );
            if cameras.contains_key(&cam_config.id) {
                bail!("❌ Duplicate camera id found in configuration: {}", cam_config.id);
            }
            cameras.insert(cam_config.id, cam_config);
        }
        info!(
            "✅ CameraManager initialized with {} cameras in {:?}.",
            cameras.len(),
            start_time.elapsed()
        );
        Ok(CameraManager { cameras })
    }

    pub fn get_camera(&self, camera_id: CameraId) -> Result<&CameraConfig, AppError> {
        self.cameras
            .get(&camera_id)
            .ok_or_else(|| AppError::NotFound(format!("camera {}", camera_id)))
    }

    pub fn get_all_cameras(&self) -> Vec<CameraConfig> {
        self.cameras.values().cloned().collect()
    }

    pub fn enabled_cameras(&self) -> Vec<CameraConfig> {
        self.cameras.values().filter(|c| c.enabled).cloned().collect()
    }

    pub fn get_cameras_by_ids(&self, ids: &[CameraId]) -> Vec<CameraConfig> {
        debug!("📷 Retrieving cameras by ids: {:?}", ids);
        let mut result = Vec::new();
        for id in ids {
            match self.cameras.get(id) {
                Some(cam) => result.push(cam.clone()),
                None => debug!("  Camera not found: {}", id),
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

// Helper to parse comma-separated camera ids from CLI
pub fn parse_camera_ids_arg(ids_str_opt: Option<&String>) -> Result<Option<Vec<CameraId>>> {
    debug!("📝 Parsing camera ids argument: {:?}", ids_str_opt);
    let Some(ids_str) = ids_str_opt else {
        return Ok(None);
    };
    let mut ids = Vec::new();
    for part in ids_str.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match part.parse::<CameraId>() {
            Ok(id) => ids.push(id),
            Err(_) => bail!("❌ '{}' is not a valid camera id", part),
        }
    }
    Ok(Some(ids))
}
