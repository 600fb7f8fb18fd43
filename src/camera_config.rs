use serde::Deserialize;

pub type CameraId = u32;

/// One entry of the camera listing. The engine only ever reads these.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CameraConfig {
    pub id: CameraId,
    pub name: String,
    pub source_url: String, // e.g. rtsp://10.0.0.5:554/stream1 or http://10.0.0.5/snapshot.jpg
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}
