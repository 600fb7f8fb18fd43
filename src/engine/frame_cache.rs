//! Latest-frame cache for live preview, one slot per camera.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::camera_config::CameraId;

/// Cached frame entry. Immutable once published; a new frame replaces the whole `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameCacheEntry {
    pub camera_id: CameraId,
    /// JPEG bytes
    pub data: Bytes,
    pub captured_at: DateTime<Utc>,
    /// Increases by one with every publish for this camera.
    pub sequence: u64,
}

#[derive(Default)]
pub struct FrameCache {
    entries: RwLock<HashMap<CameraId, Arc<FrameCacheEntry>>>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the camera's entry. Returns the new sequence number.
    pub async fn publish(
        &self,
        camera_id: CameraId,
        data: Bytes,
        captured_at: DateTime<Utc>,
    ) -> u64 {
        let mut entries = self.entries.write().await;
        let sequence = entries.get(&camera_id).map(|e| e.sequence + 1).unwrap_or(1);
        let entry = FrameCacheEntry { camera_id, data, captured_at, sequence };
        entries.insert(camera_id, Arc::new(entry));
        sequence
    }

    pub async fn get(&self, camera_id: CameraId) -> Option<Arc<FrameCacheEntry>> {
        self.entries.read().await.get(&camera_id).cloned()
    }

    pub async fn remove(&self, camera_id: CameraId) -> bool {
        self.entries.write().await.remove(&camera_id).is_some()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of cameras with a cached frame.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_none_until_published() {
        let cache = FrameCache::new();
        assert!(cache.get(1).await.is_none());
        assert_eq!(cache.publish(1, Bytes::from_static(b"a"), Utc::now()).await, 1);
        assert_eq!(cache.publish(1, Bytes::from_static(b"b"), Utc::now()).await, 2);
        let entry = cache.get(1).await.unwrap();
        assert_eq!(entry.data, Bytes::from_static(b"b"));
        assert_eq!(entry.sequence, 2);
        assert!(cache.remove(1).await);
        assert!(!cache.remove(1).await);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_never_see_mixed_frames() {
        let cache = Arc::new(FrameCache::new());
        const FRAME_LEN: usize = 64 * 1024;

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for n in 0..200u32 {
                    let fill = (n % 251) as u8;
                    cache.publish(1, Bytes::from(vec![fill; FRAME_LEN]), Utc::now()).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            readers.push(tokio::spawn(async move {
                let mut last_seq = 0;
                for _ in 0..500 {
                    if let Some(entry) = cache.get(1).await {
                        let first = entry.data[0];
                        assert_eq!(entry.data.len(), FRAME_LEN);
                        assert!(
                            entry.data.iter().all(|b| *b == first),
                            "frame mixes bytes of two publishes"
                        );
                        assert!(entry.sequence >= last_seq, "sequence went backwards");
                        last_seq = entry.sequence;
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        for r in readers {
            r.await.unwrap();
        }
    }
}
