//! Live preview as an endless `multipart/x-mixed-replace` body.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream};
use std::sync::Arc;
use std::time::Duration;

use crate::camera_config::CameraId;
use crate::engine::frame_cache::FrameCache;

pub const PREVIEW_BOUNDARY: &str = "frame";

/// How long to wait before looking again when the camera has no cached frame.
pub const NO_FRAME_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn preview_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", PREVIEW_BOUNDARY)
}

/// One body part: boundary line, JPEG content type, blank line, payload, CRLF.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", PREVIEW_BOUNDARY);
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part.freeze()
}

/// Yields the camera's latest cached frame as a multipart part, one per
/// `frame_interval`. While nothing is cached it keeps polling; it never ends on its
/// own, and dropping it is how a consumer disconnects.
pub fn preview_stream(
    cache: Arc<FrameCache>,
    camera_id: CameraId,
    frame_interval: Duration,
) -> impl Stream<Item = Bytes> + Send + 'static {
    stream::unfold(true, move |first| {
        let cache = cache.clone();
        async move {
            if !first {
                tokio::time::sleep(frame_interval).await;
            }
            loop {
                if let Some(entry) = cache.get(camera_id).await {
                    return Some((multipart_part(&entry.data), false));
                }
                tokio::time::sleep(NO_FRAME_POLL_INTERVAL).await;
            }
        }
    })
}
