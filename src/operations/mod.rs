pub mod diagnostic_op;
pub mod image_capture_op;
pub mod op_helper;
pub mod preview_op;
pub mod recordings_op;
pub mod serve_op;
pub mod video_record_op;
