pub mod app_config;
pub mod camera;
pub mod camera_config;
pub mod common;
pub mod config_loader;
pub mod engine;
pub mod errors;

pub use engine::{Engine, EngineSettings};
