use anyhow::{Context, Result};
use clap::ArgMatches;
use log::{debug, info, warn};
use rnvr::camera_config::CameraConfig;
use rnvr::common::file_utils;
use rnvr::config_loader::MasterConfig;
use rnvr::engine::camera_manager::parse_camera_ids_arg;
use rnvr::Engine;
use std::path::PathBuf;
use std::time::Instant;

/// Cameras an operation should act on: the ids given with `--cameras`, or every
/// enabled camera when the flag is absent. Unknown ids are warned about and skipped.
pub fn determine_target_cameras(
    engine: &Engine,
    cameras_arg: Option<&String>,
    operation_display_name: &str,
) -> Result<Vec<CameraConfig>> {
    let select_start = Instant::now();
    let requested = parse_camera_ids_arg(cameras_arg)
        .with_context(|| format!("Invalid --cameras value for '{}'", operation_display_name))?;
    let targets = match requested {
        Some(ref ids) => {
            let found = engine.cameras().get_cameras_by_ids(ids);
            for id in ids {
                if !found.iter().any(|c| c.id == *id) {
                    warn!(
                        "⚠️ Camera {} is not configured; skipping it for '{}'.",
                        id, operation_display_name
                    );
                }
            }
            found
        }
        None => engine.cameras().enabled_cameras(),
    };
    debug!(
        "Selected {} camera(s) for '{}' in {:?} (requested: {:?})",
        targets.len(), operation_display_name, select_start.elapsed(), requested
    );
    if targets.is_empty() {
        warn!("⚠️ No cameras selected or available for '{}'.", operation_display_name);
    } else {
        info!("🎯 Targeting {} camera(s) for {}.", targets.len(), operation_display_name);
    }
    Ok(targets)
}

/// Output directory from `--<key>`, else the storage directory joined with
/// `default_subdir`. Created if missing.
pub fn determine_operation_output_dir(
    master_config: &MasterConfig,
    args: &ArgMatches,
    output_cli_arg_key: &str,
    default_subdir: Option<&str>,
    operation_display_name: &str,
) -> Result<PathBuf> {
    let dir = match args.get_one::<String>(output_cli_arg_key) {
        Some(path_str) => PathBuf::from(path_str),
        None => {
            let mut dir = master_config.app_settings.storage_path();
            if let Some(subdir) = default_subdir {
                dir.push(subdir);
            }
            dir
        }
    };
    if !dir.exists() {
        info!(
            "📁 Output directory {} does not exist. Creating it for '{}'.",
            dir.display(),
            operation_display_name
        );
    }
    file_utils::ensure_output_directory(&dir)
        .with_context(|| format!("❌ Unusable output directory for '{}'", operation_display_name))
}
