mod cli;
mod operations;

use anyhow::{bail, Context, Result};
use log::{debug, error, info};
use rnvr::common::logging_setup;
use rnvr::config_loader;
use rnvr::Engine;
use std::time::Instant;

const DEFAULT_CONFIG_PATH: &str = "config/rnvr.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let main_start_time = Instant::now();
    let matches = cli::build_cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_CONFIG_PATH);
    let config_load_start_time = Instant::now();
    let master_config = match config_loader::load_config(config_path) {
        Ok(cfg) => {
            logging_setup::initialize_logging(Some(&cfg), &matches)
                .context("Failed to initialize logging with full config")?;
            info!(
                "✅ Configuration loaded from: {} in {:?}",
                config_path,
                config_load_start_time.elapsed()
            );
            cfg
        }
        Err(e) => {
            logging_setup::initialize_logging(None, &matches)
                .context(
                    "Failed to initialize logging with basic settings after config load failure",
                )?;
            error!("❌ Failed to load configuration from '{}': {:#}. Exiting.", config_path, e);
            return Err(e.context(format!("Failed to load configuration from '{}'", config_path)));
        }
    };

    info!("🚀 rnvr starting with {} cameras configured.", master_config.cameras.len());
    let engine = Engine::from_config(&master_config).context("Failed to initialize the engine")?;

    let Some((operation_name, sub_matches)) = matches.subcommand() else {
        info!("🤔 No subcommand provided. See --help for the available operations.");
        return Ok(());
    };
    debug!("🎬 Dispatching to subcommand: {}", operation_name);
    let op_start_time = Instant::now();

    let op_result: Result<()> = match operation_name {
        "run" => operations::serve_op::handle_run_cli(&master_config, &engine, sub_matches).await,
        "record" => operations::video_record_op::handle_record_cli(&engine, sub_matches).await,
        "snapshot" => {
            operations::image_capture_op::handle_snapshot_cli(&master_config, &engine, sub_matches)
                .await
        }
        "preview" => operations::preview_op::handle_preview_cli(&engine, sub_matches).await,
        "recordings" => operations::recordings_op::handle_list_cli(&engine, sub_matches).await,
        "cleanup" => {
            operations::recordings_op::handle_cleanup_cli(&master_config, &engine, sub_matches)
                .await
        }
        "test" => operations::diagnostic_op::handle_diagnostic_cli(&engine, sub_matches).await,
        other => bail!("Subcommand '{}' not implemented.", other),
    };

    if let Err(e) = op_result {
        error!(
            "❌ Operation '{}' failed after {:?}: {:#}",
            operation_name,
            op_start_time.elapsed(),
            e
        );
        engine.shutdown().await;
        return Err(e);
    }
    info!(
        "✅ Operation '{}' completed successfully in {:?}.",
        operation_name,
        op_start_time.elapsed()
    );
    info!("🏁 rnvr finished in {:?}.", main_start_time.elapsed());
    Ok(())
}
