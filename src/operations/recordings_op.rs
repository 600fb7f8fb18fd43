use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::ArgMatches;
use log::info;
use rnvr::config_loader::MasterConfig;
use rnvr::Engine;

pub async fn handle_list_cli(engine: &Engine, args: &ArgMatches) -> Result<()> {
    let camera_id = args.get_one::<u32>("camera").copied();
    let date = args
        .get_one::<String>("date")
        .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
        .transpose()
        .context("--date must be YYYY-MM-DD")?;

    let recordings = engine.list_recordings(camera_id, date).await;
    info!("🗂️ {} recording(s) in {}", recordings.len(), engine.storage_dir().display());
    for entry in &recordings {
        println!(
            "{}\tcamera {}\t{}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.camera_id,
            entry.filepath.display()
        );
    }
    Ok(())
}

pub async fn handle_cleanup_cli(
    master_config: &MasterConfig,
    engine: &Engine,
    args: &ArgMatches,
) -> Result<()> {
    let days = args
        .get_one::<u32>("days")
        .copied()
        .unwrap_or(master_config.app_settings.retention_days);
    let report = engine.cleanup_report(days).await;
    println!(
        "Deleted {} recording(s) older than {} day(s); {} failure(s).",
        report.deleted, days, report.failed
    );
    Ok(())
}
