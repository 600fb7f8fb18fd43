use anyhow::{Context, Result};
use env_logger::{Builder, Env};
use log::LevelFilter;
use crate::config_loader::MasterConfig;

pub fn initialize_logging(
    config: Option<&MasterConfig>,
    cli_matches: &clap::ArgMatches,
) -> Result<()> {
    let mut builder = Builder::new();

    // Determine log level from CLI, then config, then default
    let log_level_str = if cli_matches.get_flag("debug") {
        "debug".to_string()
    } else {
        config
            .and_then(|c| c.app_settings.log_level.clone())
            .unwrap_or_else(|| "info".to_string()) // Default log level
    };

    let mut unrecognized = None;
    match log_level_str.to_lowercase().as_str() {
        "error" => builder.filter_level(LevelFilter::Error),
        "warn" => builder.filter_level(LevelFilter::Warn),
        "info" => builder.filter_level(LevelFilter::Info),
        "debug" => builder.filter_level(LevelFilter::Debug),
        "trace" => builder.filter_level(LevelFilter::Trace),
        s => {
            unrecognized = Some(s.to_string());
            builder.filter_level(LevelFilter::Info)
        }
    };

    // RUST_LOG, when present, refines the level picked above
    builder.parse_env(Env::default());

    builder.try_init().context("Failed to initialize logger")?;
    if let Some(s) = unrecognized {
        log::warn!("Unrecognized log level '{}', defaulting to info.", s);
    }
    log::debug!("Logging initialized with level: {}", log_level_str);
    Ok(())
}
