use clap::{Arg, ArgAction, Command};
use log::debug;
use std::time::Instant;

fn cameras_arg(help: &'static str) -> Arg {
    Arg::new("cameras")
        .long("cameras")
        .value_name("CAM_IDS")
        .help(help)
        .action(ArgAction::Set)
}

pub fn build_cli() -> Command {
    debug!("⚙️ Building CLI interface...");
    let start_time = Instant::now();
    let cmd = Command::new("rnvr")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Records and live-previews multiple network cameras concurrently.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Sets a custom configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("run")
                .about(
                    "Records and streams every enabled camera until Ctrl-C, \
                     sweeping old recordings periodically",
                )
                .arg(cameras_arg("Comma-separated list of camera ids (default: all enabled)"))
                .arg(
                    Arg::new("no-preview")
                        .long("no-preview")
                        .help("Only record; do not start live capture")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("record")
                .about("Records the selected cameras for a fixed duration")
                .arg(cameras_arg(
                    "Comma-separated list of camera ids to record (default: all enabled)",
                ))
                .arg(
                    Arg::new("duration")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Recording duration in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("60")
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("snapshot")
                .about("Saves the first live frame of each selected camera as a JPEG")
                .arg(cameras_arg("Comma-separated list of camera ids (default: all enabled)"))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("DIR")
                        .help("Output directory for images")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_name("SECONDS")
                        .help("How long to wait for a frame")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30")
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("preview")
                .about("Writes live preview parts of one camera to a file")
                .arg(
                    Arg::new("camera")
                        .long("camera")
                        .value_name("CAM_ID")
                        .required(true)
                        .value_parser(clap::value_parser!(u32))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("parts")
                        .long("parts")
                        .value_name("N")
                        .help("Number of multipart parts to write")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("30")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help(
                            "Destination file \
                             (default: preview_<id>_<timestamp>.mjpeg in the storage directory)",
                        )
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("recordings")
                .about("Lists recordings, newest first")
                .arg(
                    Arg::new("camera")
                        .long("camera")
                        .value_name("CAM_ID")
                        .value_parser(clap::value_parser!(u32))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("date")
                        .long("date")
                        .value_name("YYYY-MM-DD")
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("cleanup")
                .about("Deletes recordings older than the retention window")
                .arg(
                    Arg::new("days")
                        .long("days")
                        .value_name("DAYS")
                        .help("Retention in days (default: from config)")
                        .value_parser(clap::value_parser!(u32))
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("test")
                .about("Probes every configured camera once and prints a summary")
                .arg(cameras_arg("Comma-separated list of camera ids to probe (default: all)")),
        );
    debug!("✅ CLI interface built in {:?}", start_time.elapsed());
    cmd
}
