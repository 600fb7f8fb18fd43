use anyhow::Result;
use clap::ArgMatches;
use futures::future::join_all;
use log::{error, info, warn};
use rnvr::Engine;
use std::time::Instant;

use crate::operations::op_helper;

struct DiagnosticResult {
    test_name: String,
    success: bool,
    details: String,
}

/// Opens every selected camera once, reads one frame, and prints a pass/fail summary.
pub async fn handle_diagnostic_cli(engine: &Engine, args: &ArgMatches) -> Result<()> {
    let overall_diag_start_time = Instant::now();
    info!("🩺 Starting diagnostic test suite...");

    let cameras = match args.get_one::<String>("cameras") {
        Some(ids) => op_helper::determine_target_cameras(engine, Some(ids), "Diagnostics")?,
        None => engine.cameras().get_all_cameras(),
    };
    if cameras.is_empty() {
        warn!("⚠️ DIAGNOSTIC: No cameras configured. Nothing to test.");
        return Ok(());
    }

    let probes = cameras.iter().map(|cam| async move {
        let probe_start = Instant::now();
        let outcome = engine.probe(cam.id, &cam.source_url).await;
        (cam, outcome, probe_start.elapsed())
    });
    let mut results: Vec<DiagnosticResult> = Vec::new();
    for (cam, outcome, took) in join_all(probes).await {
        let test_name = format!("Stream probe (camera {} '{}')", cam.id, cam.name);
        match outcome {
            Ok((width, height)) => {
                info!(
                    "    DIAGNOSTIC [{}]: probe PASSED in {:?}: {}x{}",
                    cam.name, took, width, height
                );
                results.push(DiagnosticResult {
                    test_name,
                    success: true,
                    details: format!("{}x{} in {:?}", width, height, took),
                });
            }
            Err(e) => {
                error!("    DIAGNOSTIC [{}]: probe FAILED in {:?}: {}", cam.name, took, e);
                results.push(DiagnosticResult {
                    test_name,
                    success: false,
                    details: e.to_string(),
                });
            }
        }
    }

    println!("\n--- Diagnostic Summary ---");
    let mut passed = 0;
    for result in &results {
        let mark = if result.success { "✅ PASS" } else { "❌ FAIL" };
        println!("{} {}: {}", mark, result.test_name, result.details);
        if result.success {
            passed += 1;
        }
    }
    println!("--------------------------");
    info!(
        "🏁 Diagnostics finished in {:?}: {}/{} passed.",
        overall_diag_start_time.elapsed(), passed, results.len()
    );
    if passed < results.len() {
        anyhow::bail!("{} camera probe(s) failed", results.len() - passed);
    }
    Ok(())
}
