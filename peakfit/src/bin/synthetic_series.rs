//! Fits a synthetic relaxation series end to end and prints a summary.
//!
//! Usage: `synthetic_series [config.yaml|config.json]`

use std::path::Path;

use anyhow::{Context, Result};
use glam::DVec2;
use peakfit::synthetic::{relaxation_series, SyntheticPeak};
use peakfit::{FitConfig, PeakFitter, PeakParams};

fn main() -> Result<()> {
    common::log_setup::setup_logging("info", "logs", "peakfit")?;

    let config = match std::env::args().nth(1) {
        Some(path) => FitConfig::from_file(Path::new(&path))
            .with_context(|| format!("loading config {path}"))?,
        None => FitConfig::default(),
    };

    let peak = |name: &str, x: f64, y: f64, amplitude: f64, rate: f64| {
        SyntheticPeak::new(
            name,
            PeakParams {
                amplitude,
                center: DVec2::new(x, y),
                sigma: DVec2::new(1.8, 1.4),
                fraction: 0.3,
            },
            DVec2::new(4.0, 3.5),
            rate,
        )
    };
    let peaks = vec![
        peak("G12N-H", 30.0, 20.0, 1200.0, 0.8),
        peak("K13N-H", 35.0, 21.0, 800.0, 1.5),
        peak("T40N-H", 80.0, 45.0, 1500.0, 0.4),
        peak("A41N-H", 100.0, 12.0, -600.0, 1.1),
    ];
    let delays: Vec<f64> = (0..8).map(|i| i as f64 * 0.25).collect();
    let series = relaxation_series(128, 64, peaks, delays.clone(), 5.0, 42)?;

    let config = FitConfig {
        vclist: Some(delays),
        ..config
    };
    let fitter = PeakFitter::new(config)?;
    let report = fitter.run(&series.cube, &series.table)?;

    println!(
        "{} clusters ({} fitted, {} skipped), {} rows, {} failed",
        report.clusters.len(),
        report.fitted_clusters,
        report.skipped_clusters.len(),
        report.rows.len(),
        report.failed_fits
    );
    println!(
        "{:<8} {:>3} {:>6} {:>10} {:>10} {:>8}",
        "peak", "cl", "delay", "amp", "true", "ok"
    );
    for row in &report.rows {
        let index = series
            .peaks
            .iter()
            .position(|p| p.assignment == row.assignment)
            .context("row for unknown peak")?;
        println!(
            "{:<8} {:>3} {:>6.2} {:>10.1} {:>10.1} {:>8}",
            row.assignment,
            row.cluster_id,
            row.vclist.unwrap_or_default(),
            row.amp,
            series.true_amplitude(index, row.plane),
            row.success
        );
    }

    Ok(())
}
