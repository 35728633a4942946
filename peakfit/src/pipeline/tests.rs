//! End-to-end tests on synthetic series.

use glam::DVec2;

use super::*;
use crate::config::{ClusterConfig, ClusterSource};
use crate::lineshape::PeakParams;
use crate::synthetic::{relaxation_series, SyntheticPeak, SyntheticSeries};

const WIDTH: usize = 48;
const HEIGHT: usize = 32;

fn peak(name: &str, x: f64, y: f64, amplitude: f64, rate: f64) -> SyntheticPeak {
    SyntheticPeak::new(
        name,
        PeakParams {
            amplitude,
            center: DVec2::new(x, y),
            sigma: DVec2::splat(1.5),
            fraction: 0.5,
        },
        DVec2::splat(3.0),
        rate,
    )
}

/// A close pair on row 16 and an isolated peak on row 6.
fn series(noise: f64) -> SyntheticSeries {
    relaxation_series(
        WIDTH,
        HEIGHT,
        vec![
            peak("A1N-H", 18.0, 16.0, 1000.0, 0.3),
            peak("A2N-H", 23.0, 16.0, 700.0, 0.8),
            peak("B7N-H", 38.0, 6.0, 900.0, 0.5),
        ],
        vec![0.0, 1.0, 2.0],
        noise,
        11,
    )
    .unwrap()
}

/// Explicit threshold at a fifth of the strongest summed peak.
fn config(series: &SyntheticSeries) -> FitConfig {
    let reference = series.cube.summed_planes();
    let max = reference.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    FitConfig {
        cluster: ClusterSource::Segment(ClusterConfig {
            threshold: Some(0.2 * max),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn assert_rel(actual: f64, expected: f64, tol: f64) {
    let rel = ((actual - expected) / expected).abs();
    assert!(rel < tol, "{actual} vs {expected} (rel {rel:.2e})");
}

#[test]
fn test_overlapping_pair_amplitudes_recovered() {
    let series = series(0.0);
    let fitter = PeakFitter::new(config(&series)).unwrap();
    let report = fitter.run(&series.cube, &series.table).unwrap();

    assert_eq!(report.clusters.len(), 2);
    assert_eq!(report.peaks[0].cluster_id, report.peaks[1].cluster_id);
    assert_eq!(report.peaks[0].member_count, 2);
    assert_eq!(report.peaks[2].member_count, 1);
    assert_eq!(report.fitted_clusters, 2);
    assert_eq!(report.failed_fits, 0);
    assert_eq!(report.rows.len(), 3 * 3);

    for row in &report.rows {
        let index = series
            .peaks
            .iter()
            .position(|p| p.assignment == row.assignment)
            .unwrap();
        assert!(row.success, "{} plane {}", row.assignment, row.plane);
        assert_rel(row.amp, series.true_amplitude(index, row.plane), 1e-3);
    }
    assert!(report.peaks.iter().all(|p| p.estimate.is_some()));
}

#[test]
fn test_oversized_cluster_skipped() {
    let series = series(0.0);
    let mut config = config(&series);
    config.max_cluster_size = Some(1);
    let report = PeakFitter::new(config)
        .unwrap()
        .run(&series.cube, &series.table)
        .unwrap();

    let pair_id = report.peaks[0].cluster_id;
    assert_eq!(report.skipped_clusters, vec![pair_id]);
    assert_eq!(report.fitted_clusters, 1);
    assert!(report.rows.iter().all(|r| r.cluster_id != pair_id));
    assert_eq!(report.rows.len(), 3);
    assert!(report.rows.iter().all(|r| r.assignment == "B7N-H"));
    // Skipped peaks keep their id but get no estimate.
    assert!(report.peaks[0].estimate.is_none());
}

#[test]
fn test_rows_ordered_and_within_bounds() {
    let series = series(0.0);
    let report = PeakFitter::new(config(&series))
        .unwrap()
        .run(&series.cube, &series.table)
        .unwrap();

    let keys: Vec<(u32, usize)> = report.rows.iter().map(|r| (r.cluster_id, r.plane)).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);

    // Isolated peak on row 6 comes first in raster order.
    assert_eq!(report.rows[0].assignment, "B7N-H");
    let pair_plane0: Vec<&str> = report
        .rows
        .iter()
        .filter(|r| r.plane == 0 && r.member_count == 2)
        .map(|r| r.assignment.as_str())
        .collect();
    assert_eq!(pair_plane0, vec!["A1N-H", "A2N-H"]);

    for row in report.rows.iter().filter(|r| r.success) {
        assert!((0.0..=1.0).contains(&row.fraction));
        assert!(row.sigma_x > 0.0 && row.sigma_y > 0.0);
    }
}

#[test]
fn test_row_units_consistent() {
    let series = series(0.0);
    let cube = &series.cube;
    let report = PeakFitter::new(config(&series))
        .unwrap()
        .run(cube, &series.table)
        .unwrap();

    for row in &report.rows {
        assert_eq!(row.fwhm_x, 2.0 * row.sigma_x);
        assert!((row.center_x_ppm - cube.to_unit(row.center_x, SpatialAxis::X, Unit::Ppm)).abs() < 1e-12);
        assert!((row.center_y_hz - cube.to_unit(row.center_y, SpatialAxis::Y, Unit::Hz)).abs() < 1e-9);
        assert!((row.fwhm_y_hz - row.fwhm_y * cube.hz_per_point(SpatialAxis::Y)).abs() < 1e-9);
        assert!((row.x_radius - 3.0).abs() < 1e-9);
        assert_eq!(row.lineshape, Lineshape::PseudoVoigt);
        assert_eq!(row.fit_prefix, format!("_{}_", row.assignment.replace('-', "_")));
    }
    let first = report.rows_for_plane(0).find(|r| r.assignment == "A1N-H").unwrap();
    assert!((first.init_center_x - 18.0).abs() < 1e-9);
    assert!((first.init_center_y - 16.0).abs() < 1e-9);
}

#[test]
fn test_vclist_copied_and_checked() {
    let series = series(0.0);
    let mut config = config(&series);
    config.vclist = Some(vec![0.0, 10.0, 20.0]);
    let report = PeakFitter::new(config.clone())
        .unwrap()
        .run(&series.cube, &series.table)
        .unwrap();
    assert!(report.rows.iter().all(|r| r.vclist == Some(r.plane as f64 * 10.0)));

    config.vclist = Some(vec![0.0, 10.0]);
    let err = PeakFitter::new(config)
        .unwrap()
        .run(&series.cube, &series.table)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::VclistMismatch {
            expected: 3,
            actual: 2
        }
    ));
}

#[test]
fn test_failed_cluster_does_not_stop_run() {
    let mut series = series(0.0);
    // A sub-point radius leaves the isolated peak a single-pixel region.
    let radius_x = series.cube.width_to_unit(0.3, SpatialAxis::X, Unit::Ppm);
    let radius_y = series.cube.width_to_unit(0.3, SpatialAxis::Y, Unit::Ppm);
    let record = &mut series.table.records[2];
    record.x_radius = Some(radius_x);
    record.y_radius = Some(radius_y);

    let report = PeakFitter::new(config(&series))
        .unwrap()
        .run(&series.cube, &series.table)
        .unwrap();

    assert_eq!(report.fitted_clusters, 2);
    assert_eq!(report.rows.len(), 3 * 3);
    assert_eq!(report.failed_fits, 3);
    for row in &report.rows {
        assert_eq!(row.success, row.assignment != "B7N-H", "{} plane {}", row.assignment, row.plane);
    }
    let index = |name: &str| series.peaks.iter().position(|p| p.assignment == name).unwrap();
    for row in report.rows.iter().filter(|r| r.success) {
        assert_rel(row.amp, series.true_amplitude(index(&row.assignment), row.plane), 1e-3);
    }
}

#[test]
fn test_clusters_from_table() {
    let mut series = series(0.0);
    for (record, id) in series.table.records.iter_mut().zip([7, 7, 3]) {
        record.cluster_id = Some(id);
    }
    let config = FitConfig {
        cluster: ClusterSource::FromTable,
        ..Default::default()
    };
    let report = PeakFitter::new(config)
        .unwrap()
        .run(&series.cube, &series.table)
        .unwrap();

    let ids: Vec<u32> = report.clusters.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![3, 7]);
    assert!(report.threshold.is_none());
    assert_eq!(report.rows[0].cluster_id, 3);
    assert_eq!(report.failed_fits, 0);
}

#[test]
fn test_noisy_series_close_to_truth() {
    let series = series(2.0);
    let report = PeakFitter::new(config(&series))
        .unwrap()
        .run(&series.cube, &series.table)
        .unwrap();

    for row in &report.rows {
        let index = series
            .peaks
            .iter()
            .position(|p| p.assignment == row.assignment)
            .unwrap();
        assert!(row.success);
        assert!(row.amp_err.is_some());
        assert_rel(row.amp, series.true_amplitude(index, row.plane), 0.05);
    }
}

#[test]
fn test_invalid_config_refused() {
    let config = FitConfig {
        max_cluster_size: Some(0),
        ..Default::default()
    };
    assert!(matches!(PeakFitter::new(config), Err(Error::InvalidConfig(_))));
}
