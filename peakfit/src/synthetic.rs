//! Synthetic plane series with known peaks, for demos and tests.

use common::Grid2;
use glam::DVec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::lineshape::PeakParams;
use crate::peaks::{PeakRecord, PeakTable};
use crate::spectrum::{AxisCalibration, SpatialAxis, SpectralCube, Unit};

/// A peak placed in a synthetic series.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticPeak {
    pub assignment: String,
    /// Shape and plane-0 amplitude, in points.
    pub params: PeakParams,
    /// Fit region half-size in points.
    pub radius: DVec2,
    /// Decay rate per unit delay.
    pub rate: f64,
}

impl SyntheticPeak {
    pub fn new(assignment: &str, params: PeakParams, radius: DVec2, rate: f64) -> Self {
        Self {
            assignment: assignment.to_string(),
            params,
            radius,
            rate,
        }
    }

    /// True amplitude after `delay`.
    #[inline]
    pub fn amplitude_at(&self, delay: f64) -> f64 {
        self.params.amplitude * (-self.rate * delay).exp()
    }
}

/// A generated cube together with its ppm peak table and ground truth.
#[derive(Debug, Clone)]
pub struct SyntheticSeries {
    pub cube: SpectralCube,
    pub table: PeakTable,
    pub delays: Vec<f64>,
    pub peaks: Vec<SyntheticPeak>,
}

impl SyntheticSeries {
    pub fn true_amplitude(&self, peak: usize, plane: usize) -> f64 {
        self.peaks[peak].amplitude_at(self.delays[plane])
    }
}

/// Typical ¹H (F2) and ¹⁵N (F1) calibrations for a `width x height` plane.
pub fn calibrations(width: usize, height: usize) -> (AxisCalibration, AxisCalibration) {
    let x = AxisCalibration::new(width, 8.0 * width as f64, 600.0, 8.0 * 600.0);
    let y = AxisCalibration::new(height, 12.0 * height as f64, 60.8, 118.0 * 60.8);
    (x, y)
}

/// Sum of `peaks` sampled on the pixel grid.
pub fn render_plane(width: usize, height: usize, peaks: &[PeakParams]) -> Grid2<f64> {
    Grid2::from_fn(width, height, |x, y| {
        peaks
            .iter()
            .map(|p| p.evaluate(x as f64, y as f64))
            .sum()
    })
}

/// Add zero-mean Gaussian noise with standard deviation `sigma` (Box-Muller).
pub fn add_noise(plane: &mut Grid2<f64>, sigma: f64, rng: &mut StdRng) {
    for chunk in plane.cells_mut().chunks_mut(2) {
        let u1: f64 = rng.random_range(1e-12..1.0);
        let u2: f64 = rng.random_range(0.0..1.0);
        let r = (-2.0 * u1.ln()).sqrt() * sigma;
        let theta = 2.0 * std::f64::consts::PI * u2;
        chunk[0] += r * theta.cos();
        if chunk.len() > 1 {
            chunk[1] += r * theta.sin();
        }
    }
}

/// Exponentially decaying series: plane `i` holds every peak at
/// [`SyntheticPeak::amplitude_at`]`(delays[i])`, plus noise when `noise > 0`.
pub fn relaxation_series(
    width: usize,
    height: usize,
    peaks: Vec<SyntheticPeak>,
    delays: Vec<f64>,
    noise: f64,
    seed: u64,
) -> Result<SyntheticSeries> {
    let mut rng = StdRng::seed_from_u64(seed);
    let planes = delays
        .iter()
        .map(|&delay| {
            let params: Vec<PeakParams> = peaks
                .iter()
                .map(|p| PeakParams {
                    amplitude: p.amplitude_at(delay),
                    ..p.params
                })
                .collect();
            let mut plane = render_plane(width, height, &params);
            if noise > 0.0 {
                add_noise(&mut plane, noise, &mut rng);
            }
            plane
        })
        .collect();

    let (x_cal, y_cal) = calibrations(width, height);
    let cube = SpectralCube::from_planes(planes, x_cal, y_cal)?;
    let records = peaks
        .iter()
        .map(|p| PeakRecord {
            assignment: Some(p.assignment.clone()),
            x: Some(cube.to_unit(p.params.center.x, SpatialAxis::X, Unit::Ppm)),
            y: Some(cube.to_unit(p.params.center.y, SpatialAxis::Y, Unit::Ppm)),
            x_radius: Some(cube.width_to_unit(p.radius.x, SpatialAxis::X, Unit::Ppm)),
            y_radius: Some(cube.width_to_unit(p.radius.y, SpatialAxis::Y, Unit::Ppm)),
            ..Default::default()
        })
        .collect();

    Ok(SyntheticSeries {
        cube,
        table: PeakTable::new(Unit::Ppm, records),
        delays,
        peaks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak() -> SyntheticPeak {
        SyntheticPeak::new(
            "A1N-H",
            PeakParams {
                amplitude: 500.0,
                center: DVec2::new(20.0, 12.0),
                sigma: DVec2::new(1.5, 1.5),
                fraction: 0.5,
            },
            DVec2::new(5.0, 4.0),
            0.5,
        )
    }

    #[test]
    fn test_series_planes_decay() {
        let series = relaxation_series(40, 24, vec![peak()], vec![0.0, 1.0, 2.0], 0.0, 1).unwrap();
        assert_eq!(series.cube.plane_count(), 3);
        let top = |i: usize| series.cube.plane(i).unwrap()[(20, 12)];
        assert!((top(0) - 500.0).abs() < 1e-9);
        assert!((top(1) - series.true_amplitude(0, 1)).abs() < 1e-9);
        assert!(top(2) < top(1));
    }

    #[test]
    fn test_table_round_trips_to_points() {
        let series = relaxation_series(40, 24, vec![peak()], vec![0.0], 0.0, 1).unwrap();
        let peaks = series.table.to_peaks(&series.cube).unwrap();
        assert!((peaks[0].center - DVec2::new(20.0, 12.0)).length() < 1e-9);
        assert!((peaks[0].radius - DVec2::new(5.0, 4.0)).length() < 1e-9);
    }

    #[test]
    fn test_noise_is_seeded() {
        let a = relaxation_series(16, 16, vec![], vec![0.0], 2.0, 7).unwrap();
        let b = relaxation_series(16, 16, vec![], vec![0.0], 2.0, 7).unwrap();
        assert_eq!(a.cube.planes(), b.cube.planes());
        let plane = a.cube.plane(0).unwrap();
        let mean = plane.iter().sum::<f64>() / plane.len() as f64;
        assert!(mean.abs() < 0.5);
        assert!(plane.iter().any(|&v| v != 0.0));
    }
}
