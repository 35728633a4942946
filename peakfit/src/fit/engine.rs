//! Three-stage composite fit of one cluster across the plane series.
//!
//! 1. Reference fit: every parameter free (except a family-pinned fraction)
//!    against the reference plane.
//! 2. Freeze the configured parameter classes at their reference values.
//! 3. Refit every plane warm-started from the reference values.

use common::Grid2;
use glam::DVec2;
use rayon::prelude::*;

use super::lm::{optimize, LmConfig, LmResult, Samples, Termination};
use super::params::ParameterSet;
use crate::config::{FitConfig, Lineshape, ParameterClass};
use crate::lineshape::{
    CompositeModel, PeakParams, AMPLITUDE, CENTER_X, CENTER_Y, FRACTION, PARAMS_PER_PEAK,
    SIGMA_X, SIGMA_Y,
};
use crate::mask::cluster_mask;
use crate::peaks::Peak;
use crate::spectrum::{SpatialAxis, SpectralCube};

/// Smallest allowed width, in points.
pub const SIGMA_MIN: f64 = 0.01;

/// Starting fraction when the lineshape family leaves it free.
pub const INITIAL_FRACTION: f64 = 0.5;

// ============================================================================
// Settings
// ============================================================================

/// Engine settings resolved against a concrete cube.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub lineshape: Lineshape,
    /// Classes frozen after the reference fit.
    pub frozen: Vec<ParameterClass>,
    /// Maximum center displacement from the seed, in points.
    pub center_bounds: Option<DVec2>,
    /// Upper width bound, in points.
    pub sigma_max: f64,
    pub solver: LmConfig,
}

impl EngineSettings {
    pub fn new(config: &FitConfig, cube: &SpectralCube) -> Self {
        let center_bounds = config.xy_bounds.map(|[bx, by]| {
            DVec2::new(
                bx * cube.points_per_ppm(SpatialAxis::X),
                by * cube.points_per_ppm(SpatialAxis::Y),
            )
        });
        Self {
            lineshape: config.lineshape,
            frozen: config.fix.clone(),
            center_bounds,
            sigma_max: cube.width().max(cube.height()) as f64,
            solver: config.solver.clone(),
        }
    }

    fn frozen_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::new();
        for class in &self.frozen {
            match class {
                ParameterClass::Fraction => offsets.push(FRACTION),
                ParameterClass::Sigma => offsets.extend([SIGMA_X, SIGMA_Y]),
                ParameterClass::Center => offsets.extend([CENTER_X, CENTER_Y]),
            }
        }
        offsets
    }
}

// ============================================================================
// Fit region
// ============================================================================

/// Pixel coordinates of a cluster's fit region, extracted once per cluster.
#[derive(Debug, Clone, Default)]
pub struct FitRegion {
    x: Vec<f64>,
    y: Vec<f64>,
    cells: Vec<usize>,
}

impl FitRegion {
    pub fn from_mask(mask: &Grid2<bool>) -> Self {
        let mut region = Self::default();
        for ((x, y), &set) in mask.indexed_iter() {
            if set {
                region.x.push(x as f64);
                region.y.push(y as f64);
                region.cells.push(mask.index_of(x, y));
            }
        }
        region
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Data values of `plane` at the region's pixels.
    pub fn values(&self, plane: &Grid2<f64>) -> Vec<f64> {
        self.cells.iter().map(|&i| plane.cells()[i]).collect()
    }

    fn samples<'a>(&'a self, z: &'a [f64]) -> Samples<'a> {
        Samples {
            x: &self.x,
            y: &self.y,
            z,
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// Fit of one peak on one plane.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    /// Peak index.
    pub peak: usize,
    pub plane: usize,
    pub params: PeakParams,
    /// Standard errors in block order, `None` for fixed parameters.
    pub std_errors: [Option<f64>; PARAMS_PER_PEAK],
    pub success: bool,
}

impl FitResult {
    #[inline]
    pub fn amplitude_error(&self) -> Option<f64> {
        self.std_errors[AMPLITUDE]
    }
}

/// All fits of one cluster.
#[derive(Debug, Clone)]
pub struct ClusterFit {
    /// Reference-plane estimates in member order.
    pub estimates: Vec<PeakParams>,
    pub reference_termination: Termination,
    pub pixel_count: usize,
    /// Per-plane results, `planes[plane][member]`.
    pub planes: Vec<Vec<FitResult>>,
}

impl ClusterFit {
    pub fn failed_count(&self) -> usize {
        self.planes
            .iter()
            .flatten()
            .filter(|r| !r.success)
            .count()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Starting parameters and bounds for the reference fit.
pub fn initial_parameters(
    settings: &EngineSettings,
    members: &[&Peak],
    reference: &Grid2<f64>,
) -> ParameterSet {
    let initial: Vec<PeakParams> = members
        .iter()
        .map(|peak| {
            let (px, py) = peak.pixel();
            PeakParams {
                amplitude: reference[(px, py)],
                center: peak.center,
                sigma: peak
                    .seed_sigma
                    .clamp(DVec2::splat(SIGMA_MIN), DVec2::splat(settings.sigma_max)),
                fraction: settings
                    .lineshape
                    .pinned_fraction()
                    .unwrap_or(INITIAL_FRACTION),
            }
        })
        .collect();

    let mut params = ParameterSet::new(CompositeModel::pack(&initial));
    for (k, peak) in members.iter().enumerate() {
        let base = k * PARAMS_PER_PEAK;
        if let Some(bounds) = settings.center_bounds {
            params.set_bounds(
                base + CENTER_X,
                peak.center.x - bounds.x,
                peak.center.x + bounds.x,
            );
            params.set_bounds(
                base + CENTER_Y,
                peak.center.y - bounds.y,
                peak.center.y + bounds.y,
            );
        }
        params.set_bounds(base + SIGMA_X, SIGMA_MIN, settings.sigma_max);
        params.set_bounds(base + SIGMA_Y, SIGMA_MIN, settings.sigma_max);
        params.set_bounds(base + FRACTION, 0.0, 1.0);
        if let Some(fraction) = settings.lineshape.pinned_fraction() {
            params.fix_at(base + FRACTION, fraction);
        }
    }
    params
}

/// Run the three-stage protocol for one cluster.
///
/// `members` are the cluster's peaks in member order; `reference` is the
/// plane used for the shape fit and `planes` the series to quantify.
pub fn fit_cluster(
    settings: &EngineSettings,
    members: &[&Peak],
    reference: &Grid2<f64>,
    planes: &[Grid2<f64>],
) -> ClusterFit {
    let mask = cluster_mask(reference.width(), reference.height(), members.iter().copied());
    let region = FitRegion::from_mask(&mask);
    let model = CompositeModel::new(members.len());

    // Stage 1
    let mut params = initial_parameters(settings, members, reference);
    let z = region.values(reference);
    let stage1 = optimize(&model, region.samples(&z), &params, &settings.solver);
    let estimates = CompositeModel::unpack(&stage1.params);

    let stage1_finite = stage1.params.iter().all(|v| v.is_finite());
    if !stage1_finite {
        tracing::warn!(
            "Reference fit of cluster with {} members produced non-finite values ({:?}); \
             marking all planes failed",
            members.len(),
            stage1.termination
        );
        let planes = (0..planes.len())
            .map(|plane| failed_results(members, plane, &estimates))
            .collect();
        return ClusterFit {
            estimates,
            reference_termination: stage1.termination,
            pixel_count: region.len(),
            planes,
        };
    }
    if !stage1.converged() {
        tracing::warn!(
            "Reference fit of {} did not converge ({:?} after {} iterations); continuing",
            member_names(members),
            stage1.termination,
            stage1.iterations
        );
    }

    // Stage 2
    params.set_values(&stage1.params);
    let frozen = settings.frozen_offsets();
    for k in 0..members.len() {
        for &offset in &frozen {
            params.fix(k * PARAMS_PER_PEAK + offset);
        }
    }

    // Stage 3
    let results = planes
        .par_iter()
        .enumerate()
        .map(|(plane_index, plane)| {
            let z = region.values(plane);
            let result = optimize(&model, region.samples(&z), &params, &settings.solver);
            tracing::debug!(
                "Plane {} of {}: {:?} after {} iterations, chi2 {:.4e}",
                plane_index,
                member_names(members),
                result.termination,
                result.iterations,
                result.chi2
            );
            plane_results(members, plane_index, &result)
        })
        .collect();

    ClusterFit {
        estimates,
        reference_termination: stage1.termination,
        pixel_count: region.len(),
        planes: results,
    }
}

fn plane_results(members: &[&Peak], plane: usize, result: &LmResult) -> Vec<FitResult> {
    let converged = result.converged();
    members
        .iter()
        .enumerate()
        .map(|(k, peak)| {
            let base = k * PARAMS_PER_PEAK;
            let block = &result.params[base..base + PARAMS_PER_PEAK];
            let params = PeakParams::from_block(block);
            let mut std_errors = [None; PARAMS_PER_PEAK];
            std_errors.copy_from_slice(&result.std_errors[base..base + PARAMS_PER_PEAK]);
            FitResult {
                peak: peak.index,
                plane,
                params,
                std_errors,
                success: converged && params.is_finite(),
            }
        })
        .collect()
}

fn failed_results(members: &[&Peak], plane: usize, values: &[PeakParams]) -> Vec<FitResult> {
    members
        .iter()
        .zip(values)
        .map(|(peak, params)| FitResult {
            peak: peak.index,
            plane,
            params: *params,
            std_errors: [None; PARAMS_PER_PEAK],
            success: false,
        })
        .collect()
}

fn member_names(members: &[&Peak]) -> String {
    members
        .iter()
        .map(|p| p.assignment.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
