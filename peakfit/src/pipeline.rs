//! Plane-series orchestration: validate, cluster, fit, tabulate.

#[cfg(test)]
mod tests;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cluster::{assign_clusters, Cluster, LabelMap};
use crate::config::{FitConfig, Lineshape};
use crate::error::{Error, Result};
use crate::fit::{fit_cluster, ClusterFit, EngineSettings, FitResult};
use crate::lineshape::sigma_to_fwhm;
use crate::peaks::{Peak, PeakTable};
use crate::spectrum::{SpatialAxis, SpectralCube, Unit};

/// Member count above which an unbounded run warns.
pub const LARGE_CLUSTER_WARNING: usize = 10;

// ============================================================================
// Output types
// ============================================================================

/// One output row per (peak, plane).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub fit_prefix: String,
    pub assignment: String,
    pub cluster_id: u32,
    pub member_count: usize,
    pub plane: usize,
    pub vclist: Option<f64>,
    pub amp: f64,
    pub amp_err: Option<f64>,
    pub center_x: f64,
    pub center_y: f64,
    pub center_x_ppm: f64,
    pub center_y_ppm: f64,
    pub center_x_hz: f64,
    pub center_y_hz: f64,
    pub init_center_x: f64,
    pub init_center_y: f64,
    pub init_center_x_ppm: f64,
    pub init_center_y_ppm: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub sigma_x_ppm: f64,
    pub sigma_y_ppm: f64,
    pub sigma_x_hz: f64,
    pub sigma_y_hz: f64,
    pub fwhm_x: f64,
    pub fwhm_y: f64,
    pub fwhm_x_ppm: f64,
    pub fwhm_y_ppm: f64,
    pub fwhm_x_hz: f64,
    pub fwhm_y_hz: f64,
    pub fraction: f64,
    pub x_radius: f64,
    pub y_radius: f64,
    pub x_radius_ppm: f64,
    pub y_radius_ppm: f64,
    pub lineshape: Lineshape,
    pub success: bool,
}

impl ResultRow {
    fn new(
        peak: &Peak,
        result: &FitResult,
        cube: &SpectralCube,
        lineshape: Lineshape,
        vclist: Option<f64>,
    ) -> Self {
        let p = &result.params;
        let pos = |v: f64, axis, unit| cube.to_unit(v, axis, unit);
        let width = |v: f64, axis, unit| cube.width_to_unit(v, axis, unit);
        let (fwhm_x, fwhm_y) = (sigma_to_fwhm(p.sigma.x), sigma_to_fwhm(p.sigma.y));

        Self {
            fit_prefix: peak.fit_prefix.clone(),
            assignment: peak.assignment.clone(),
            cluster_id: peak.cluster_id,
            member_count: peak.member_count,
            plane: result.plane,
            vclist,
            amp: p.amplitude,
            amp_err: result.amplitude_error(),
            center_x: p.center.x,
            center_y: p.center.y,
            center_x_ppm: pos(p.center.x, SpatialAxis::X, Unit::Ppm),
            center_y_ppm: pos(p.center.y, SpatialAxis::Y, Unit::Ppm),
            center_x_hz: pos(p.center.x, SpatialAxis::X, Unit::Hz),
            center_y_hz: pos(p.center.y, SpatialAxis::Y, Unit::Hz),
            init_center_x: peak.center.x,
            init_center_y: peak.center.y,
            init_center_x_ppm: pos(peak.center.x, SpatialAxis::X, Unit::Ppm),
            init_center_y_ppm: pos(peak.center.y, SpatialAxis::Y, Unit::Ppm),
            sigma_x: p.sigma.x,
            sigma_y: p.sigma.y,
            sigma_x_ppm: width(p.sigma.x, SpatialAxis::X, Unit::Ppm),
            sigma_y_ppm: width(p.sigma.y, SpatialAxis::Y, Unit::Ppm),
            sigma_x_hz: width(p.sigma.x, SpatialAxis::X, Unit::Hz),
            sigma_y_hz: width(p.sigma.y, SpatialAxis::Y, Unit::Hz),
            fwhm_x,
            fwhm_y,
            fwhm_x_ppm: width(fwhm_x, SpatialAxis::X, Unit::Ppm),
            fwhm_y_ppm: width(fwhm_y, SpatialAxis::Y, Unit::Ppm),
            fwhm_x_hz: width(fwhm_x, SpatialAxis::X, Unit::Hz),
            fwhm_y_hz: width(fwhm_y, SpatialAxis::Y, Unit::Hz),
            fraction: p.fraction,
            x_radius: peak.radius.x,
            y_radius: peak.radius.y,
            x_radius_ppm: peak.radius_ppm.x,
            y_radius_ppm: peak.radius_ppm.y,
            lineshape,
            success: result.success,
        }
    }
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct FitReport {
    /// Ordered by cluster id, then plane, then member order.
    pub rows: Vec<ResultRow>,
    /// Validated peaks with cluster ids and reference estimates.
    pub peaks: Vec<Peak>,
    /// All clusters in ascending id order, skipped ones included.
    pub clusters: Vec<Cluster>,
    /// Ids of clusters excluded by the size ceiling.
    pub skipped_clusters: Vec<u32>,
    /// Number of (peak, plane) fits with `success = false`.
    pub failed_fits: usize,
    pub fitted_clusters: usize,
    /// Threshold used for segmentation, if any.
    pub threshold: Option<f64>,
    /// Component labels of the reference plane, if segmented.
    pub labels: Option<LabelMap>,
}

impl FitReport {
    pub fn rows_for_plane(&self, plane: usize) -> impl Iterator<Item = &ResultRow> + '_ {
        self.rows.iter().filter(move |r| r.plane == plane)
    }
}

// ============================================================================
// PeakFitter
// ============================================================================

/// Runs the full clustering and fitting protocol with a validated config.
#[derive(Debug, Clone)]
pub struct PeakFitter {
    config: FitConfig,
}

impl PeakFitter {
    pub fn new(config: FitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Fit every cluster of `table` across all planes of `cube`.
    pub fn run(&self, cube: &SpectralCube, table: &PeakTable) -> Result<FitReport> {
        let config = &self.config;
        if let Some(vclist) = &config.vclist {
            if vclist.len() != cube.plane_count() {
                return Err(Error::VclistMismatch {
                    expected: cube.plane_count(),
                    actual: vclist.len(),
                });
            }
        }

        let mut peaks = table.to_peaks(cube)?;
        let reference = cube.summed_planes();
        let clustering = assign_clusters(&mut peaks, &reference, &config.cluster)?;
        let clusters = clustering.clusters;

        let largest = clusters.iter().map(Cluster::member_count).max().unwrap_or(0);
        if config.max_cluster_size.is_none() && largest > LARGE_CLUSTER_WARNING {
            tracing::warn!(
                "Largest cluster has {} members; consider setting max_cluster_size",
                largest
            );
        }

        let (eligible, skipped): (Vec<&Cluster>, Vec<&Cluster>) = clusters
            .iter()
            .partition(|c| config.max_cluster_size.map_or(true, |max| c.member_count() <= max));
        for cluster in &skipped {
            tracing::warn!(
                "Skipping cluster {} with {} members (max_cluster_size {:?})",
                cluster.id,
                cluster.member_count(),
                config.max_cluster_size
            );
        }
        let skipped_clusters: Vec<u32> = skipped.iter().map(|c| c.id).collect();

        tracing::info!(
            "Fitting {} clusters ({} peaks, {} skipped) across {} planes",
            eligible.len(),
            peaks.len(),
            skipped_clusters.len(),
            cube.plane_count()
        );

        let settings = EngineSettings::new(config, cube);
        let fits: Vec<ClusterFit> = eligible
            .par_iter()
            .map(|cluster| {
                let members: Vec<&Peak> = cluster.members.iter().map(|&i| &peaks[i]).collect();
                let fit = fit_cluster(&settings, &members, &reference, cube.planes());
                tracing::info!(
                    "Cluster {}: {} peaks over {} pixels, reference fit {:?}, {} failed plane fits",
                    cluster.id,
                    members.len(),
                    fit.pixel_count,
                    fit.reference_termination,
                    fit.failed_count()
                );
                fit
            })
            .collect();

        for (cluster, fit) in eligible.iter().zip(&fits) {
            for (&i, estimate) in cluster.members.iter().zip(&fit.estimates) {
                peaks[i].estimate = Some(*estimate);
            }
        }

        let rows = self.tabulate(cube, &peaks, &fits);
        let failed_fits = rows.iter().filter(|r| !r.success).count();
        tracing::info!(
            "Finished: {} rows, {} failed fits",
            rows.len(),
            failed_fits
        );

        let fitted_clusters = fits.len();
        Ok(FitReport {
            rows,
            peaks,
            clusters,
            skipped_clusters,
            failed_fits,
            fitted_clusters,
            threshold: clustering.threshold,
            labels: clustering.labels,
        })
    }

    fn tabulate(&self, cube: &SpectralCube, peaks: &[Peak], fits: &[ClusterFit]) -> Vec<ResultRow> {
        let per_cluster: Vec<Vec<ResultRow>> = fits
            .iter()
            .map(|fit| {
                fit.planes
                    .iter()
                    .flatten()
                    .map(|result| {
                        let vclist = self
                            .config
                            .vclist
                            .as_ref()
                            .map(|v| v[result.plane]);
                        ResultRow::new(
                            &peaks[result.peak],
                            result,
                            cube,
                            self.config.lineshape,
                            vclist,
                        )
                    })
                    .collect()
            })
            .collect();
        per_cluster.concat()
    }
}
