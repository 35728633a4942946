//! Input peak table and validated peaks.
//!
//! [`PeakRecord`] mirrors one row of an externally loaded peak list; every
//! column is optional so that missing required columns surface as
//! [`Error::MissingColumn`] rather than as a loader failure. The serde
//! aliases accept the upper-case column names of the classic peak list.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lineshape::PeakParams;
use crate::spectrum::{SpatialAxis, SpectralCube, Unit};

/// `include` column: either a boolean or a yes/no string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IncludeFlag {
    Bool(bool),
    Text(String),
}

impl IncludeFlag {
    pub fn is_included(&self) -> bool {
        match self {
            IncludeFlag::Bool(b) => *b,
            IncludeFlag::Text(s) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "yes" | "y" | "true" | "1")
            }
        }
    }
}

/// One row of the input peak table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    #[serde(alias = "ASS")]
    pub assignment: Option<String>,
    #[serde(alias = "X_PPM")]
    pub x: Option<f64>,
    #[serde(alias = "Y_PPM")]
    pub y: Option<f64>,
    #[serde(alias = "X_RADIUS_PPM")]
    pub x_radius: Option<f64>,
    #[serde(alias = "Y_RADIUS_PPM")]
    pub y_radius: Option<f64>,
    #[serde(alias = "CLUSTID")]
    pub cluster_id: Option<u32>,
    /// Seed linewidth (full width) on F2, Hz.
    #[serde(alias = "XW_HZ")]
    pub x_linewidth_hz: Option<f64>,
    /// Seed linewidth (full width) on F1, Hz.
    #[serde(alias = "YW_HZ")]
    pub y_linewidth_hz: Option<f64>,
    pub include: Option<IncludeFlag>,
}

impl PeakRecord {
    pub fn is_included(&self) -> bool {
        self.include.as_ref().map_or(true, IncludeFlag::is_included)
    }
}

/// Loaded peak table; `unit` applies to centers and radii.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakTable {
    #[serde(default)]
    pub unit: Unit,
    pub records: Vec<PeakRecord>,
}

/// A validated peak in point coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Peak {
    /// Position in the validated peak list.
    pub index: usize,
    pub assignment: String,
    /// Parameter-name prefix, unique per assignment.
    pub fit_prefix: String,
    /// Seed position in points.
    pub center: DVec2,
    /// Half-size of the fit region in points.
    pub radius: DVec2,
    pub radius_ppm: DVec2,
    /// Seed half-width at half-maximum in points.
    pub seed_sigma: DVec2,
    pub cluster_hint: Option<u32>,
    /// 0 until clustering assigns an id.
    pub cluster_id: u32,
    pub member_count: usize,
    /// Reference-plane fit, filled in after fitting.
    pub estimate: Option<PeakParams>,
}

/// Turn an assignment into a parameter prefix, e.g. `G12N-H` -> `_G12N_H_`.
pub fn fit_prefix(assignment: &str) -> String {
    let body: String = assignment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("_{body}_")
}

impl PeakTable {
    pub fn new(unit: Unit, records: Vec<PeakRecord>) -> Self {
        Self { unit, records }
    }

    /// Validate the included rows and convert them to points on `cube`.
    pub fn to_peaks(&self, cube: &SpectralCube) -> Result<Vec<Peak>> {
        let excluded: Vec<String> = self
            .records
            .iter()
            .filter(|r| !r.is_included())
            .map(|r| r.assignment.clone().unwrap_or_default())
            .collect();
        if !excluded.is_empty() {
            tracing::warn!(
                "Excluding {} peaks marked include=no: {}",
                excluded.len(),
                excluded.join(", ")
            );
        }

        let peaks = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_included())
            .enumerate()
            .map(|(index, (row, record))| self.to_peak(index, row, record, cube))
            .collect::<Result<Vec<_>>>()?;

        if peaks.is_empty() {
            return Err(Error::EmptyPeakTable);
        }
        Ok(peaks)
    }

    fn to_peak(
        &self,
        index: usize,
        row: usize,
        record: &PeakRecord,
        cube: &SpectralCube,
    ) -> Result<Peak> {
        let require = |value: Option<f64>, column: &'static str| {
            value.ok_or(Error::MissingColumn { column, row })
        };
        let assignment = record.assignment.clone().ok_or(Error::MissingColumn {
            column: "assignment",
            row,
        })?;
        let x = require(record.x, "x")?;
        let y = require(record.y, "y")?;
        let x_radius = require(record.x_radius, "x_radius")?;
        let y_radius = require(record.y_radius, "y_radius")?;

        for (axis, radius) in [(SpatialAxis::X, x_radius), (SpatialAxis::Y, y_radius)] {
            if !(radius.is_finite() && radius > 0.0) {
                return Err(Error::NonPositiveRadius {
                    assignment,
                    axis,
                    radius,
                });
            }
        }
        let unit = self.unit;
        let center = DVec2::new(
            cube.to_points(x, SpatialAxis::X, unit),
            cube.to_points(y, SpatialAxis::Y, unit),
        );
        let radius = DVec2::new(
            cube.width_to_points(x_radius, SpatialAxis::X, unit),
            cube.width_to_points(y_radius, SpatialAxis::Y, unit),
        );
        let radius_ppm = DVec2::new(
            cube.width_to_unit(radius.x, SpatialAxis::X, Unit::Ppm),
            cube.width_to_unit(radius.y, SpatialAxis::Y, Unit::Ppm),
        );

        let (rx, ry) = (center.x.round(), center.y.round());
        if !(rx >= 0.0 && ry >= 0.0 && rx < cube.width() as f64 && ry < cube.height() as f64) {
            return Err(Error::PeakOutsidePlane {
                assignment,
                x: center.x,
                y: center.y,
                width: cube.width(),
                height: cube.height(),
            });
        }

        let seed_sigma = DVec2::new(
            seed_sigma(record.x_linewidth_hz, SpatialAxis::X, radius.x, cube),
            seed_sigma(record.y_linewidth_hz, SpatialAxis::Y, radius.y, cube),
        );

        Ok(Peak {
            index,
            fit_prefix: fit_prefix(&assignment),
            assignment,
            center,
            radius,
            radius_ppm,
            seed_sigma,
            cluster_hint: record.cluster_id,
            cluster_id: 0,
            member_count: 0,
            estimate: None,
        })
    }
}

/// Half the seed linewidth in points, or half the radius when no usable
/// linewidth was given.
fn seed_sigma(linewidth_hz: Option<f64>, axis: SpatialAxis, radius: f64, cube: &SpectralCube) -> f64 {
    match linewidth_hz {
        Some(lw) if lw.is_finite() && lw > 0.0 => {
            0.5 * cube.width_to_points(lw, axis, Unit::Hz)
        }
        _ => 0.5 * radius,
    }
}

impl Peak {
    /// Rounded seed position as pixel indices. Validated peaks are always
    /// inside the plane.
    #[inline]
    pub fn pixel(&self) -> (usize, usize) {
        (self.center.x.round() as usize, self.center.y.round() as usize)
    }
}

#[cfg(test)]
pub(crate) fn test_peak(index: usize, x: f64, y: f64, radius: f64) -> Peak {
    Peak {
        index,
        assignment: format!("P{index}"),
        fit_prefix: format!("_P{index}_"),
        center: DVec2::new(x, y),
        radius: DVec2::splat(radius),
        radius_ppm: DVec2::splat(radius * 0.01),
        seed_sigma: DVec2::splat(radius * 0.5),
        cluster_hint: None,
        cluster_id: 0,
        member_count: 0,
        estimate: None,
    }
}
