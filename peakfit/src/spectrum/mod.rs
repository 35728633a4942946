//! Spectral cube access and unit conversion.
//!
//! A [`SpectralCube`] owns the raw data reorganised into read-only 2D planes
//! along the indirect axis, together with the calibration of the two fitted
//! axes. Point positions follow the array index convention (`0..size`),
//! frequencies decrease with increasing index as usual for NMR spectra.


use common::Grid2;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::error::{Error, Result};

/// One of the two fitted axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SpatialAxis {
    /// Direct dimension, plane columns.
    #[strum(serialize = "F2")]
    X,
    /// Indirect spatial dimension, plane rows.
    #[strum(serialize = "F1")]
    Y,
}

/// Units a position or width can be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Points,
    /// Frequency relative to the spectrometer frequency.
    #[default]
    Ppm,
    /// Absolute frequency offset.
    Hz,
}

/// Calibration of one cube axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisCalibration {
    /// Number of points along the axis.
    pub size: usize,
    /// Spectral width in Hz.
    pub sw_hz: f64,
    /// Observed (spectrometer) frequency in MHz.
    pub obs_mhz: f64,
    /// Carrier / reference frequency in Hz.
    pub car_hz: f64,
}

impl AxisCalibration {
    pub fn new(size: usize, sw_hz: f64, obs_mhz: f64, car_hz: f64) -> Self {
        Self {
            size,
            sw_hz,
            obs_mhz,
            car_hz,
        }
    }

    fn validate(&self, axis: usize, extent: usize) -> Result<()> {
        let reason = if self.size != extent {
            Some(format!("size {} != axis extent {}", self.size, extent))
        } else if !(self.sw_hz.is_finite() && self.sw_hz > 0.0) {
            Some(format!("spectral width must be positive, got {}", self.sw_hz))
        } else if !(self.obs_mhz.is_finite() && self.obs_mhz > 0.0) {
            Some(format!(
                "observed frequency must be positive, got {}",
                self.obs_mhz
            ))
        } else if !self.car_hz.is_finite() {
            Some(format!("carrier must be finite, got {}", self.car_hz))
        } else {
            None
        };
        match reason {
            Some(reason) => Err(Error::InvalidCalibration { axis, reason }),
            None => Ok(()),
        }
    }

    /// Hz step between adjacent points (negative).
    #[inline]
    fn delta(&self) -> f64 {
        -self.sw_hz / self.size as f64
    }

    /// Hz value of point 0. The carrier sits at `size / 2`, half a point
    /// off the grid on odd-sized axes.
    #[inline]
    fn first(&self) -> f64 {
        self.car_hz - self.delta() * (self.size as f64 / 2.0)
    }

    #[inline]
    pub fn hz(&self, points: f64) -> f64 {
        points * self.delta() + self.first()
    }

    #[inline]
    pub fn ppm(&self, points: f64) -> f64 {
        self.hz(points) / self.obs_mhz
    }

    #[inline]
    pub fn points_from_hz(&self, hz: f64) -> f64 {
        (hz - self.first()) / self.delta()
    }

    #[inline]
    pub fn points_from_ppm(&self, ppm: f64) -> f64 {
        self.points_from_hz(ppm * self.obs_mhz)
    }

    #[inline]
    pub fn hz_per_point(&self) -> f64 {
        self.sw_hz / self.size as f64
    }

    #[inline]
    pub fn ppm_per_point(&self) -> f64 {
        self.hz_per_point() / self.obs_mhz
    }
}

/// Which cube axis plays which role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisOrder {
    /// Indirect (plane) axis, absent for a single 2D spectrum.
    pub plane: Option<usize>,
    /// Fitted row axis.
    pub f1: usize,
    /// Fitted column axis.
    pub f2: usize,
}

impl Default for AxisOrder {
    fn default() -> Self {
        Self {
            plane: Some(0),
            f1: 1,
            f2: 2,
        }
    }
}

impl AxisOrder {
    /// Build from a `[plane, f1, f2]` or `[f1, f2]` list checked against `rank`.
    pub fn from_dims(dims: &[usize], rank: usize) -> Result<Self> {
        if dims.len() != rank {
            return Err(Error::AxisCountMismatch {
                declared: dims.len(),
                rank,
            });
        }
        let invalid = || Error::InvalidAxisOrder {
            order: dims.to_vec(),
            rank,
        };
        let mut seen = [false; 3];
        for &d in dims {
            if d >= rank || rank > 3 || seen[d] {
                return Err(invalid());
            }
            seen[d] = true;
        }
        match *dims {
            [plane, f1, f2] => Ok(Self {
                plane: Some(plane),
                f1,
                f2,
            }),
            [f1, f2] => Ok(Self {
                plane: None,
                f1,
                f2,
            }),
            _ => Err(invalid()),
        }
    }
}

/// Read-only spectral data cube split into 2D planes.
#[derive(Debug, Clone)]
pub struct SpectralCube {
    planes: Vec<Grid2<f64>>,
    x_calibration: AxisCalibration,
    y_calibration: AxisCalibration,
}

impl SpectralCube {
    /// Wrap a row-major array of `shape` with one calibration per axis.
    ///
    /// `dims` declares the axis roles as `[plane, f1, f2]` (or `[f1, f2]` for
    /// a 2D spectrum).
    pub fn new(
        data: Vec<f64>,
        shape: &[usize],
        calibrations: &[AxisCalibration],
        dims: &[usize],
    ) -> Result<Self> {
        let rank = shape.len();
        let order = AxisOrder::from_dims(dims, rank)?;

        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::ShapeMismatch {
                shape: shape.to_vec(),
                expected,
                actual: data.len(),
            });
        }
        if calibrations.len() != rank {
            return Err(Error::AxisCountMismatch {
                declared: calibrations.len(),
                rank,
            });
        }
        for (axis, calibration) in calibrations.iter().enumerate() {
            calibration.validate(axis, shape[axis])?;
        }

        let mut strides = vec![1usize; rank];
        for axis in (0..rank.saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * shape[axis + 1];
        }

        let width = shape[order.f2];
        let height = shape[order.f1];
        let plane_count = order.plane.map_or(1, |p| shape[p]);
        let planes = (0..plane_count)
            .map(|p| {
                let base = order.plane.map_or(0, |axis| p * strides[axis]);
                Grid2::from_fn(width, height, |x, y| {
                    data[base + y * strides[order.f1] + x * strides[order.f2]]
                })
            })
            .collect();

        Ok(Self {
            planes,
            x_calibration: calibrations[order.f2],
            y_calibration: calibrations[order.f1],
        })
    }

    /// Build directly from planes that already share one shape.
    pub fn from_planes(
        planes: Vec<Grid2<f64>>,
        x_calibration: AxisCalibration,
        y_calibration: AxisCalibration,
    ) -> Result<Self> {
        let Some(first) = planes.first() else {
            return Err(Error::ShapeMismatch {
                shape: vec![0],
                expected: 1,
                actual: 0,
            });
        };
        if let Some(bad) = planes.iter().find(|p| !p.same_shape(first)) {
            return Err(Error::ShapeMismatch {
                shape: vec![first.height(), first.width()],
                expected: first.len(),
                actual: bad.len(),
            });
        }
        x_calibration.validate(1, first.width())?;
        y_calibration.validate(0, first.height())?;
        Ok(Self {
            planes,
            x_calibration,
            y_calibration,
        })
    }

    #[inline]
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    #[inline]
    pub fn plane(&self, index: usize) -> Option<&Grid2<f64>> {
        self.planes.get(index)
    }

    #[inline]
    pub fn planes(&self) -> &[Grid2<f64>] {
        &self.planes
    }

    /// Points along the F2 (column) axis.
    #[inline]
    pub fn width(&self) -> usize {
        self.x_calibration.size
    }

    /// Points along the F1 (row) axis.
    #[inline]
    pub fn height(&self) -> usize {
        self.y_calibration.size
    }

    /// Sum of all planes, the reference plane for clustering and shape fits.
    pub fn summed_planes(&self) -> Grid2<f64> {
        let mut sum = Grid2::new_filled(self.width(), self.height(), 0.0);
        for plane in &self.planes {
            sum.accumulate(plane);
        }
        sum
    }

    #[inline]
    pub fn calibration(&self, axis: SpatialAxis) -> &AxisCalibration {
        match axis {
            SpatialAxis::X => &self.x_calibration,
            SpatialAxis::Y => &self.y_calibration,
        }
    }

    /// Convert a position in `unit` to (fractional) points.
    pub fn to_points(&self, value: f64, axis: SpatialAxis, unit: Unit) -> f64 {
        let cal = self.calibration(axis);
        match unit {
            Unit::Points => value,
            Unit::Ppm => cal.points_from_ppm(value),
            Unit::Hz => cal.points_from_hz(value),
        }
    }

    /// Convert a position in points to `unit`.
    pub fn to_unit(&self, points: f64, axis: SpatialAxis, unit: Unit) -> f64 {
        let cal = self.calibration(axis);
        match unit {
            Unit::Points => points,
            Unit::Ppm => cal.ppm(points),
            Unit::Hz => cal.hz(points),
        }
    }

    /// Convert a width (not a position) from `unit` to points.
    pub fn width_to_points(&self, width: f64, axis: SpatialAxis, unit: Unit) -> f64 {
        match unit {
            Unit::Points => width,
            Unit::Ppm => width * self.points_per_ppm(axis),
            Unit::Hz => width * self.points_per_hz(axis),
        }
    }

    /// Convert a width in points to `unit`.
    pub fn width_to_unit(&self, points: f64, axis: SpatialAxis, unit: Unit) -> f64 {
        match unit {
            Unit::Points => points,
            Unit::Ppm => points * self.ppm_per_point(axis),
            Unit::Hz => points * self.hz_per_point(axis),
        }
    }

    #[inline]
    pub fn ppm_per_point(&self, axis: SpatialAxis) -> f64 {
        self.calibration(axis).ppm_per_point()
    }

    #[inline]
    pub fn hz_per_point(&self, axis: SpatialAxis) -> f64 {
        self.calibration(axis).hz_per_point()
    }

    #[inline]
    pub fn points_per_ppm(&self, axis: SpatialAxis) -> f64 {
        1.0 / self.ppm_per_point(axis)
    }

    #[inline]
    pub fn points_per_hz(&self, axis: SpatialAxis) -> f64 {
        1.0 / self.hz_per_point(axis)
    }
}
