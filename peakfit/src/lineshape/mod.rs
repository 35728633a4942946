//! Pseudo-Voigt lineshapes and the composite multi-peak model.
//!
//! Both profile components are height-normalised (value 1 at the center) and
//! share one width parameter `s`, the half-width at half-maximum:
//!
//! ```text
//! G(t) = exp(-ln2 · (t-c)² / s²)
//! L(t) = s² / ((t-c)² + s²)
//! PV(t) = f·L(t) + (1-f)·G(t)
//! I(x, y) = A · PV(x; cx, sx, f) · PV(y; cy, sy, f)
//! ```
//!
//! so the full width at half maximum is always `2·s`, whatever `f` is.

#[cfg(test)]
mod tests;

use std::f64::consts::LN_2;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::fit::lm::LmModel;

/// Parameters per peak in a packed parameter vector.
pub const PARAMS_PER_PEAK: usize = 6;

/// Offsets of each parameter inside a peak's block.
pub const AMPLITUDE: usize = 0;
pub const CENTER_X: usize = 1;
pub const CENTER_Y: usize = 2;
pub const SIGMA_X: usize = 3;
pub const SIGMA_Y: usize = 4;
pub const FRACTION: usize = 5;

/// Convert the shared width parameter to full width at half maximum.
#[inline]
pub fn sigma_to_fwhm(sigma: f64) -> f64 {
    2.0 * sigma
}

#[inline]
pub fn gaussian(t: f64, center: f64, sigma: f64) -> f64 {
    let u = (t - center) / sigma;
    (-LN_2 * u * u).exp()
}

#[inline]
pub fn lorentzian(t: f64, center: f64, sigma: f64) -> f64 {
    let d = t - center;
    let s2 = sigma * sigma;
    s2 / (d * d + s2)
}

#[inline]
pub fn pseudo_voigt(t: f64, center: f64, sigma: f64, fraction: f64) -> f64 {
    fraction * lorentzian(t, center, sigma) + (1.0 - fraction) * gaussian(t, center, sigma)
}

/// Value and partial derivatives of a 1D pseudo-Voigt at one coordinate.
#[derive(Debug, Clone, Copy)]
struct ProfileTerms {
    value: f64,
    d_center: f64,
    d_sigma: f64,
    d_fraction: f64,
}

#[inline]
fn profile_terms(t: f64, center: f64, sigma: f64, fraction: f64) -> ProfileTerms {
    let d = t - center;
    let d2 = d * d;
    let s2 = sigma * sigma;

    let g = (-LN_2 * d2 / s2).exp();
    let dg_dc = g * 2.0 * LN_2 * d / s2;
    let dg_ds = g * 2.0 * LN_2 * d2 / (s2 * sigma);

    let denom = d2 + s2;
    let l = s2 / denom;
    let denom2 = denom * denom;
    let dl_dc = 2.0 * s2 * d / denom2;
    let dl_ds = 2.0 * sigma * d2 / denom2;

    ProfileTerms {
        value: fraction * l + (1.0 - fraction) * g,
        d_center: fraction * dl_dc + (1.0 - fraction) * dg_dc,
        d_sigma: fraction * dl_ds + (1.0 - fraction) * dg_ds,
        d_fraction: l - g,
    }
}

/// Parameters of one 2D pseudo-Voigt peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakParams {
    pub amplitude: f64,
    /// Center in points (x = column, y = row).
    pub center: DVec2,
    /// Half-width at half-maximum in points.
    pub sigma: DVec2,
    pub fraction: f64,
}

impl PeakParams {
    #[inline]
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        self.amplitude
            * pseudo_voigt(x, self.center.x, self.sigma.x, self.fraction)
            * pseudo_voigt(y, self.center.y, self.sigma.y, self.fraction)
    }

    /// Read one peak block from a packed parameter slice.
    pub fn from_block(block: &[f64]) -> Self {
        Self {
            amplitude: block[AMPLITUDE],
            center: DVec2::new(block[CENTER_X], block[CENTER_Y]),
            sigma: DVec2::new(block[SIGMA_X], block[SIGMA_Y]),
            fraction: block[FRACTION],
        }
    }

    pub fn to_block(&self) -> [f64; PARAMS_PER_PEAK] {
        [
            self.amplitude,
            self.center.x,
            self.center.y,
            self.sigma.x,
            self.sigma.y,
            self.fraction,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.amplitude.is_finite()
            && self.center.is_finite()
            && self.sigma.is_finite()
            && self.fraction.is_finite()
    }
}

/// Sum of `peak_count` pseudo-Voigt peaks over a packed parameter vector
/// laid out as consecutive [`PARAMS_PER_PEAK`] blocks.
#[derive(Debug, Clone, Copy)]
pub struct CompositeModel {
    pub peak_count: usize,
}

impl CompositeModel {
    pub fn new(peak_count: usize) -> Self {
        Self { peak_count }
    }

    pub fn pack(peaks: &[PeakParams]) -> Vec<f64> {
        peaks.iter().flat_map(|p| p.to_block()).collect()
    }

    pub fn unpack(params: &[f64]) -> Vec<PeakParams> {
        params
            .chunks_exact(PARAMS_PER_PEAK)
            .map(PeakParams::from_block)
            .collect()
    }
}

impl LmModel for CompositeModel {
    fn param_count(&self) -> usize {
        self.peak_count * PARAMS_PER_PEAK
    }

    fn evaluate(&self, x: f64, y: f64, params: &[f64]) -> f64 {
        params
            .chunks_exact(PARAMS_PER_PEAK)
            .map(|b| {
                b[AMPLITUDE]
                    * pseudo_voigt(x, b[CENTER_X], b[SIGMA_X], b[FRACTION])
                    * pseudo_voigt(y, b[CENTER_Y], b[SIGMA_Y], b[FRACTION])
            })
            .sum()
    }

    fn evaluate_with_gradient(&self, x: f64, y: f64, params: &[f64], gradient: &mut [f64]) -> f64 {
        let mut value = 0.0;
        for (b, g) in params
            .chunks_exact(PARAMS_PER_PEAK)
            .zip(gradient.chunks_exact_mut(PARAMS_PER_PEAK))
        {
            let amp = b[AMPLITUDE];
            let px = profile_terms(x, b[CENTER_X], b[SIGMA_X], b[FRACTION]);
            let py = profile_terms(y, b[CENTER_Y], b[SIGMA_Y], b[FRACTION]);
            let shape = px.value * py.value;

            g[AMPLITUDE] = shape;
            g[CENTER_X] = amp * px.d_center * py.value;
            g[CENTER_Y] = amp * px.value * py.d_center;
            g[SIGMA_X] = amp * px.d_sigma * py.value;
            g[SIGMA_Y] = amp * px.value * py.d_sigma;
            g[FRACTION] = amp * (px.d_fraction * py.value + px.value * py.d_fraction);

            value += amp * shape;
        }
        value
    }
}
