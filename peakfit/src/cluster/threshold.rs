//! Noise threshold selection for the signal mask.

use common::Grid2;

use crate::error::{Error, Result};

/// Histogram bins used by Otsu's method.
pub const OTSU_BINS: usize = 256;

/// Otsu's threshold over the finite values of `plane`.
///
/// Builds a [`OTSU_BINS`]-bin histogram over `[min, max]` and returns the bin
/// center that maximizes the between-class variance. A plane without spread
/// has no meaningful split and is rejected.
pub fn otsu_threshold(plane: &Grid2<f64>) -> Result<f64> {
    let (min, max) = plane
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() {
        return Err(Error::DegenerateReferencePlane { value: f64::NAN });
    }
    if min == max {
        return Err(Error::DegenerateReferencePlane { value: min });
    }

    let bin_width = (max - min) / OTSU_BINS as f64;
    let mut hist = [0.0f64; OTSU_BINS];
    for &v in plane.iter().filter(|v| v.is_finite()) {
        let bin = (((v - min) / bin_width) as usize).min(OTSU_BINS - 1);
        hist[bin] += 1.0;
    }
    let center = |i: usize| min + (i as f64 + 0.5) * bin_width;

    // Cumulative class weights and means from the low end (w1, m1) and the
    // high end (w2, m2).
    let mut w1 = [0.0f64; OTSU_BINS];
    let mut s1 = [0.0f64; OTSU_BINS];
    let (mut w, mut s) = (0.0, 0.0);
    for i in 0..OTSU_BINS {
        w += hist[i];
        s += hist[i] * center(i);
        w1[i] = w;
        s1[i] = s;
    }
    let total_w = w;
    let total_s = s;

    let mut best = 0;
    let mut best_variance = f64::NEG_INFINITY;
    for i in 0..OTSU_BINS - 1 {
        let w_lo = w1[i];
        let w_hi = total_w - w_lo;
        if w_lo == 0.0 || w_hi == 0.0 {
            continue;
        }
        let m_lo = s1[i] / w_lo;
        let m_hi = (total_s - s1[i]) / w_hi;
        let variance = w_lo * w_hi * (m_lo - m_hi) * (m_lo - m_hi);
        if variance > best_variance {
            best_variance = variance;
            best = i;
        }
    }

    Ok(center(best))
}

/// Two-sided signal mask `v > t || v < -t` with `t = |threshold|`.
pub fn signal_mask(plane: &Grid2<f64>, threshold: f64) -> Grid2<bool> {
    let t = threshold.abs();
    plane.map(|&v| v > t || v < -t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otsu_separates_bimodal_values() {
        // 80 background pixels near 1, 20 signal pixels near 100.
        let cells: Vec<f64> = (0..100)
            .map(|i| {
                if i < 80 {
                    1.0 + (i % 5) as f64 * 0.1
                } else {
                    100.0 + (i % 3) as f64
                }
            })
            .collect();
        let plane = Grid2::new(10, 10, cells);
        let t = otsu_threshold(&plane).unwrap();
        assert!(t > 1.5 && t < 100.0, "threshold {t}");
        assert_eq!(signal_mask(&plane, t).count_set(), 20);
    }

    #[test]
    fn test_constant_plane_is_degenerate() {
        let plane = Grid2::new_filled(4, 4, 3.5);
        assert!(matches!(
            otsu_threshold(&plane),
            Err(Error::DegenerateReferencePlane { value }) if value == 3.5
        ));
    }

    #[test]
    fn test_signal_mask_is_two_sided() {
        let plane = Grid2::new(4, 1, vec![5.0, -5.0, 0.5, -0.5]);
        let mask = signal_mask(&plane, -1.0);
        assert_eq!(mask.cells(), &[true, true, false, false]);
    }
}
