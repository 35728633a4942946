//! Per-peak regions of interest and per-cluster fit regions.

use common::Grid2;
use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::peaks::Peak;

/// Elliptical mask around `center` with per-axis `radius`, clipped to the
/// `width x height` plane. Pixel `(x, y)` is set when
/// `((x-cx)/rx)² + ((y-cy)/ry)² <= 1`.
pub fn ellipse_mask(width: usize, height: usize, center: DVec2, radius: DVec2) -> Grid2<bool> {
    let mut mask = Grid2::new_filled(width, height, false);
    if width == 0 || height == 0 {
        return mask;
    }

    // Only scan the clipped bounding rectangle of the ellipse.
    let x0 = (center.x - radius.x).floor().max(0.0) as usize;
    let y0 = (center.y - radius.y).floor().max(0.0) as usize;
    let x1 = ((center.x + radius.x).ceil().max(0.0) as usize).min(width - 1);
    let y1 = ((center.y + radius.y).ceil().max(0.0) as usize).min(height - 1);

    for y in y0..=y1 {
        let dy = (y as f64 - center.y) / radius.y;
        for x in x0..=x1 {
            let dx = (x as f64 - center.x) / radius.x;
            if dx * dx + dy * dy <= 1.0 {
                mask[(x, y)] = true;
            }
        }
    }
    mask
}

/// Mask of a single peak.
pub fn peak_mask(width: usize, height: usize, peak: &Peak) -> Grid2<bool> {
    ellipse_mask(width, height, peak.center, peak.radius)
}

/// Union of the member peaks' masks.
pub fn cluster_mask<'a>(
    width: usize,
    height: usize,
    members: impl IntoIterator<Item = &'a Peak>,
) -> Grid2<bool> {
    let mut mask = Grid2::new_filled(width, height, false);
    for peak in members {
        mask.union_with(&peak_mask(width, height, peak));
    }
    mask
}

/// Inclusive pixel bounding box, used for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: usize,
    pub x_max: usize,
    pub y_min: usize,
    pub y_max: usize,
}

impl BoundingBox {
    /// Box over member centers ± radius, clipped to the plane.
    /// `None` for an empty member list or empty plane.
    pub fn around<'a>(
        width: usize,
        height: usize,
        members: impl IntoIterator<Item = &'a Peak>,
    ) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let mut lo = DVec2::splat(f64::INFINITY);
        let mut hi = DVec2::splat(f64::NEG_INFINITY);
        for peak in members {
            lo = lo.min(peak.center - peak.radius);
            hi = hi.max(peak.center + peak.radius);
        }
        if !lo.is_finite() || !hi.is_finite() {
            return None;
        }
        let clip = |v: f64, size: usize| (v.max(0.0) as usize).min(size - 1);
        Some(Self {
            x_min: clip(lo.x.floor(), width),
            x_max: clip(hi.x.ceil(), width),
            y_min: clip(lo.y.floor(), height),
            y_max: clip(hi.y.ceil(), height),
        })
    }
}
