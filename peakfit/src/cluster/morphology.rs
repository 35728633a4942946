//! Binary morphology on boolean grids.
//!
//! Dilation treats pixels outside the plane as background, erosion treats
//! them as foreground, so closing never eats into the plane border.

use common::Grid2;

use crate::config::StructuringElement;

/// Offsets `(dx, dy)` covered by a structuring element, relative to its
/// origin at `(w / 2, h / 2)`.
pub fn element_offsets(element: StructuringElement) -> Vec<(isize, isize)> {
    match element {
        StructuringElement::Square { size } => block_offsets(size, size),
        StructuringElement::Rectangle { width, height } => block_offsets(width, height),
        StructuringElement::Disk { size } => {
            let r = (size / 2) as isize;
            let mut offsets = Vec::new();
            for dy in -r..=r {
                for dx in -r..=r {
                    if dx * dx + dy * dy <= r * r {
                        offsets.push((dx, dy));
                    }
                }
            }
            offsets
        }
    }
}

fn block_offsets(width: usize, height: usize) -> Vec<(isize, isize)> {
    let (ox, oy) = ((width / 2) as isize, (height / 2) as isize);
    let mut offsets = Vec::with_capacity(width * height);
    for y in 0..height as isize {
        for x in 0..width as isize {
            offsets.push((x - ox, y - oy));
        }
    }
    offsets
}

/// `out(p) = OR over o of in(p - o)`.
pub fn dilate(mask: &Grid2<bool>, offsets: &[(isize, isize)]) -> Grid2<bool> {
    Grid2::from_fn(mask.width(), mask.height(), |x, y| {
        offsets.iter().any(|&(dx, dy)| {
            mask.get_signed(x as isize - dx, y as isize - dy)
                .copied()
                .unwrap_or(false)
        })
    })
}

/// `out(p) = AND over o of in(p + o)`.
pub fn erode(mask: &Grid2<bool>, offsets: &[(isize, isize)]) -> Grid2<bool> {
    Grid2::from_fn(mask.width(), mask.height(), |x, y| {
        offsets.iter().all(|&(dx, dy)| {
            mask.get_signed(x as isize + dx, y as isize + dy)
                .copied()
                .unwrap_or(true)
        })
    })
}

/// Dilation followed by erosion with the same element.
pub fn close(mask: &Grid2<bool>, element: StructuringElement) -> Grid2<bool> {
    let offsets = element_offsets(element);
    erode(&dilate(mask, &offsets), &offsets)
}
