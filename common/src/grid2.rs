use std::ops::{AddAssign, Deref, Index, IndexMut};
use std::slice;

/// Row-major 2D grid addressed as `(x, y)`: `x` is the column, `y` the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid2<T> {
    cells: Vec<T>,
    width: usize,
    height: usize,
}

impl<T> Grid2<T> {
    pub fn new(width: usize, height: usize, cells: Vec<T>) -> Self {
        assert_eq!(
            cells.len(),
            width * height,
            "cells length must equal width * height"
        );
        Self {
            cells,
            width,
            height,
        }
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut cells = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(x, y));
            }
        }
        Self {
            cells,
            width,
            height,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn index_of(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.width + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.cells[self.index_of(x, y)]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        let idx = self.index_of(x, y);
        &mut self.cells[idx]
    }

    /// Signed lookup, `None` outside the grid.
    #[inline]
    pub fn get_signed(&self, x: isize, y: isize) -> Option<&T> {
        if self.contains(x, y) {
            Some(&self.cells[y as usize * self.width + x as usize])
        } else {
            None
        }
    }

    #[inline]
    pub fn contains(&self, x: isize, y: isize) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.width;
        &self.cells[start..start + self.width]
    }

    #[inline]
    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    #[inline]
    pub fn cells_mut(&mut self) -> &mut [T] {
        &mut self.cells
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.cells.iter()
    }

    /// Iterate cells together with their `(x, y)` coordinates.
    pub fn indexed_iter(&self) -> impl Iterator<Item = ((usize, usize), &T)> + '_ {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, v)| ((i % width, i / width), v))
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Grid2<U> {
        Grid2 {
            cells: self.cells.iter().map(f).collect(),
            width: self.width,
            height: self.height,
        }
    }

    #[inline]
    pub fn same_shape<U>(&self, other: &Grid2<U>) -> bool {
        self.width == other.width && self.height == other.height
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.cells
    }
}

impl<T: Clone> Grid2<T> {
    pub fn new_filled(width: usize, height: usize, value: T) -> Self {
        Self {
            cells: vec![value; width * height],
            width,
            height,
        }
    }

    #[inline]
    pub fn fill(&mut self, value: T) {
        self.cells.fill(value);
    }
}

impl<T: Default + Clone> Grid2<T> {
    pub fn new_default(width: usize, height: usize) -> Self {
        Self::new_filled(width, height, T::default())
    }
}

impl<T: Copy + AddAssign> Grid2<T> {
    /// Element-wise accumulate `other` into `self`.
    pub fn accumulate(&mut self, other: &Grid2<T>) {
        assert!(self.same_shape(other), "shape mismatch");
        for (a, &b) in self.cells.iter_mut().zip(other.cells.iter()) {
            *a += b;
        }
    }
}

impl Grid2<bool> {
    pub fn count_set(&self) -> usize {
        self.cells.iter().filter(|&&v| v).count()
    }

    /// Logical OR of `other` into `self`.
    pub fn union_with(&mut self, other: &Grid2<bool>) {
        assert!(self.same_shape(other), "shape mismatch");
        for (a, &b) in self.cells.iter_mut().zip(other.cells.iter()) {
            *a |= b;
        }
    }
}

impl<T> Index<(usize, usize)> for Grid2<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.cells[y * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize)> for Grid2<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        &mut self.cells[y * self.width + x]
    }
}

impl<T> Deref for Grid2<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.cells
    }
}

impl<'a, T> IntoIterator for &'a Grid2<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stores_dimensions() {
        let grid = Grid2::new(3, 2, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.height(), 2);
        assert_eq!(grid.len(), 6);
    }

    #[test]
    #[should_panic(expected = "cells length must equal width * height")]
    fn test_new_panics_on_size_mismatch() {
        Grid2::new(3, 2, vec![1, 2, 3]);
    }

    #[test]
    fn test_xy_addressing_is_row_major() {
        let grid = Grid2::new(3, 2, vec![10, 20, 30, 40, 50, 60]);
        assert_eq!(*grid.get(2, 0), 30);
        assert_eq!(*grid.get(0, 1), 40);
        assert_eq!(grid[(1, 1)], 50);
        assert_eq!(grid.row(1), &[40, 50, 60]);
    }

    #[test]
    fn test_from_fn_matches_coordinates() {
        let grid = Grid2::from_fn(4, 3, |x, y| (x, y));
        for ((x, y), &v) in grid.indexed_iter() {
            assert_eq!(v, (x, y));
        }
    }

    #[test]
    fn test_get_signed_outside_is_none() {
        let grid = Grid2::new_filled(2, 2, 1u8);
        assert_eq!(grid.get_signed(-1, 0), None);
        assert_eq!(grid.get_signed(0, 2), None);
        assert_eq!(grid.get_signed(1, 1), Some(&1));
    }

    #[test]
    fn test_accumulate_sums_cells() {
        let mut a = Grid2::new(2, 1, vec![1.0, 2.0]);
        let b = Grid2::new(2, 1, vec![0.5, -1.0]);
        a.accumulate(&b);
        assert_eq!(a.cells(), &[1.5, 1.0]);
    }

    #[test]
    fn test_union_with_is_logical_or() {
        let mut a = Grid2::new(3, 1, vec![true, false, false]);
        let b = Grid2::new(3, 1, vec![false, false, true]);
        a.union_with(&b);
        assert_eq!(a.cells(), &[true, false, true]);
        assert_eq!(a.count_set(), 2);
    }

    #[test]
    #[should_panic(expected = "shape mismatch")]
    fn test_union_with_panics_on_shape_mismatch() {
        let mut a = Grid2::new_filled(2, 2, false);
        let b = Grid2::new_filled(4, 1, false);
        a.union_with(&b);
    }
}
