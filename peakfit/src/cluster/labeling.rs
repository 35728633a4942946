//! Connected component labeling using union-find.
//!
//! Rows are split into runs of foreground pixels; runs that touch a run in
//! the previous row are merged. Labels are numbered `1..=n` in raster order
//! of each component's first pixel, 0 is background.

use common::Grid2;

use crate::config::Connectivity;

// ============================================================================
// Runs
// ============================================================================

/// A horizontal run of foreground pixels.
#[derive(Debug, Clone, Copy)]
struct Run {
    start: usize, // inclusive
    end: usize,   // exclusive
    label: u32,
}

impl Run {
    /// Range of previous-row columns this run can connect to.
    #[inline]
    fn search_window(&self, connectivity: Connectivity) -> (usize, usize) {
        match connectivity {
            Connectivity::Four => (self.start, self.end),
            Connectivity::Eight => (self.start.saturating_sub(1), self.end + 1),
        }
    }
}

#[inline]
fn runs_connected(prev: &Run, curr: &Run, connectivity: Connectivity) -> bool {
    match connectivity {
        Connectivity::Four => prev.start < curr.end && prev.end > curr.start,
        Connectivity::Eight => prev.start < curr.end + 1 && prev.end + 1 > curr.start,
    }
}

fn extract_runs(row: &[bool], runs: &mut Vec<Run>) {
    let mut x = 0;
    while x < row.len() {
        if !row[x] {
            x += 1;
            continue;
        }
        let start = x;
        while x < row.len() && row[x] {
            x += 1;
        }
        runs.push(Run {
            start,
            end: x,
            label: 0,
        });
    }
}

// ============================================================================
// Union-find
// ============================================================================

/// Labels are 1-based; `parent[label - 1]` holds the parent label.
#[derive(Debug, Default)]
struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn make_set(&mut self) -> u32 {
        let label = self.parent.len() as u32 + 1;
        self.parent.push(label);
        label
    }

    fn find(&mut self, label: u32) -> u32 {
        let mut root = label;
        while self.parent[(root - 1) as usize] != root {
            root = self.parent[(root - 1) as usize];
        }
        let mut current = label;
        while current != root {
            let next = self.parent[(current - 1) as usize];
            self.parent[(current - 1) as usize] = root;
            current = next;
        }
        root
    }

    /// Merge two sets, keeping the smaller label as root.
    fn union(&mut self, a: u32, b: u32) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            let (smaller, larger) = if root_a < root_b {
                (root_a, root_b)
            } else {
                (root_b, root_a)
            };
            self.parent[(larger - 1) as usize] = smaller;
        }
    }

    /// Map provisional labels to sequential `1..=n` and rewrite `labels`.
    fn flatten_labels(&mut self, labels: &mut [u32]) -> usize {
        let len = self.parent.len();
        let mut label_map = vec![0u32; len + 1];
        let mut num_labels = 0u32;

        for i in 1..=len as u32 {
            let root = self.find(i);
            if label_map[root as usize] == 0 {
                num_labels += 1;
                label_map[root as usize] = num_labels;
            }
            label_map[i as usize] = label_map[root as usize];
        }

        for l in labels.iter_mut().filter(|l| **l != 0) {
            *l = label_map[*l as usize];
        }
        num_labels as usize
    }
}

// ============================================================================
// LabelMap
// ============================================================================

/// A 2D label map from connected component analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    labels: Grid2<u32>,
    num_labels: usize,
}

impl LabelMap {
    pub fn from_mask(mask: &Grid2<bool>, connectivity: Connectivity) -> Self {
        let width = mask.width();
        let height = mask.height();
        let mut labels = Grid2::new_filled(width, height, 0u32);

        let mut uf = UnionFind::default();
        let mut prev_runs: Vec<Run> = Vec::new();
        let mut curr_runs: Vec<Run> = Vec::new();

        for y in 0..height {
            curr_runs.clear();
            extract_runs(mask.row(y), &mut curr_runs);

            let mut prev_idx = 0;
            for run in curr_runs.iter_mut() {
                let (search_start, search_end) = run.search_window(connectivity);
                while prev_idx < prev_runs.len() && prev_runs[prev_idx].end <= search_start {
                    prev_idx += 1;
                }

                let mut assigned = None;
                let mut check = prev_idx;
                while check < prev_runs.len() && prev_runs[check].start < search_end {
                    let prev = &prev_runs[check];
                    if runs_connected(prev, run, connectivity) {
                        match assigned {
                            Some(label) if label != prev.label => uf.union(label, prev.label),
                            None => assigned = Some(prev.label),
                            _ => {}
                        }
                    }
                    check += 1;
                }
                run.label = assigned.unwrap_or_else(|| uf.make_set());
            }

            for run in &curr_runs {
                for x in run.start..run.end {
                    labels[(x, y)] = run.label;
                }
            }
            std::mem::swap(&mut prev_runs, &mut curr_runs);
        }

        let num_labels = uf.flatten_labels(labels.cells_mut());
        Self { labels, num_labels }
    }

    /// Number of connected components (excluding background).
    #[inline]
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    #[inline]
    pub fn label_at(&self, x: usize, y: usize) -> u32 {
        self.labels[(x, y)]
    }

    #[inline]
    pub fn labels(&self) -> &Grid2<u32> {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&str]) -> Grid2<bool> {
        let cells = rows
            .iter()
            .flat_map(|r| r.chars().map(|c| c == '#'))
            .collect();
        Grid2::new(rows[0].len(), rows.len(), cells)
    }

    #[test]
    fn test_empty_mask_has_no_labels() {
        let map = LabelMap::from_mask(&Grid2::new_filled(5, 4, false), Connectivity::Four);
        assert_eq!(map.num_labels(), 0);
        assert!(map.labels().iter().all(|&l| l == 0));
    }

    #[test]
    fn test_diagonal_pixels_four_vs_eight() {
        let mask = mask_from_rows(&["#..", ".#.", "..#"]);
        assert_eq!(LabelMap::from_mask(&mask, Connectivity::Four).num_labels(), 3);
        let eight = LabelMap::from_mask(&mask, Connectivity::Eight);
        assert_eq!(eight.num_labels(), 1);
        assert_eq!(eight.label_at(2, 2), 1);
    }

    #[test]
    fn test_u_shape_merges_into_one_label() {
        // Two arms only join on the last row.
        let mask = mask_from_rows(&["#...#", "#...#", "#####"]);
        let map = LabelMap::from_mask(&mask, Connectivity::Four);
        assert_eq!(map.num_labels(), 1);
        assert_eq!(map.label_at(0, 0), map.label_at(4, 0));
    }

    #[test]
    fn test_labels_numbered_in_raster_order() {
        let mask = mask_from_rows(&["..##", "....", "#..."]);
        let map = LabelMap::from_mask(&mask, Connectivity::Four);
        assert_eq!(map.num_labels(), 2);
        assert_eq!(map.label_at(2, 0), 1);
        assert_eq!(map.label_at(0, 2), 2);
        assert_eq!(map.label_at(0, 0), 0);
    }
}
