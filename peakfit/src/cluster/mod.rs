//! Grouping of overlapping peaks into fit clusters.
//!
//! Segmentation pipeline on the reference plane:
//! 1. Threshold (Otsu unless configured), two-sided signal mask
//! 2. Morphological closing with the configured structuring element
//! 3. Connected component labeling
//! 4. Each peak takes the label under its rounded position; peaks on
//!    background get fresh ids above the last label


pub mod labeling;
pub mod morphology;
pub mod threshold;

use std::collections::BTreeMap;

use common::Grid2;
use serde::Serialize;

use crate::config::{ClusterConfig, ClusterSource};
use crate::error::{Error, Result};
use crate::mask::BoundingBox;
use crate::peaks::Peak;

pub use labeling::LabelMap;

/// A group of peaks fitted together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    /// Never 0.
    pub id: u32,
    /// Member peak indices in peak order.
    pub members: Vec<usize>,
    /// Display only.
    pub bbox: Option<BoundingBox>,
}

impl Cluster {
    #[inline]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// Outcome of cluster assignment.
#[derive(Debug, Clone)]
pub struct Clustering {
    /// Clusters in ascending id order.
    pub clusters: Vec<Cluster>,
    /// Threshold used for the signal mask, if the plane was segmented.
    pub threshold: Option<f64>,
    /// Component labels of the closed mask, if the plane was segmented.
    pub labels: Option<LabelMap>,
}

/// Segment `reference` and return its component labels and the threshold used.
pub fn segment(reference: &Grid2<f64>, config: &ClusterConfig) -> Result<(LabelMap, f64)> {
    config
        .structuring_element
        .validate_for_plane(reference.width(), reference.height())?;
    let threshold = match config.threshold {
        Some(t) => t.abs(),
        None => threshold::otsu_threshold(reference)?.abs(),
    };
    let mask = threshold::signal_mask(reference, threshold);
    let closed = morphology::close(&mask, config.structuring_element);
    let labels = LabelMap::from_mask(&closed, config.connectivity);

    tracing::debug!(
        "Segmented {}x{} reference plane: threshold {:.4e}, {} signal pixels, {} components",
        reference.width(),
        reference.height(),
        threshold,
        closed.count_set(),
        labels.num_labels()
    );
    Ok((labels, threshold))
}

/// Assign cluster ids to `peaks` according to `source`.
///
/// Updates every peak's `cluster_id` and `member_count` and returns the
/// clusters in ascending id order.
pub fn assign_clusters(
    peaks: &mut [Peak],
    reference: &Grid2<f64>,
    source: &ClusterSource,
) -> Result<Clustering> {
    match source {
        ClusterSource::Segment(config) => {
            let (labels, threshold) = segment(reference, config)?;
            let ids = ids_from_labels(peaks, &labels);
            let clusters = apply_ids(peaks, &ids, reference.width(), reference.height());
            Ok(Clustering {
                clusters,
                threshold: Some(threshold),
                labels: Some(labels),
            })
        }
        ClusterSource::FromTable => {
            let ids = peaks
                .iter()
                .map(|p| match p.cluster_hint {
                    Some(0) => Err(Error::InvalidClusterHint {
                        assignment: p.assignment.clone(),
                        cluster_id: 0,
                    }),
                    Some(id) => Ok(id),
                    None => Err(Error::MissingColumn {
                        column: "cluster_id",
                        row: p.index,
                    }),
                })
                .collect::<Result<Vec<_>>>()?;
            let clusters = apply_ids(peaks, &ids, reference.width(), reference.height());
            Ok(Clustering {
                clusters,
                threshold: None,
                labels: None,
            })
        }
    }
}

/// Label under each peak; background peaks get `num_labels + 1, + 2, ...`
/// in peak order.
fn ids_from_labels(peaks: &[Peak], labels: &LabelMap) -> Vec<u32> {
    let mut next_id = labels.num_labels() as u32 + 1;
    peaks
        .iter()
        .map(|peak| {
            let (x, y) = peak.pixel();
            match labels.label_at(x, y) {
                0 => {
                    let id = next_id;
                    next_id += 1;
                    id
                }
                label => label,
            }
        })
        .collect()
}

fn apply_ids(peaks: &mut [Peak], ids: &[u32], width: usize, height: usize) -> Vec<Cluster> {
    let mut members: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (i, &id) in ids.iter().enumerate() {
        members.entry(id).or_default().push(i);
    }

    for (peak, &id) in peaks.iter_mut().zip(ids) {
        peak.cluster_id = id;
        peak.member_count = members.get(&id).map_or(0, Vec::len);
    }

    let peaks: &[Peak] = peaks;
    members
        .into_iter()
        .map(|(id, members)| {
            let bbox = BoundingBox::around(width, height, members.iter().map(|&i| &peaks[i]));
            Cluster { id, members, bbox }
        })
        .collect()
}
