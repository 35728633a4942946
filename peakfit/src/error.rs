//! Error types for peak fitting runs.
//!
//! Everything here is raised before any fitting starts. Per-peak solver
//! failures are not errors; they are reported as rows with `success = false`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::spectrum::SpatialAxis;

/// Errors that reject a run before fitting.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Peak table is missing required column '{column}' (row {row})")]
    MissingColumn { column: &'static str, row: usize },

    #[error("Peak table contains no included peaks")]
    EmptyPeakTable,

    #[error("Peak '{assignment}' has non-positive {axis} radius {radius}")]
    NonPositiveRadius {
        assignment: String,
        axis: SpatialAxis,
        radius: f64,
    },

    #[error("Peak '{assignment}' has invalid cluster hint {cluster_id}")]
    InvalidClusterHint { assignment: String, cluster_id: u32 },

    #[error("Peak '{assignment}' at ({x:.2}, {y:.2}) points lies outside the {width}x{height} plane")]
    PeakOutsidePlane {
        assignment: String,
        x: f64,
        y: f64,
        width: usize,
        height: usize,
    },

    #[error("Declared {declared} axes but cube has rank {rank}")]
    AxisCountMismatch { declared: usize, rank: usize },

    #[error("Invalid axis order {order:?} for cube of rank {rank}")]
    InvalidAxisOrder { order: Vec<usize>, rank: usize },

    #[error("Cube data has {actual} values but shape {shape:?} needs {expected}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("Calibration for axis {axis} is invalid: {reason}")]
    InvalidCalibration { axis: usize, reason: String },

    #[error("Reference plane is constant ({value}); automatic threshold is undefined")]
    DegenerateReferencePlane { value: f64 },

    #[error("vclist has {actual} entries but the cube has {expected} planes")]
    VclistMismatch { expected: usize, actual: usize },

    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: common::SerdeFormatError,
    },

    #[error("Unsupported config file '{path}': {source}")]
    ConfigFormat {
        path: PathBuf,
        #[source]
        source: common::FileExtensionError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
