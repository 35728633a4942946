//! Peakfit - pseudo-3D peak deconvolution.
//!
//! Quantifies many overlapping peaks across a series of 2D spectral planes
//! (titrations, relaxation delays), starting from a seed list of peak
//! positions:
//! - Overlapping peaks are grouped into clusters by segmenting the summed
//!   planes
//! - Each cluster is fitted with a sum of 2D pseudo-Voigt peaks on the
//!   reference plane
//! - The fitted shapes are frozen and every plane is refitted for amplitudes
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use peakfit::{FitConfig, PeakFitter};
//!
//! let fitter = PeakFitter::new(FitConfig::from_file("fit.yaml".as_ref())?)?;
//! let report = fitter.run(&cube, &table)?;
//!
//! for row in &report.rows {
//!     println!("{} plane {}: {:.1}", row.assignment, row.plane, row.amp);
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod fit;
pub mod lineshape;
pub mod mask;
pub mod peaks;
pub mod pipeline;
pub mod spectrum;
pub mod synthetic;

// ============================================================================
// Input data
// ============================================================================

pub use peaks::{IncludeFlag, Peak, PeakRecord, PeakTable};
pub use spectrum::{AxisCalibration, AxisOrder, SpatialAxis, SpectralCube, Unit};

// ============================================================================
// Configuration
// ============================================================================

pub use config::{
    ClusterConfig, ClusterSource, Connectivity, FitConfig, Lineshape, ParameterClass,
    StructuringElement,
};
pub use fit::LmConfig;

// ============================================================================
// Clustering and fitting
// ============================================================================

pub use cluster::{assign_clusters, Cluster, Clustering, LabelMap};
pub use fit::{ClusterFit, FitResult, Termination};
pub use lineshape::{CompositeModel, PeakParams};

// ============================================================================
// Pipeline
// ============================================================================

pub use error::{Error, Result};
pub use pipeline::{FitReport, PeakFitter, ResultRow};
