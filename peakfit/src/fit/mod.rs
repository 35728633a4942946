//! Composite lineshape fitting.
//!
//! - [`lm`]: Levenberg-Marquardt solver over a packed parameter vector
//! - [`params`]: free/fixed flags and box bounds
//! - [`engine`]: reference fit, freeze, per-plane refit for one cluster

pub mod engine;
pub mod lm;
pub mod params;

pub use engine::{fit_cluster, ClusterFit, EngineSettings, FitRegion, FitResult};
pub use lm::{LmConfig, LmModel, LmResult, Termination};
pub use params::ParameterSet;
