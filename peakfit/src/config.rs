//! Configuration types for a fitting run.
//!
//! [`FitConfig`] is built once (directly, or from a YAML/JSON file) and
//! validated by [`FitConfig::validate`] before any clustering or fitting.

use std::path::Path;

use common::FileFormat;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{Error, Result};
use crate::fit::lm::LmConfig;

// ============================================================================
// Enums
// ============================================================================

/// Lineshape family fitted on both spatial axes.
///
/// Families differ only in how the pseudo-Voigt `fraction` is treated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
pub enum Lineshape {
    /// Mixed Gaussian/Lorentzian, fraction free.
    #[default]
    #[serde(rename = "PV")]
    #[strum(serialize = "PV")]
    PseudoVoigt,
    /// Fraction pinned to 0.
    #[serde(rename = "G")]
    #[strum(serialize = "G")]
    Gaussian,
    /// Fraction pinned to 1.
    #[serde(rename = "L")]
    #[strum(serialize = "L")]
    Lorentzian,
}

impl Lineshape {
    /// Fraction value this family fixes, or `None` if the fraction is fitted.
    pub fn pinned_fraction(self) -> Option<f64> {
        match self {
            Lineshape::PseudoVoigt => None,
            Lineshape::Gaussian => Some(0.0),
            Lineshape::Lorentzian => Some(1.0),
        }
    }
}

/// Parameter classes that can be frozen after the reference-plane fit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ParameterClass {
    Fraction,
    Sigma,
    Center,
}

impl ParameterClass {
    pub const ALL: [ParameterClass; 3] = [
        ParameterClass::Fraction,
        ParameterClass::Sigma,
        ParameterClass::Center,
    ];
}

/// Pixel connectivity for connected component labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Only horizontal and vertical neighbors.
    #[default]
    Four,
    /// Diagonal neighbors too.
    Eight,
}

/// Structuring element used for morphological closing of the signal mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum StructuringElement {
    /// `size x size` block.
    Square { size: usize },
    /// Disk of radius `size / 2`.
    Disk { size: usize },
    /// `width` columns by `height` rows.
    Rectangle { width: usize, height: usize },
}

impl Default for StructuringElement {
    fn default() -> Self {
        StructuringElement::Square { size: 3 }
    }
}

impl StructuringElement {
    pub fn validate(&self) -> Result<()> {
        let ok = match *self {
            StructuringElement::Square { size } | StructuringElement::Disk { size } => size > 0,
            StructuringElement::Rectangle { width, height } => width > 0 && height > 0,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidConfig(format!(
                "structuring element must have non-zero size, got {self:?}"
            )))
        }
    }

    /// Columns and rows covered by the element.
    pub fn extent(&self) -> (usize, usize) {
        match *self {
            StructuringElement::Square { size } => (size, size),
            StructuringElement::Disk { size } => {
                let side = 2 * (size / 2) + 1;
                (side, side)
            }
            StructuringElement::Rectangle { width, height } => (width, height),
        }
    }

    /// Reject elements larger than the `width x height` plane they close.
    pub fn validate_for_plane(&self, width: usize, height: usize) -> Result<()> {
        self.validate()?;
        let (w, h) = self.extent();
        if w > width || h > height {
            return Err(Error::InvalidConfig(format!(
                "structuring element {w}x{h} exceeds the {width}x{height} plane"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Clustering
// ============================================================================

/// Segmentation settings for grouping peaks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Explicit noise threshold; `None` selects Otsu's method.
    pub threshold: Option<f64>,
    pub structuring_element: StructuringElement,
    pub connectivity: Connectivity,
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(threshold) = self.threshold {
            if !threshold.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "threshold must be finite, got {threshold}"
                )));
            }
        }
        self.structuring_element.validate()
    }
}

/// Where cluster membership comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ClusterSource {
    /// Segment the summed planes.
    Segment(ClusterConfig),
    /// Use the cluster ids already present in the peak table.
    FromTable,
}

impl Default for ClusterSource {
    fn default() -> Self {
        ClusterSource::Segment(ClusterConfig::default())
    }
}

// ============================================================================
// FitConfig
// ============================================================================

/// Complete configuration of a fitting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub lineshape: Lineshape,
    /// Classes frozen at their reference-plane values before per-plane fits.
    pub fix: Vec<ParameterClass>,
    /// Maximum center displacement from the seed, in ppm `[x, y]`.
    pub xy_bounds: Option<[f64; 2]>,
    pub cluster: ClusterSource,
    /// Clusters with more members are not fitted. `None` fits everything.
    pub max_cluster_size: Option<usize>,
    /// Per-plane values (delays, titration points) copied into the output.
    pub vclist: Option<Vec<f64>>,
    pub solver: LmConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            lineshape: Lineshape::default(),
            fix: ParameterClass::ALL.to_vec(),
            xy_bounds: None,
            cluster: ClusterSource::default(),
            max_cluster_size: None,
            vclist: None,
            solver: LmConfig::default(),
        }
    }
}

impl FitConfig {
    /// Parse from text in the given format and validate.
    pub fn from_str_with_format(text: &str, format: FileFormat, path: &Path) -> Result<Self> {
        let config: FitConfig =
            common::deserialize(text, format).map_err(|source| Error::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a `.yaml`/`.yml`/`.json` config file and validate it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let format = FileFormat::from_path(path).map_err(|source| Error::ConfigFormat {
            path: path.to_path_buf(),
            source,
        })?;
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str_with_format(&text, format, path)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(max) = self.max_cluster_size {
            if max == 0 {
                return Err(Error::InvalidConfig(
                    "max_cluster_size must be positive".to_string(),
                ));
            }
        }
        if let Some([bx, by]) = self.xy_bounds {
            if !(bx.is_finite() && by.is_finite() && bx > 0.0 && by > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "xy_bounds must be positive and finite, got [{bx}, {by}]"
                )));
            }
        }
        if let Some(vclist) = &self.vclist {
            if vclist.iter().any(|v| !v.is_finite()) {
                return Err(Error::InvalidConfig(
                    "vclist contains non-finite values".to_string(),
                ));
            }
        }
        if let ClusterSource::Segment(cluster) = &self.cluster {
            cluster.validate()?;
        }
        self.solver.validate()
    }

    /// Whether `class` is frozen after the reference-plane fit.
    pub fn fixes(&self, class: ParameterClass) -> bool {
        self.fix.contains(&class)
    }
}
