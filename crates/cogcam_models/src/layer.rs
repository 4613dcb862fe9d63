//! Typed identifiers for the classifier's addressable layers.

use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Canonical name of the pooled layer.
pub const GLOBAL_POOL: &str = "global_pool";

/// A layer of [`SeverityClassifier`](crate::SeverityClassifier) that can be
/// queried for its output.
///
/// Stages are numbered from 1 on the input side and print as `stage1`,
/// `stage2`, ...; the pooled vector feeding the head prints as
/// `global_pool`.
///
/// ```rust
/// use cogcam_models::FeatureLayer;
///
/// let layer: FeatureLayer = "stage3".parse().unwrap();
/// assert_eq!(layer, FeatureLayer::Stage(3));
/// assert_eq!(FeatureLayer::GlobalPool.to_string(), "global_pool");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureLayer {
    /// Output of backbone stage `n` (1-based), spatial.
    Stage(usize),
    /// Globally averaged last stage, one value per channel.
    GlobalPool,
}

impl FeatureLayer {
    /// Check whether the layer output keeps its spatial axes.
    #[must_use]
    pub const fn is_spatial(&self) -> bool {
        matches!(self, FeatureLayer::Stage(_))
    }
}

impl fmt::Display for FeatureLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureLayer::Stage(n) => write!(f, "stage{n}"),
            FeatureLayer::GlobalPool => f.write_str(GLOBAL_POOL),
        }
    }
}

impl FromStr for FeatureLayer {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == GLOBAL_POOL {
            return Ok(FeatureLayer::GlobalPool);
        }
        s.strip_prefix("stage")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|&n| n >= 1)
            .map(FeatureLayer::Stage)
            .ok_or_else(|| ModelError::UnknownLayer(s.to_string()))
    }
}
