//! Type aliases and common types.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Dense column-major matrix (subjects × predictors, subjects × voxels, ...).
pub type Matrix = DMatrix<f64>;

/// Dense column vector.
pub type Vector = DVector<f64>;

/// Which inference drives the reported significance maps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    /// Freedman-Lane permutation inference (distribution-free).
    #[default]
    Permutation,
    /// Parametric reference distribution of the statistic.
    Parametric,
}

/// Error model of the voxel-wise GLM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceMode {
    /// One common error variance, F-statistic.
    #[default]
    Homoscedastic,
    /// One error variance per site, Welch-type G-statistic.
    Heteroscedastic,
}

impl VarianceMode {
    /// Conventional name of the statistic this mode produces.
    pub fn statistic_name(&self) -> &'static str {
        match self {
            VarianceMode::Homoscedastic => "F",
            VarianceMode::Heteroscedastic => "G",
        }
    }
}

/// Axis along which the permutation work is split across threads.
///
/// Results are identical for every choice; only throughput differs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelAxis {
    /// Pick whichever axis has more units of work.
    #[default]
    Auto,
    /// Each worker owns a block of voxels and runs every permutation on it.
    Voxels,
    /// Each worker owns a block of permutations and scans every voxel.
    Permutations,
}

impl ParallelAxis {
    /// Resolve `Auto` against the problem size.
    pub fn resolve(self, n_voxels: usize, n_shuffles: usize) -> Self {
        match self {
            ParallelAxis::Auto if n_voxels >= n_shuffles => ParallelAxis::Voxels,
            ParallelAxis::Auto => ParallelAxis::Permutations,
            axis => axis,
        }
    }
}
