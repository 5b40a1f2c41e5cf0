//! Error and warning types.
//!
//! Fatal conditions are [`Error`] values and abort the invocation before any
//! artifact is written. Recoverable conditions are [`Warning`] values attached
//! to the summary.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors raised by the site-effect pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// A subject volume or the mask does not share the common voxel grid.
    #[error("voxel grid mismatch for {what}: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        /// Which input disagreed (subject id or "mask").
        what: String,
        /// Grid of the first volume.
        expected: [usize; 3],
        /// Grid of the offending volume.
        found: [usize; 3],
    },

    /// A volume's data does not fill its declared grid.
    #[error("volume of {what} holds {found} values but its grid has {expected}")]
    VolumeLength {
        /// Subject id.
        what: String,
        /// Product of the grid dimensions.
        expected: usize,
        /// Number of stored values.
        found: usize,
    },

    /// A required site-list column could not be resolved.
    #[error("site list is missing required column '{0}'")]
    MissingColumn(String),

    /// None of the accepted image-path aliases is present in the site list.
    #[error("site list has no image path column (accepted: {accepted})")]
    UnresolvedImageColumn {
        /// Comma-separated list of accepted aliases.
        accepted: String,
    },

    /// The design matrix is not of full column rank.
    #[error("design matrix is rank deficient: rank {rank} < {columns} columns")]
    DesignRankDeficient {
        /// Numerical rank.
        rank: usize,
        /// Number of design columns.
        columns: usize,
    },

    /// A categorical covariate has more than two levels.
    #[error(
        "covariate '{name}' has {levels} distinct levels; only continuous and binary covariates are supported"
    )]
    UnsupportedCovariateKind {
        /// Covariate name.
        name: String,
        /// Number of distinct levels found.
        levels: usize,
    },

    /// A covariate value is missing and cannot be imputed.
    #[error("covariate '{name}' has no value for subject '{subject}'")]
    MissingCovariateValue {
        /// Covariate name.
        name: String,
        /// Subject identifier.
        subject: String,
    },

    /// The hypothesis does not fit the design.
    #[error("invalid contrast: {0}")]
    InvalidContrast(String),

    /// Too few subjects or sites to fit the model.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// The mask selects no voxel.
    #[error("mask contains no voxels")]
    EmptyMask,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem failure on a specific path.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Malformed delimited table.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Malformed JSON document.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable conditions reported alongside the results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Design columns are nearly collinear.
    HighConditionNumber {
        /// Ratio of largest to smallest singular value.
        condition: f64,
        /// Configured warning threshold.
        threshold: f64,
    },
    /// A covariate was constant across subjects and dropped.
    DroppedConstantCovariate {
        /// Covariate name.
        name: String,
    },
    /// Missing covariate values were imputed.
    ImputedMissingValues {
        /// Covariate name.
        name: String,
        /// Number of imputed subjects.
        count: usize,
    },
    /// Parametric p-values are not available in this build.
    ParametricUnavailable,
    /// Fewer distinct permutations exist than were requested; all were enumerated.
    ExhaustivePermutations {
        /// Requested permutation count.
        requested: usize,
        /// Permutations actually used (excluding identity).
        used: usize,
    },
    /// Masked voxels with non-finite values were excluded from testing.
    NonFiniteVoxels {
        /// Number of affected voxels.
        count: usize,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::HighConditionNumber {
                condition,
                threshold,
            } => write!(
                f,
                "design condition number {:.1} exceeds {:.1}; estimates may be unstable",
                condition, threshold
            ),
            Warning::DroppedConstantCovariate { name } => {
                write!(f, "covariate '{}' is constant and was dropped", name)
            }
            Warning::ImputedMissingValues { name, count } => {
                write!(f, "imputed {} missing value(s) for covariate '{}'", count, name)
            }
            Warning::ParametricUnavailable => {
                write!(f, "parametric distributions unavailable; parametric p-values disabled")
            }
            Warning::ExhaustivePermutations { requested, used } => write!(
                f,
                "only {} distinct permutations exist ({} requested); enumerated all",
                used, requested
            ),
            Warning::NonFiniteVoxels { count } => write!(
                f,
                "{} masked voxel(s) contain non-finite values and were not tested",
                count
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_error_message() {
        let err = Error::DesignRankDeficient {
            rank: 2,
            columns: 3,
        };
        assert_eq!(
            err.to_string(),
            "design matrix is rank deficient: rank 2 < 3 columns"
        );
    }

    #[test]
    fn test_warning_serializes_tagged() {
        let json = serde_json::to_string(&Warning::DroppedConstantCovariate {
            name: "age".to_string(),
        })
        .unwrap();
        assert!(json.contains("\"kind\":\"dropped_constant_covariate\""));
        assert!(json.contains("\"name\":\"age\""));
    }
}
