//! Configuration for site-effect analysis.

use serde::{Deserialize, Serialize};

use crate::design::ContrastSpec;
use crate::error::{Error, Result};
use crate::types::{ParallelAxis, TestKind, VarianceMode};

/// Configuration options for `SiteEffectTest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Inference driving the significance maps (default: permutation).
    pub test_kind: TestKind,

    /// Non-identity permutations (default: 5,000).
    pub n_permutations: usize,

    /// Significance level (default: 0.05).
    pub alpha: f64,

    /// Optional deterministic seed for the permutation sequence.
    ///
    /// When absent a fresh seed is drawn and echoed in the summary.
    pub seed: Option<u64>,

    /// Error model (default: homoscedastic).
    pub variance_mode: VarianceMode,

    /// Covariate columns to include in the design, in order.
    pub covariates: Vec<String>,

    /// Z-score continuous covariates (default: true).
    pub standardize_covariates: bool,

    /// Handling of missing numeric covariate values (default: mean imputation).
    pub missing_values: MissingValues,

    /// Reference site for treatment coding (default: first site encountered).
    pub reference_site: Option<String>,

    /// False-discovery-rate procedure (default: Benjamini-Hochberg).
    pub fdr_method: FdrMethod,

    /// Condition number above which a near-collinearity warning is raised.
    pub condition_warning: f64,

    /// Parallel decomposition of the permutation loop (default: auto).
    pub parallel_axis: ParallelAxis,

    /// Worker threads; `None` uses the shared pool.
    pub threads: Option<usize>,

    /// Optional per-subject exchangeability block labels.
    ///
    /// Non-identity permutations only reorder subjects within a block.
    pub exchangeability_blocks: Option<Vec<usize>>,

    /// Hypothesis to test instead of the site effect (default: all site dummies).
    pub contrast: Option<ContrastSpec>,
}

/// Strategy for missing numeric covariate values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValues {
    /// Replace with the mean of the observed values.
    #[default]
    Mean,
    /// Replace with the median of the observed values.
    Median,
    /// Fail with `MissingCovariateValue`.
    Reject,
}

/// False-discovery-rate step-up procedure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FdrMethod {
    /// Benjamini-Hochberg (independent or positively dependent tests).
    #[default]
    BenjaminiHochberg,
    /// Benjamini-Yekutieli (arbitrary dependence, more conservative).
    BenjaminiYekutieli,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            test_kind: TestKind::Permutation,
            n_permutations: 5_000,
            alpha: 0.05,
            seed: None,
            variance_mode: VarianceMode::Homoscedastic,
            covariates: Vec::new(),
            standardize_covariates: true,
            missing_values: MissingValues::Mean,
            reference_site: None,
            fdr_method: FdrMethod::BenjaminiHochberg,
            condition_warning: 100.0,
            parallel_axis: ParallelAxis::Auto,
            threads: None,
            exchangeability_blocks: None,
            contrast: None,
        }
    }
}

impl Config {
    /// Reject out-of-range values before any computation starts.
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if self.test_kind == TestKind::Permutation && self.n_permutations == 0 {
            return Err(Error::InvalidConfig(
                "permutation test requires at least one permutation".to_string(),
            ));
        }
        if self.threads == Some(0) {
            return Err(Error::InvalidConfig("threads must be positive".to_string()));
        }
        if !(self.condition_warning > 1.0) {
            return Err(Error::InvalidConfig(format!(
                "condition warning threshold must exceed 1, got {}",
                self.condition_warning
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_invocation_defaults() {
        let config = Config::default();
        assert_eq!(config.n_permutations, 5_000);
        assert!((config.alpha - 0.05).abs() < 1e-12);
        assert!(config.seed.is_none());
        assert_eq!(config.variance_mode, VarianceMode::Homoscedastic);
        assert_eq!(config.test_kind, TestKind::Permutation);
        assert!(config.covariates.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_alpha() {
        let config = Config {
            alpha: 1.5,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_parametric_allows_zero_permutations() {
        let config = Config {
            test_kind: TestKind::Parametric,
            n_permutations: 0,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }
}
