//! Design matrix construction: `[intercept | site dummies | covariates]`.
//!
//! Sites are ordered by first appearance. The reference site has no column;
//! every other site gets one treatment-coded indicator column.

use tracing::{debug, warn};

use super::contrast::{numerical_rank, Hypothesis};
use super::covariates::EncodedCovariate;
use crate::error::{Error, Result, Warning};
use crate::types::Matrix;

/// Default condition number above which collinearity is reported.
pub const DEFAULT_CONDITION_WARNING: f64 = 100.0;

/// A validated, full-rank design with its site-effect hypothesis.
#[derive(Debug, Clone)]
pub struct Design {
    /// Subjects × predictors.
    pub matrix: Matrix,
    /// Column names (`intercept`, `site_<label>`, covariate names).
    pub column_names: Vec<String>,
    /// Unique site labels in first-appearance order.
    pub sites: Vec<String>,
    /// Site without a dummy column.
    pub reference_site: String,
    /// Index into `sites` for each subject.
    pub site_of_subject: Vec<usize>,
    /// Encoded covariate columns, in design order.
    pub covariates: Vec<EncodedCovariate>,
    /// Contrast over the site-dummy columns.
    pub hypothesis: Hypothesis,
    /// Ratio of largest to smallest singular value.
    pub condition_number: f64,
}

impl Design {
    /// Number of subjects (rows).
    pub fn n_subjects(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of predictors (columns).
    pub fn n_predictors(&self) -> usize {
        self.matrix.ncols()
    }

    /// Number of unique sites.
    pub fn n_sites(&self) -> usize {
        self.sites.len()
    }

    /// Residual degrees of freedom `n - p`.
    pub fn residual_dof(&self) -> usize {
        self.n_subjects() - self.n_predictors()
    }

    /// Subjects per site, aligned with `sites`.
    pub fn site_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.sites.len()];
        for &s in &self.site_of_subject {
            counts[s] += 1;
        }
        counts
    }
}

/// Numerical rank and condition number of a design matrix.
pub fn check_design(matrix: &Matrix) -> (usize, f64) {
    let singular = matrix.clone().svd(false, false).singular_values;
    let max = singular.iter().copied().fold(0.0_f64, f64::max);
    let min = singular.iter().copied().fold(f64::INFINITY, f64::min);
    let condition = if min > 0.0 { max / min } else { f64::INFINITY };
    (numerical_rank(matrix), condition)
}

/// Builds a [`Design`] from site labels and encoded covariates.
#[derive(Debug, Clone)]
pub struct DesignBuilder<'a> {
    site_labels: &'a [String],
    covariates: Vec<EncodedCovariate>,
    reference_site: Option<String>,
    condition_warning: f64,
}

impl<'a> DesignBuilder<'a> {
    /// Start from one site label per subject.
    pub fn new(site_labels: &'a [String]) -> Self {
        Self {
            site_labels,
            covariates: Vec::new(),
            reference_site: None,
            condition_warning: DEFAULT_CONDITION_WARNING,
        }
    }

    /// Append encoded covariate columns.
    pub fn covariates(mut self, covariates: Vec<EncodedCovariate>) -> Self {
        self.covariates = covariates;
        self
    }

    /// Use `site` as the reference level instead of the first site encountered.
    pub fn reference_site(mut self, site: Option<String>) -> Self {
        self.reference_site = site;
        self
    }

    /// Condition number threshold for the collinearity warning.
    pub fn condition_warning(mut self, threshold: f64) -> Self {
        self.condition_warning = threshold;
        self
    }

    /// Assemble and validate the design.
    pub fn build(self) -> Result<(Design, Vec<Warning>)> {
        let n = self.site_labels.len();

        let mut sites: Vec<String> = Vec::new();
        let site_of_subject: Vec<usize> = self
            .site_labels
            .iter()
            .map(|label| match sites.iter().position(|s| s == label) {
                Some(idx) => idx,
                None => {
                    sites.push(label.clone());
                    sites.len() - 1
                }
            })
            .collect();

        if sites.len() < 2 {
            return Err(Error::InsufficientData(format!(
                "site effect needs at least two sites, found {}",
                sites.len()
            )));
        }

        let reference = match &self.reference_site {
            Some(site) => sites.iter().position(|s| s == site).ok_or_else(|| {
                Error::InvalidConfig(format!("reference site '{}' not in site list", site))
            })?,
            None => 0,
        };

        for cov in &self.covariates {
            if cov.values.len() != n {
                return Err(Error::InsufficientData(format!(
                    "covariate '{}' has {} values for {} subjects",
                    cov.name,
                    cov.values.len(),
                    n
                )));
            }
        }

        let dummy_sites: Vec<usize> = (0..sites.len()).filter(|&s| s != reference).collect();
        let p = 1 + dummy_sites.len() + self.covariates.len();

        if n <= p {
            return Err(Error::InsufficientData(format!(
                "{} subjects cannot fit {} predictors",
                n, p
            )));
        }

        let mut matrix = Matrix::zeros(n, p);
        let mut column_names = Vec::with_capacity(p);

        column_names.push("intercept".to_string());
        matrix.column_mut(0).fill(1.0);

        for (offset, &site) in dummy_sites.iter().enumerate() {
            let col = 1 + offset;
            column_names.push(format!("site_{}", sites[site]));
            for (row, &s) in site_of_subject.iter().enumerate() {
                if s == site {
                    matrix[(row, col)] = 1.0;
                }
            }
        }

        let first_cov = 1 + dummy_sites.len();
        for (offset, cov) in self.covariates.iter().enumerate() {
            column_names.push(cov.name.clone());
            for (row, &v) in cov.values.iter().enumerate() {
                matrix[(row, first_cov + offset)] = v;
            }
        }

        let (rank, condition_number) = check_design(&matrix);
        if rank < p {
            return Err(Error::DesignRankDeficient { rank, columns: p });
        }

        let mut warnings = Vec::new();
        if condition_number > self.condition_warning {
            warn!(
                condition = condition_number,
                threshold = self.condition_warning,
                "design matrix is nearly collinear"
            );
            warnings.push(Warning::HighConditionNumber {
                condition: condition_number,
                threshold: self.condition_warning,
            });
        }

        let hypothesis = Hypothesis::site_effect(sites.len(), self.covariates.len())?;
        debug!(columns = ?column_names, condition = condition_number, "design built");

        Ok((
            Design {
                matrix,
                column_names,
                reference_site: sites[reference].clone(),
                sites,
                site_of_subject,
                covariates: self.covariates,
                hypothesis,
                condition_number,
            },
            warnings,
        ))
    }
}
