//! Hypotheses: named contrast matrices over the design columns.
//!
//! A [`Hypothesis`] is bound to a concrete design. A [`ContrastSpec`] names
//! its columns instead of indexing them, so it can be configured before the
//! design exists and resolved once the column names are known.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Matrix;

/// Relative singular-value tolerance for contrast rank.
const RANK_TOLERANCE: f64 = 1e-10;

/// A contrast `C` (q × p) whose rows are jointly tested against zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    name: String,
    matrix: Matrix,
}

impl Hypothesis {
    /// Create a hypothesis; rows must be linearly independent.
    pub fn new(matrix: Matrix, name: impl Into<String>) -> Result<Self> {
        if matrix.nrows() == 0 || matrix.ncols() == 0 {
            return Err(Error::InvalidContrast("contrast matrix is empty".to_string()));
        }
        let rank = numerical_rank(&matrix);
        if rank < matrix.nrows() {
            return Err(Error::InvalidContrast(format!(
                "contrast has {} rows but rank {}",
                matrix.nrows(),
                rank
            )));
        }
        Ok(Self {
            name: name.into(),
            matrix,
        })
    }

    /// Contrast selecting the given design columns (one row per column).
    pub fn select(columns: &[usize], n_columns: usize, name: impl Into<String>) -> Result<Self> {
        if let Some(&bad) = columns.iter().find(|&&c| c >= n_columns) {
            return Err(Error::InvalidContrast(format!(
                "column {} outside design with {} columns",
                bad, n_columns
            )));
        }
        let mut matrix = Matrix::zeros(columns.len(), n_columns);
        for (row, &col) in columns.iter().enumerate() {
            matrix[(row, col)] = 1.0;
        }
        Self::new(matrix, name)
    }

    /// Built-in site-effect test: all site-dummy columns of
    /// `[intercept | site dummies | covariates]`.
    pub fn site_effect(n_sites: usize, n_covariates: usize) -> Result<Self> {
        if n_sites < 2 {
            return Err(Error::InsufficientData(format!(
                "site effect needs at least two sites, found {}",
                n_sites
            )));
        }
        let columns: Vec<usize> = (1..n_sites).collect();
        Self::select(&columns, n_sites + n_covariates, "site_effect")
    }

    /// Hypothesis name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Contrast matrix.
    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// Number of design columns the contrast spans.
    pub fn cols(&self) -> usize {
        self.matrix.ncols()
    }

    /// Numerator degrees of freedom (rows of the contrast).
    pub fn rank(&self) -> usize {
        self.matrix.nrows()
    }

    /// Whether this is a multi-row (F-type) test rather than a single contrast.
    pub fn is_f(&self) -> bool {
        self.rank() > 1
    }

    /// Check the contrast against a design with `n_columns` columns.
    pub fn check_columns(&self, n_columns: usize) -> Result<()> {
        if self.cols() != n_columns {
            return Err(Error::InvalidContrast(format!(
                "contrast '{}' spans {} columns, design has {}",
                self.name,
                self.cols(),
                n_columns
            )));
        }
        Ok(())
    }
}

/// A named contrast over design columns referenced by name.
///
/// Each row maps column names to weights; unnamed columns weigh zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContrastSpec {
    /// Hypothesis name, echoed in the summary.
    pub name: String,
    /// One weight list per contrast row.
    pub rows: Vec<Vec<(String, f64)>>,
}

impl ContrastSpec {
    /// Jointly test that each named column's coefficient is zero.
    pub fn columns<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            rows: columns.into_iter().map(|c| vec![(c.into(), 1.0)]).collect(),
        }
    }

    /// Arbitrary weighted rows.
    pub fn weighted(name: impl Into<String>, rows: Vec<Vec<(String, f64)>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Bind to a design with the given column names.
    pub fn resolve(&self, column_names: &[String]) -> Result<Hypothesis> {
        let mut matrix = Matrix::zeros(self.rows.len(), column_names.len());
        for (r, row) in self.rows.iter().enumerate() {
            for (column, weight) in row {
                let c = column_names.iter().position(|n| n == column).ok_or_else(|| {
                    Error::InvalidContrast(format!(
                        "contrast '{}' names unknown column '{}' (design: {})",
                        self.name,
                        column,
                        column_names.join(", ")
                    ))
                })?;
                matrix[(r, c)] += weight;
            }
        }
        Hypothesis::new(matrix, self.name.clone())
    }
}

/// Rank from singular values relative to the largest one.
pub(crate) fn numerical_rank(matrix: &Matrix) -> usize {
    let singular = matrix.clone().svd(false, false).singular_values;
    let max = singular.iter().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return 0;
    }
    singular.iter().filter(|&&s| s > max * RANK_TOLERANCE).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_row_contrast() {
        let h = Hypothesis::new(Matrix::from_row_slice(1, 4, &[1.0, -1.0, 0.0, 0.0]), "site_diff").unwrap();
        assert_eq!(h.cols(), 4);
        assert_eq!(h.rank(), 1);
        assert!(!h.is_f());
        assert_eq!(h.name(), "site_diff");
    }

    #[test]
    fn test_site_contrast_two_sites() {
        let h = Hypothesis::site_effect(2, 0).unwrap();
        assert!(!h.is_f());
        assert_eq!(h.cols(), 2);
        assert_eq!(h.name(), "site_effect");
        assert_eq!(h.matrix()[(0, 1)], 1.0);
    }

    #[test]
    fn test_site_contrast_three_sites_with_covariate() {
        let h = Hypothesis::site_effect(3, 1).unwrap();
        assert!(h.is_f());
        assert_eq!(h.rank(), 2);
        assert_eq!(h.cols(), 4);
        assert_eq!(h.matrix()[(0, 1)], 1.0);
        assert_eq!(h.matrix()[(1, 2)], 1.0);
        assert_eq!(h.matrix()[(1, 3)], 0.0);
    }

    #[test]
    fn test_dependent_rows_rejected() {
        let m = Matrix::from_row_slice(2, 3, &[0.0, 1.0, 0.0, 0.0, 2.0, 0.0]);
        assert!(matches!(Hypothesis::new(m, "dup"), Err(Error::InvalidContrast(_))));
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_spec_resolves_named_columns() {
        let names = columns(&["intercept", "site_B", "age", "sex"]);
        let h = ContrastSpec::columns("demographics", ["age", "sex"]).resolve(&names).unwrap();
        assert_eq!(h.name(), "demographics");
        assert_eq!(h.rank(), 2);
        assert_eq!(h.matrix()[(0, 2)], 1.0);
        assert_eq!(h.matrix()[(1, 3)], 1.0);
        assert_eq!(h.matrix()[(0, 1)], 0.0);
    }

    #[test]
    fn test_weighted_spec() {
        let names = columns(&["intercept", "site_B", "site_C"]);
        let spec = ContrastSpec::weighted(
            "b_vs_c",
            vec![vec![("site_B".to_string(), 1.0), ("site_C".to_string(), -1.0)]],
        );
        let h = spec.resolve(&names).unwrap();
        assert_eq!(h.matrix()[(0, 1)], 1.0);
        assert_eq!(h.matrix()[(0, 2)], -1.0);
    }

    #[test]
    fn test_spec_unknown_column() {
        let names = columns(&["intercept", "site_B"]);
        let err = ContrastSpec::columns("bad", ["age"]).resolve(&names).unwrap_err();
        assert!(matches!(err, Error::InvalidContrast(_)));
    }

    #[test]
    fn test_empty_spec_rejected() {
        let names = columns(&["intercept", "site_B"]);
        let spec = ContrastSpec::columns("none", Vec::<String>::new());
        assert!(matches!(spec.resolve(&names), Err(Error::InvalidContrast(_))));
    }

    #[test]
    fn test_single_site_rejected() {
        assert!(matches!(
            Hypothesis::site_effect(1, 0),
            Err(Error::InsufficientData(_))
        ));
    }
}
