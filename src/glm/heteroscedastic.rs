//! Welch-type G statistic with one residual variance per site.
//!
//! Each site is a variance group. Per voxel, group variances are estimated
//! from the full-model residuals, observations are weighted by the inverse of
//! their group variance, and the contrast is tested with a Wald statistic
//! scaled by the Welch correction:
//!
//! ```text
//! W_g  = Σ_{i∈g} R_ii / Σ_{i∈g} r_i²
//! A    = Σ_g (1 − W_g n_g / Σ_h W_h n_h)² / Σ_{i∈g} R_ii
//! Λ    = 1 + 2(s − 1) / (s(s + 2)) · A
//! G    = (Cβ)ᵀ (C (MᵀWM)⁻¹ Cᵀ)⁻¹ (Cβ) / (Λ s)
//! ν    = s(s + 2) / (3A)
//! ```
//!
//! For a pure site design this is Welch's ANOVA, and for two sites `G` is
//! the square of Welch's t.

use crate::error::{Error, Result};
use crate::types::{Matrix, Vector};

/// Lower bound on a group variance, relative to the pooled variance.
const VARIANCE_FLOOR: f64 = 1e-10;

/// Denominator degrees of freedom reported when the groups carry no
/// correction (`A = 0`); the F distribution with this ν is the χ²/s limit.
pub const MAX_DENOMINATOR_DOF: f64 = 1e7;

/// Per-site variance model built once per design.
#[derive(Debug, Clone)]
pub struct Heteroscedastic {
    design: Matrix,
    contrast: Matrix,
    groups: Vec<usize>,
    group_sizes: Vec<usize>,
    /// `Σ_{i∈g} R_ii` per group.
    residual_sums: Vec<f64>,
    /// `M_gᵀ M_g` per group.
    grams: Vec<Matrix>,
}

/// G statistic and its Welch denominator degrees of freedom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WelchStatistic {
    pub statistic: f64,
    pub denominator_dof: f64,
}

impl Heteroscedastic {
    /// `groups[i]` is the variance group (site index) of subject `i`.
    pub fn new(design: &Matrix, contrast: &Matrix, groups: &[usize], residual_diagonal: &[f64]) -> Result<Self> {
        let (n, p) = design.shape();
        if groups.len() != n || residual_diagonal.len() != n {
            return Err(Error::InsufficientData(format!(
                "variance groups cover {} subjects, design has {}",
                groups.len(),
                n
            )));
        }

        let n_groups = groups.iter().copied().max().map_or(0, |g| g + 1);
        let mut group_sizes = vec![0usize; n_groups];
        let mut residual_sums = vec![0.0; n_groups];
        let mut grams = vec![Matrix::zeros(p, p); n_groups];

        for (i, &g) in groups.iter().enumerate() {
            group_sizes[g] += 1;
            residual_sums[g] += residual_diagonal[i];
            let row = design.row(i);
            grams[g] += row.transpose() * row;
        }

        if let Some(g) = residual_sums.iter().position(|&r| r <= 1e-8) {
            return Err(Error::InsufficientData(format!(
                "variance group {} has no residual degrees of freedom ({} subjects)",
                g, group_sizes[g]
            )));
        }

        Ok(Self {
            design: design.clone(),
            contrast: contrast.clone(),
            groups: groups.to_vec(),
            group_sizes,
            residual_sums,
            grams,
        })
    }

    /// Number of variance groups.
    pub fn n_groups(&self) -> usize {
        self.group_sizes.len()
    }

    /// Evaluate G for data `u` with full-model residuals `residual`.
    ///
    /// `group_ss` is scratch space of length [`Self::n_groups`].
    pub fn statistic(&self, u: &[f64], residual: &[f64], ss_within: f64, group_ss: &mut [f64]) -> WelchStatistic {
        let (n, p) = self.design.shape();
        let s = self.contrast.nrows() as f64;

        let pooled = ss_within / (n - p) as f64;
        if !(pooled > 0.0) {
            return WelchStatistic {
                statistic: 0.0,
                denominator_dof: MAX_DENOMINATOR_DOF,
            };
        }

        group_ss.iter_mut().for_each(|v| *v = 0.0);
        for (&g, r) in self.groups.iter().zip(residual) {
            group_ss[g] += r * r;
        }

        let floor = pooled * VARIANCE_FLOOR;
        let weights: Vec<f64> = group_ss
            .iter()
            .zip(&self.residual_sums)
            .map(|(ss, rsum)| 1.0 / (ss / rsum).max(floor))
            .collect();

        let mut mwm = Matrix::zeros(p, p);
        for (w, gram) in weights.iter().zip(&self.grams) {
            mwm += gram * *w;
        }

        let mut mwu = Vector::zeros(p);
        for (j, column) in self.design.as_slice().chunks_exact(n).enumerate() {
            mwu[j] = column
                .iter()
                .zip(u)
                .zip(&self.groups)
                .map(|((m, x), &g)| m * x * weights[g])
                .sum();
        }

        let Some(mwm_inv) = mwm.cholesky().map(|c| c.inverse()) else {
            return WelchStatistic {
                statistic: 0.0,
                denominator_dof: MAX_DENOMINATOR_DOF,
            };
        };

        let beta = &mwm_inv * mwu;
        let cb = &self.contrast * beta;
        let cov = &self.contrast * &mwm_inv * self.contrast.transpose();
        let wald = match cov.cholesky() {
            Some(chol) => cb.dot(&chol.solve(&cb)),
            None => 0.0,
        };

        let trace: f64 = weights
            .iter()
            .zip(&self.group_sizes)
            .map(|(w, &ng)| w * ng as f64)
            .sum();
        let correction: f64 = weights
            .iter()
            .zip(&self.group_sizes)
            .zip(&self.residual_sums)
            .map(|((w, &ng), rsum)| {
                let d = 1.0 - w * ng as f64 / trace;
                d * d / rsum
            })
            .sum();

        let lambda = 1.0 + 2.0 * (s - 1.0) / (s * (s + 2.0)) * correction;
        let denominator_dof = if correction > 0.0 {
            (s * (s + 2.0) / (3.0 * correction)).min(MAX_DENOMINATOR_DOF)
        } else {
            MAX_DENOMINATOR_DOF
        };

        WelchStatistic {
            statistic: (wald / (lambda * s)).max(0.0),
            denominator_dof,
        }
    }
}
