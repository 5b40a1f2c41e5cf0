//! Voxel-wise general linear model for the site effect.
//!
//! The model is fitted once per design ([`GlmModel::new`]); per-voxel work is
//! a handful of dot products against precomputed orthonormal bases, so the
//! same model is shared read-only across threads while each thread owns its
//! [`Workspace`].

mod heteroscedastic;
mod homoscedastic;
mod partition;

pub use heteroscedastic::{Heteroscedastic, WelchStatistic, MAX_DENOMINATOR_DOF};
pub use homoscedastic::f_statistic;
pub use partition::Partition;

use crate::design::{Design, Hypothesis};
use crate::error::Result;
use crate::statistics::f_upper_tail;
use crate::types::{Matrix, VarianceMode};

/// Fit of one voxel (or one permutation of one voxel).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelFit {
    /// F (homoscedastic) or G (heteroscedastic).
    pub statistic: f64,
    /// Sum of squares explained by the tested contrast.
    pub ss_between: f64,
    /// Full-model residual sum of squares.
    pub ss_within: f64,
    /// Denominator degrees of freedom for the parametric reference.
    pub denominator_dof: f64,
}

impl VoxelFit {
    /// Statistic of a voxel with no variation.
    fn degenerate(denominator_dof: f64) -> Self {
        Self {
            statistic: 0.0,
            ss_between: 0.0,
            ss_within: 0.0,
            denominator_dof,
        }
    }
}

/// Per-thread scratch buffers.
#[derive(Debug, Clone)]
pub struct Workspace {
    reduced: Vec<f64>,
    shuffled: Vec<f64>,
    residual: Vec<f64>,
    group_ss: Vec<f64>,
}

impl Workspace {
    /// Shuffled-residual buffer, filled by the caller before [`GlmModel::fit`].
    pub fn shuffled_mut(&mut self) -> &mut [f64] {
        &mut self.shuffled
    }
}

#[derive(Debug, Clone)]
enum VarianceModel {
    Homoscedastic,
    Heteroscedastic(Heteroscedastic),
}

/// Precomputed site-effect model for a design and hypothesis.
#[derive(Debug, Clone)]
pub struct GlmModel {
    partition: Partition,
    variance: VarianceModel,
    n_groups: usize,
}

impl GlmModel {
    /// Model the design's own site-effect hypothesis, using sites as
    /// variance groups.
    pub fn new(design: &Design, mode: VarianceMode) -> Result<Self> {
        Self::with_hypothesis(&design.matrix, &design.hypothesis, &design.site_of_subject, mode)
    }

    /// Model an arbitrary hypothesis over `matrix`.
    pub fn with_hypothesis(
        matrix: &Matrix,
        hypothesis: &Hypothesis,
        groups: &[usize],
        mode: VarianceMode,
    ) -> Result<Self> {
        hypothesis.check_columns(matrix.ncols())?;
        let partition = Partition::new(matrix, hypothesis.matrix())?;
        let n_groups = groups.iter().copied().max().map_or(0, |g| g + 1);

        let variance = match mode {
            VarianceMode::Homoscedastic => VarianceModel::Homoscedastic,
            VarianceMode::Heteroscedastic => VarianceModel::Heteroscedastic(Heteroscedastic::new(
                matrix,
                hypothesis.matrix(),
                groups,
                partition.residual_diagonal(),
            )?),
        };

        Ok(Self {
            partition,
            variance,
            n_groups,
        })
    }

    /// Variance assumption in use.
    pub fn mode(&self) -> VarianceMode {
        match self.variance {
            VarianceModel::Homoscedastic => VarianceMode::Homoscedastic,
            VarianceModel::Heteroscedastic(_) => VarianceMode::Heteroscedastic,
        }
    }

    /// Number of subjects.
    pub fn n_subjects(&self) -> usize {
        self.partition.n()
    }

    /// Numerator degrees of freedom (contrast rank).
    pub fn numerator_dof(&self) -> usize {
        self.partition.q()
    }

    /// Allocate scratch buffers sized for this model.
    pub fn workspace(&self) -> Workspace {
        let n = self.partition.n();
        Workspace {
            reduced: vec![0.0; n],
            shuffled: vec![0.0; n],
            residual: vec![0.0; n],
            group_ss: vec![0.0; self.n_groups],
        }
    }

    /// Reduced-model residuals of `y`, written into `out`.
    pub fn reduced_residuals(&self, y: &[f64], out: &mut [f64]) {
        self.partition.reduced_residuals(y, out);
    }

    /// Fit the observed data `y` directly.
    pub fn fit_observed(&self, y: &[f64], ws: &mut Workspace) -> VoxelFit {
        let mut reduced = std::mem::take(&mut ws.reduced);
        self.partition.reduced_residuals(y, &mut reduced);
        ws.shuffled.copy_from_slice(&reduced);
        ws.reduced = reduced;
        self.fit(ws)
    }

    /// Fit the data currently held in the workspace's shuffled buffer.
    ///
    /// The buffer must hold a permutation of reduced-model residuals; the
    /// nuisance component of the permuted data cancels in every statistic.
    pub fn fit(&self, ws: &mut Workspace) -> VoxelFit {
        let Workspace {
            shuffled,
            residual,
            group_ss,
            ..
        } = ws;

        let (ss_between, ss_within) = self.partition.sums_of_squares(shuffled, residual);
        let q = self.partition.q();
        let dof = self.partition.residual_dof();

        match &self.variance {
            VarianceModel::Homoscedastic => VoxelFit {
                statistic: f_statistic(ss_between, ss_within, q, dof),
                ss_between,
                ss_within,
                denominator_dof: dof as f64,
            },
            VarianceModel::Heteroscedastic(model) => {
                if ss_within <= 0.0 {
                    return VoxelFit {
                        statistic: if ss_between > 0.0 { f64::INFINITY } else { 0.0 },
                        ss_between,
                        ss_within,
                        denominator_dof: MAX_DENOMINATOR_DOF,
                    };
                }
                let welch = model.statistic(shuffled, residual, ss_within, group_ss);
                VoxelFit {
                    statistic: welch.statistic,
                    ss_between,
                    ss_within,
                    denominator_dof: welch.denominator_dof,
                }
            }
        }
    }

    /// Fit reported for a voxel whose data has no variation.
    pub fn degenerate_fit(&self) -> VoxelFit {
        let dof = match self.variance {
            VarianceModel::Homoscedastic => self.partition.residual_dof() as f64,
            VarianceModel::Heteroscedastic(_) => MAX_DENOMINATOR_DOF,
        };
        VoxelFit::degenerate(dof)
    }

    /// Parametric p-value of a fit, when this build can evaluate it.
    pub fn parametric_p(&self, fit: &VoxelFit) -> Option<f64> {
        f_upper_tail(fit.statistic, self.partition.q() as f64, fit.denominator_dof)
    }
}

/// Whether a voxel's values are constant to working precision.
pub fn is_degenerate(y: &[f64]) -> bool {
    let n = y.len() as f64;
    let max_abs = y.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if max_abs == 0.0 {
        return true;
    }
    let mean = y.iter().sum::<f64>() / n;
    let ss: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
    let tolerance = 64.0 * f64::EPSILON * max_abs;
    ss <= n * tolerance * tolerance
}
