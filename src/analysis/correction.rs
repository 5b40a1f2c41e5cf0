//! Multiple-comparison correction across voxels.
//!
//! False discovery rate control (Benjamini-Hochberg, or Benjamini-Yekutieli
//! under arbitrary dependence) works on any vector of p-values. Family-wise
//! control comes from the maximum-statistic permutation null in
//! [`super::permutation::NullDistribution::fwer_p_values`]; here it is only
//! thresholded.

use crate::config::FdrMethod;

/// Outcome of FDR control over a set of p-values.
#[derive(Debug, Clone, PartialEq)]
pub struct FdrCorrection {
    /// Adjusted p-values (NaN where the input p-value was NaN).
    pub q_values: Vec<f64>,
    /// Largest p-value declared significant, if any.
    pub threshold: Option<f64>,
    /// Per-voxel significance.
    pub significant: Vec<bool>,
}

impl FdrCorrection {
    /// Number of significant voxels.
    pub fn n_significant(&self) -> usize {
        self.significant.iter().filter(|&&s| s).count()
    }
}

/// Apply FDR control at level `alpha`.
///
/// With `m` finite p-values sorted ascending, the largest rank `i` with
/// `p_(i) ≤ i/(m·c) · alpha` sets the threshold (`c = 1` for BH,
/// `c = Σ 1/j` for BY). Every p-value at or below it is significant.
pub fn fdr(p_values: &[f64], alpha: f64, method: FdrMethod) -> FdrCorrection {
    let mut order: Vec<usize> = (0..p_values.len()).filter(|&i| !p_values[i].is_nan()).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let m = order.len();
    let c = match method {
        FdrMethod::BenjaminiHochberg => 1.0,
        FdrMethod::BenjaminiYekutieli => (1..=m).map(|j| 1.0 / j as f64).sum(),
    };

    let mut q_values = vec![f64::NAN; p_values.len()];
    let mut threshold = None;

    // Step-up from the largest p-value keeps q-values monotone
    let mut running = f64::INFINITY;
    for (rank0, &idx) in order.iter().enumerate().rev() {
        let rank = (rank0 + 1) as f64;
        let p = p_values[idx];
        running = running.min(p * m as f64 * c / rank).min(1.0);
        q_values[idx] = running;

        if threshold.is_none() && p <= rank / (m as f64 * c) * alpha {
            threshold = Some(p);
        }
    }

    let significant = p_values
        .iter()
        .map(|&p| matches!(threshold, Some(t) if p <= t))
        .collect();

    FdrCorrection {
        q_values,
        threshold,
        significant,
    }
}

/// Flag voxels with `p ≤ alpha`, the same rule FDR applies to its threshold;
/// NaN is never significant.
pub fn significant_at(p_values: &[f64], alpha: f64) -> Vec<bool> {
    p_values.iter().map(|&p| p <= alpha).collect()
}

/// Percentage of `flags` that are set.
pub fn percent(flags: &[bool]) -> f64 {
    if flags.is_empty() {
        return 0.0;
    }
    100.0 * flags.iter().filter(|&&f| f).count() as f64 / flags.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bh_known_example() {
        // m = 5, alpha = 0.05: thresholds 0.01, 0.02, 0.03, 0.04, 0.05
        let p = [0.001, 0.008, 0.039, 0.041, 0.6];
        let result = fdr(&p, 0.05, FdrMethod::BenjaminiHochberg);

        assert_eq!(result.threshold, Some(0.008));
        assert_eq!(result.significant, vec![true, true, false, false, false]);
        assert!((result.q_values[0] - 0.005).abs() < 1e-12);
        assert!((result.q_values[1] - 0.02).abs() < 1e-12);
        // 0.039·5/3 = 0.065 but monotone with 0.041·5/4 = 0.05125
        assert!((result.q_values[2] - 0.05125).abs() < 1e-12);
        assert!((result.q_values[4] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_step_up_rescues_earlier_ranks() {
        // p_(2) = 0.03 fails rank 2's bound alone (0.025 at alpha 0.05, m = 4)
        // but p_(4) = 0.04 ≤ 0.05 makes all four significant
        let p = [0.04, 0.03, 0.035, 0.001];
        let result = fdr(&p, 0.05, FdrMethod::BenjaminiHochberg);
        assert_eq!(result.threshold, Some(0.04));
        assert_eq!(result.n_significant(), 4);
    }

    #[test]
    fn test_no_discoveries() {
        let result = fdr(&[0.5, 0.7, 0.9], 0.05, FdrMethod::BenjaminiHochberg);
        assert_eq!(result.threshold, None);
        assert_eq!(result.n_significant(), 0);
    }

    #[test]
    fn test_by_is_more_conservative() {
        let p: Vec<f64> = (1..=20).map(|i| i as f64 * 0.002).collect();
        let bh = fdr(&p, 0.05, FdrMethod::BenjaminiHochberg);
        let by = fdr(&p, 0.05, FdrMethod::BenjaminiYekutieli);
        assert!(by.n_significant() <= bh.n_significant());
        for (qb, qy) in bh.q_values.iter().zip(&by.q_values) {
            assert!(qy >= qb);
        }
    }

    #[test]
    fn test_fdr_never_exceeds_uncorrected_at_alpha() {
        // Every p equals alpha: BH accepts all at threshold alpha
        let p = [0.05; 10];
        let result = fdr(&p, 0.05, FdrMethod::BenjaminiHochberg);
        assert_eq!(result.threshold, Some(0.05));
        let uncorrected = significant_at(&p, 0.05);
        assert_eq!(result.n_significant(), uncorrected.iter().filter(|&&s| s).count());
    }

    #[test]
    fn test_nan_excluded() {
        let p = [0.001, f64::NAN, 0.02];
        let result = fdr(&p, 0.05, FdrMethod::BenjaminiHochberg);
        assert!(result.q_values[1].is_nan());
        assert!(!result.significant[1]);
        assert_eq!(result.threshold, Some(0.02));
    }

    #[test]
    fn test_percent_and_significant_at() {
        let flags = significant_at(&[0.01, 0.2, f64::NAN, 0.05], 0.05);
        assert_eq!(flags, vec![true, false, false, true]);
        assert_eq!(percent(&flags), 50.0);
        assert_eq!(percent(&[]), 0.0);
    }
}
