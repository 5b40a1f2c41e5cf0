//! Result types: per-voxel maps, run summary and pre/post comparison.

use serde::{Deserialize, Serialize};

use crate::analysis::EffectBand;
use crate::config::FdrMethod;
use crate::error::Warning;
use crate::input::Mask;
use crate::types::{TestKind, VarianceMode};

/// Complete result of one site-effect analysis.
#[derive(Debug, Clone)]
pub struct SiteEffectResult {
    /// Scalar summary, serialized as the run's summary record.
    pub summary: Summary,
    /// Per-voxel arrays, aligned with `mask.indices()`.
    pub voxels: VoxelStatistics,
    /// Mask the voxel arrays were computed over.
    pub mask: Mask,
}

/// Per-voxel statistics over the masked voxels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoxelStatistics {
    /// F (homoscedastic) or G (heteroscedastic) statistic.
    pub statistic: Vec<f64>,
    /// Parametric p-values; absent when the distribution cannot be evaluated.
    pub parametric_p: Option<Vec<f64>>,
    /// Uncorrected permutation p-values; absent for parametric-only runs.
    pub permutation_p: Option<Vec<f64>>,
    /// Max-statistic family-wise p-values; absent for parametric-only runs.
    pub fwer_p: Option<Vec<f64>>,
    /// FDR-adjusted p-values of the selected test kind.
    pub q_values: Vec<f64>,
    /// FDR significance flags.
    pub fdr_significant: Vec<bool>,
    /// Max-statistic FWER significance flags.
    pub fwer_significant: Option<Vec<bool>>,
    /// Partial eta-squared.
    pub eta_squared: Vec<f64>,
    /// Cohen's f.
    pub cohens_f: Vec<f64>,
}

impl VoxelStatistics {
    /// Number of voxels.
    pub fn len(&self) -> usize {
        self.statistic.len()
    }

    /// Whether there are no voxels.
    pub fn is_empty(&self) -> bool {
        self.statistic.is_empty()
    }

    /// p-values of the inference actually used: permutation when run,
    /// otherwise parametric.
    pub fn p_values(&self) -> Option<&[f64]> {
        self.permutation_p
            .as_deref()
            .or(self.parametric_p.as_deref())
    }

    /// `−log10 p` of [`Self::p_values`].
    pub fn neg_log10_p(&self) -> Option<Vec<f64>> {
        self.p_values()
            .map(|p| p.iter().map(|&p| -p.max(f64::MIN_POSITIVE).log10()).collect())
    }
}

fn default_hypothesis() -> String {
    "site_effect".to_string()
}

/// Scalar summary of a run, written as the summary artifact and read back by
/// the comparator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub n_subjects: usize,
    pub n_sites: usize,
    pub n_voxels: usize,
    /// Unique site labels, first-appearance order.
    pub sites: Vec<String>,
    /// Subjects per site, aligned with `sites`.
    pub site_counts: Vec<usize>,
    pub reference_site: String,
    /// Design column names.
    pub design_columns: Vec<String>,
    pub condition_number: f64,
    /// Name of the tested hypothesis (`site_effect` unless a contrast was configured).
    #[serde(default = "default_hypothesis")]
    pub hypothesis: String,

    pub test_kind: TestKind,
    pub variance_mode: VarianceMode,
    /// `"F"` or `"G"`.
    pub statistic_name: String,
    pub alpha: f64,
    /// Non-identity permutations actually run (0 for parametric runs).
    pub n_permutations: usize,
    pub requested_permutations: usize,
    pub exhaustive_permutations: bool,
    /// Seed of the permutation sequence, drawn fresh when none was configured.
    pub seed: u64,

    /// Percent of voxels with parametric p ≤ alpha.
    pub percent_significant_uncorrected: Option<f64>,
    /// Percent of voxels with permutation p ≤ alpha.
    pub percent_significant_permutation: Option<f64>,
    /// Percent of voxels significant after FDR control.
    pub percent_significant_fdr: f64,
    /// Percent of voxels significant under max-statistic FWER control.
    pub percent_significant_fwer: Option<f64>,
    pub fdr_method: FdrMethod,
    /// Largest p-value declared significant by FDR control.
    pub fdr_threshold: Option<f64>,

    /// Mean partial eta-squared over the mask.
    pub mean_effect_size: f64,
    /// Median partial eta-squared over the mask.
    pub median_effect_size: f64,
    /// Mean Cohen's f over voxels where it is finite.
    pub mean_cohens_f: f64,
    /// Band of the Cohen's f implied by the mean effect size.
    pub effect_band: EffectBand,

    /// Recoverable conditions met during the run.
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

/// Success thresholds for a pre/post comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonThresholds {
    /// Post-harmonization significant voxels must be below this percentage.
    pub max_post_significant_percent: f64,
    /// Effect size must shrink by more than this percentage.
    pub min_effect_size_reduction_percent: f64,
}

impl Default for ComparisonThresholds {
    fn default() -> Self {
        Self {
            max_post_significant_percent: 5.0,
            min_effect_size_reduction_percent: 70.0,
        }
    }
}

/// Pre- versus post-harmonization comparison record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub pre_percent_significant: f64,
    pub post_percent_significant: f64,
    /// `(pre − post) / pre × 100` of the significant-voxel percentage.
    pub significance_reduction_percent: f64,
    pub pre_effect_size: f64,
    pub post_effect_size: f64,
    /// `(pre − post) / pre × 100` of the mean effect size.
    pub effect_size_reduction_percent: f64,
    /// Post significant percentage is below the threshold.
    pub post_significance_ok: bool,
    /// Effect-size reduction exceeds the threshold.
    pub effect_size_reduction_ok: bool,
    /// Both criteria hold.
    pub harmonization_successful: bool,
    pub thresholds: ComparisonThresholds,
}
