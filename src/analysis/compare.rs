//! Pre/post harmonization comparison.

use tracing::info;

use crate::result::{Comparison, ComparisonThresholds, Summary};

/// `(pre − post) / pre × 100`, or 0 when `pre` is not positive.
pub fn reduction_percent(pre: f64, post: f64) -> f64 {
    if pre > 0.0 {
        (pre - post) / pre * 100.0
    } else {
        0.0
    }
}

/// Compare two summaries against the default thresholds.
pub fn compare(pre: &Summary, post: &Summary) -> Comparison {
    compare_with(pre, post, ComparisonThresholds::default())
}

/// Compare two summaries.
///
/// Significance is measured by the FDR-corrected percentage and effect size
/// by the mean partial eta-squared. Harmonization succeeds when the post
/// percentage is below `max_post_significant_percent` and the effect size
/// shrank by more than `min_effect_size_reduction_percent`.
pub fn compare_with(pre: &Summary, post: &Summary, thresholds: ComparisonThresholds) -> Comparison {
    let comparison = evaluate(
        pre.percent_significant_fdr,
        post.percent_significant_fdr,
        pre.mean_effect_size,
        post.mean_effect_size,
        thresholds,
    );
    info!(
        post_significant = comparison.post_percent_significant,
        effect_reduction = comparison.effect_size_reduction_percent,
        successful = comparison.harmonization_successful,
        "compared pre/post harmonization"
    );
    comparison
}

/// Comparison from raw percentages and effect sizes.
pub fn evaluate(
    pre_percent: f64,
    post_percent: f64,
    pre_effect: f64,
    post_effect: f64,
    thresholds: ComparisonThresholds,
) -> Comparison {
    let effect_size_reduction_percent = reduction_percent(pre_effect, post_effect);
    let post_significance_ok = post_percent < thresholds.max_post_significant_percent;
    let effect_size_reduction_ok =
        effect_size_reduction_percent > thresholds.min_effect_size_reduction_percent;

    Comparison {
        pre_percent_significant: pre_percent,
        post_percent_significant: post_percent,
        significance_reduction_percent: reduction_percent(pre_percent, post_percent),
        pre_effect_size: pre_effect,
        post_effect_size: post_effect,
        effect_size_reduction_percent,
        post_significance_ok,
        effect_size_reduction_ok,
        harmonization_successful: post_significance_ok && effect_size_reduction_ok,
        thresholds,
    }
}
