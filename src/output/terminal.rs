//! Terminal output formatting with colors and box drawing.

use colored::Colorize;

use crate::analysis::EffectBand;
use crate::result::{Comparison, Summary};

fn optional_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}%", v),
        None => "n/a".dimmed().to_string(),
    }
}

/// Format a run summary for human-readable terminal output.
pub fn format_summary(summary: &Summary) -> String {
    let mut output = String::new();
    let sep = "\u{2500}".repeat(62);

    output.push_str("site-effect\n");
    output.push_str(&sep);
    output.push('\n');
    output.push('\n');

    output.push_str(&format!(
        "  Subjects: {} across {} sites ({})\n",
        summary.n_subjects,
        summary.n_sites,
        summary.sites.join(", ")
    ));
    output.push_str(&format!("  Voxels:   {}\n", summary.n_voxels));
    output.push_str(&format!(
        "  Test:     {} statistic, {:?} variance, {}\n",
        summary.statistic_name,
        summary.variance_mode,
        if summary.n_permutations > 0 {
            format!("{} permutations (seed {})", summary.n_permutations, summary.seed)
        } else {
            "parametric".to_string()
        }
    ));
    if summary.hypothesis != "site_effect" {
        output.push_str(&format!("  Contrast: {}\n", summary.hypothesis));
    }
    output.push('\n');

    let headline = format!(
        "{:.2}% of voxels significant after FDR (alpha = {})",
        summary.percent_significant_fdr, summary.alpha
    );
    if summary.percent_significant_fdr > 0.0 {
        output.push_str(&format!("  {}\n\n", format!("\u{26A0} {}", headline).yellow().bold()));
    } else {
        output.push_str(&format!("  {}\n\n", format!("\u{2713} {}", headline).green().bold()));
    }

    output.push_str(&format!(
        "    Uncorrected (parametric): {}\n",
        optional_percent(summary.percent_significant_uncorrected)
    ));
    output.push_str(&format!(
        "    Uncorrected (permutation): {}\n",
        optional_percent(summary.percent_significant_permutation)
    ));
    output.push_str(&format!(
        "    FWER (max statistic):     {}\n",
        optional_percent(summary.percent_significant_fwer)
    ));
    if let Some(threshold) = summary.fdr_threshold {
        output.push_str(&format!("    FDR threshold:            p \u{2264} {:.3e}\n", threshold));
    }
    output.push('\n');

    output.push_str(&format!(
        "    Effect size (partial \u{03B7}\u{00B2}): mean {:.4}, median {:.4}\n",
        summary.mean_effect_size, summary.median_effect_size
    ));
    output.push_str(&format!(
        "    Cohen's f: mean {:.3} ({})\n",
        summary.mean_cohens_f,
        format_band(summary.effect_band)
    ));

    if !summary.warnings.is_empty() {
        output.push('\n');
        for warning in &summary.warnings {
            output.push_str(&format!("  {} {}\n", "\u{26A0}".yellow(), warning));
        }
    }

    output.push('\n');
    output.push_str(&sep);
    output.push('\n');
    output
}

/// Format a pre/post comparison for terminal output.
pub fn format_comparison(comparison: &Comparison) -> String {
    let mut output = String::new();
    let sep = "\u{2500}".repeat(62);

    output.push_str("site-effect comparison\n");
    output.push_str(&sep);
    output.push('\n');
    output.push('\n');

    output.push_str(&format!(
        "  Significant voxels: {:.2}% \u{2192} {:.2}% (reduction {:.1}%)  {}\n",
        comparison.pre_percent_significant,
        comparison.post_percent_significant,
        comparison.significance_reduction_percent,
        check(comparison.post_significance_ok)
    ));
    output.push_str(&format!(
        "  Effect size:        {:.4} \u{2192} {:.4} (reduction {:.1}%)  {}\n",
        comparison.pre_effect_size,
        comparison.post_effect_size,
        comparison.effect_size_reduction_percent,
        check(comparison.effect_size_reduction_ok)
    ));
    output.push('\n');

    if comparison.harmonization_successful {
        output.push_str(&format!("  {}\n", "\u{2713} Harmonization successful".green().bold()));
    } else {
        output.push_str(&format!("  {}\n", "\u{2717} Residual site effect remains".red().bold()));
    }

    output.push('\n');
    output.push_str(&sep);
    output.push('\n');
    output.push_str(&format!(
        "Criteria: post significant < {:.1}%, effect-size reduction > {:.1}%\n",
        comparison.thresholds.max_post_significant_percent,
        comparison.thresholds.min_effect_size_reduction_percent
    ));
    output
}

fn check(ok: bool) -> String {
    if ok {
        "\u{2713}".green().to_string()
    } else {
        "\u{2717}".red().to_string()
    }
}

/// Format EffectBand for display.
fn format_band(band: EffectBand) -> String {
    match band {
        EffectBand::Negligible => "negligible".green().to_string(),
        EffectBand::Small => "small".green().to_string(),
        EffectBand::Medium => "medium".yellow().to_string(),
        EffectBand::Large => "large".red().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::evaluate;
    use crate::output::json::tests::make_summary;
    use crate::result::ComparisonThresholds;

    #[test]
    fn test_format_summary() {
        colored::control::set_override(false);
        let output = format_summary(&make_summary());
        assert!(output.contains("site-effect"));
        assert!(output.contains("4.20% of voxels significant after FDR"));
        assert!(output.contains("999 permutations (seed 42)"));
        assert!(output.contains("medium"));
        assert!(output.contains("condition number"));
    }

    #[test]
    fn test_format_parametric_summary() {
        colored::control::set_override(false);
        let mut summary = make_summary();
        summary.n_permutations = 0;
        summary.percent_significant_fwer = None;
        let output = format_summary(&summary);
        assert!(output.contains("parametric"));
        assert!(output.contains("n/a"));
    }

    #[test]
    fn test_format_comparison() {
        colored::control::set_override(false);
        let success = format_comparison(&evaluate(40.0, 3.0, 0.2, 0.03, ComparisonThresholds::default()));
        assert!(success.contains("Harmonization successful"));

        let failure = format_comparison(&evaluate(40.0, 10.0, 0.2, 0.03, ComparisonThresholds::default()));
        assert!(failure.contains("Residual site effect remains"));
    }
}
