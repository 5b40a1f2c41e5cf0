//! Effect sizes from the sum-of-squares decomposition.
//!
//! Partial eta-squared is the share of residual-plus-site variance that the
//! site factor explains after covariates:
//!
//! ```text
//! η² = SS_between / (SS_between + SS_within)
//! f  = sqrt(η² / (1 − η²))
//! ```

use serde::{Deserialize, Serialize};

/// Conventional Cohen's f magnitude bands (0.10 / 0.25 / 0.40).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectBand {
    Negligible,
    Small,
    Medium,
    Large,
}

impl EffectBand {
    /// Band for a Cohen's f value.
    pub fn from_cohens_f(f: f64) -> Self {
        if f >= 0.40 {
            EffectBand::Large
        } else if f >= 0.25 {
            EffectBand::Medium
        } else if f >= 0.10 {
            EffectBand::Small
        } else {
            EffectBand::Negligible
        }
    }
}

impl std::fmt::Display for EffectBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EffectBand::Negligible => "negligible",
            EffectBand::Small => "small",
            EffectBand::Medium => "medium",
            EffectBand::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// Partial eta-squared, clamped to `[0, 1]`; 0 when there is no variance.
pub fn partial_eta_squared(ss_between: f64, ss_within: f64) -> f64 {
    let total = ss_between + ss_within;
    if !(total > 0.0) {
        return 0.0;
    }
    (ss_between / total).clamp(0.0, 1.0)
}

/// Cohen's f from partial eta-squared; `+∞` when η² = 1.
pub fn cohens_f(eta_squared: f64) -> f64 {
    if eta_squared >= 1.0 {
        return f64::INFINITY;
    }
    (eta_squared / (1.0 - eta_squared)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eta_squared() {
        assert!((partial_eta_squared(24.0, 4.0) - 24.0 / 28.0).abs() < 1e-12);
        assert_eq!(partial_eta_squared(0.0, 5.0), 0.0);
        assert_eq!(partial_eta_squared(0.0, 0.0), 0.0);
        assert_eq!(partial_eta_squared(3.0, 0.0), 1.0);
    }

    #[test]
    fn test_cohens_f() {
        assert_eq!(cohens_f(0.0), 0.0);
        assert!((cohens_f(0.2) - 0.5).abs() < 1e-12);
        assert!(cohens_f(1.0).is_infinite());
    }

    #[test]
    fn test_bands() {
        assert_eq!(EffectBand::from_cohens_f(0.05), EffectBand::Negligible);
        assert_eq!(EffectBand::from_cohens_f(0.10), EffectBand::Small);
        assert_eq!(EffectBand::from_cohens_f(0.3), EffectBand::Medium);
        assert_eq!(EffectBand::from_cohens_f(f64::INFINITY), EffectBand::Large);
        assert_eq!(EffectBand::Medium.to_string(), "medium");
    }
}
