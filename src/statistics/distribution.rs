//! Parametric reference distributions.
//!
//! Available with the `parametric` feature (statrs). Without it every lookup
//! returns `None` and parametric p-values are reported as not available;
//! permutation inference is unaffected.

/// Whether this build can evaluate parametric p-values.
pub const fn parametric_available() -> bool {
    cfg!(feature = "parametric")
}

/// Upper-tail probability `P(F(df1, df2) ≥ stat)`.
///
/// Non-positive statistics map to 1. Returns `None` when the distribution
/// cannot be evaluated (feature disabled or invalid degrees of freedom).
#[cfg(feature = "parametric")]
pub fn f_upper_tail(stat: f64, df1: f64, df2: f64) -> Option<f64> {
    use statrs::distribution::{ContinuousCDF, FisherSnedecor};

    if stat.is_nan() {
        return None;
    }
    if stat <= 0.0 {
        return Some(1.0);
    }
    if stat.is_infinite() {
        return Some(0.0);
    }
    let dist = FisherSnedecor::new(df1, df2).ok()?;
    Some(dist.sf(stat).clamp(0.0, 1.0))
}

/// Upper-tail probability `P(F(df1, df2) ≥ stat)`; unavailable in this build.
#[cfg(not(feature = "parametric"))]
pub fn f_upper_tail(_stat: f64, _df1: f64, _df2: f64) -> Option<f64> {
    None
}
