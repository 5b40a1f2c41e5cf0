//! Classical F statistic under a common residual variance.

/// `F = (SS_between / q) / (SS_within / (n − p))`.
///
/// A perfect fit (`SS_within = 0`) yields `+∞` when there is any between-site
/// variation and `0` otherwise.
pub fn f_statistic(ss_between: f64, ss_within: f64, q: usize, residual_dof: usize) -> f64 {
    if ss_within <= 0.0 {
        return if ss_between > 0.0 { f64::INFINITY } else { 0.0 };
    }
    (ss_between / q as f64) / (ss_within / residual_dof as f64)
}
