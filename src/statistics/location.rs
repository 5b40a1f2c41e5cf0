//! Location summaries of voxel maps, skipping non-finite entries.

/// Median of the finite values in `data`; `None` when there are none.
///
/// Uses selection rather than a full sort; even-length inputs average the two
/// middle order statistics.
pub fn median(data: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    let n = finite.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    let (lower, &mut upper, _) = finite.select_nth_unstable_by(mid, f64::total_cmp);
    if n % 2 == 1 {
        return Some(upper);
    }
    let below = lower.iter().copied().max_by(f64::total_cmp).unwrap_or(upper);
    Some(below + (upper - below) / 2.0)
}

/// Arithmetic mean of the finite values in `data`; `None` when there are none.
pub fn mean(data: &[f64]) -> Option<f64> {
    let (sum, count) = data
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}
