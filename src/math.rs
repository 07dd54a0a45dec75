use std::cmp::Ordering;

use statrs::function::beta::beta_reg;

pub fn arithmetic_mean(x: &[f64]) -> f64 {
    x.iter().sum::<f64>() / x.len() as f64
}

/// Sample standard deviation (n - 1 denominator), NaN below two observations
pub fn sample_sd(x: &[f64]) -> f64 {
    if x.len() < 2 {
        return f64::NAN;
    }
    let mean = arithmetic_mean(x);
    let ss = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    (ss / (x.len() - 1) as f64).sqrt()
}

/// Rank rho aggregation of a set of percentiles
///
/// Sorts the percentiles ascending and, for each rank `i` of `k`, computes the
/// probability that the `i`-th order statistic of `k` uniforms falls at or below
/// the observed value, i.e. the regularized incomplete beta `I_p(i, k - i + 1)`.
/// Rho is the minimum over all ranks. An empty set yields 1.
pub fn rho_statistic(percentiles: &mut [f64]) -> f64 {
    percentiles.sort_unstable_by(|a, b| cmp_nan_last(*a, *b));
    let k = percentiles.len();
    percentiles
        .iter()
        .enumerate()
        .map(|(i, p)| {
            // a missing percentile carries no evidence
            let p = if p.is_nan() { 1.0 } else { p.clamp(0.0, 1.0) };
            beta_reg((i + 1) as f64, (k - i) as f64, p)
        })
        .fold(1.0, f64::min)
}

/// Orders values ascending with every NaN tied above the largest value
fn cmp_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Tie-aware percentile ranks in (0, 1)
///
/// Ranks ascend with the value (lowest value gets the lowest percentile),
/// ties share their average rank, and ranks are scaled by `n + 1`.
/// Infinite values rank at the ends; NaN values share the top ranks.
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order = (0..n).collect::<Vec<_>>();
    order.sort_by(|a, b| cmp_nan_last(values[*a], values[*b]));

    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && cmp_nan_last(values[order[end]], values[order[start]]).is_eq() {
            end += 1;
        }
        // ranks are 1-based: positions start..end hold ranks start+1..=end
        let average = (start + 1 + end) as f64 / 2.0;
        for idx in &order[start..end] {
            ranks[*idx] = average;
        }
        start = end;
    }

    let denom = (n + 1) as f64;
    ranks.into_iter().map(|r| r / denom).collect()
}
