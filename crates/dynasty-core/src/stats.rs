// Rank correlation, error, and divergence statistics shared by calibration
// and drift monitoring.

use std::cmp::Ordering;

/// Fractional ranks (1-based). Tied values share the mean of the ranks they
/// span, so `[10, 20, 20, 30]` ranks as `[1, 2.5, 2.5, 4]`.
pub fn fractional_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Positions i..=j are tied; 1-based ranks i+1..=j+1.
        let shared = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = shared;
        }
        i = j + 1;
    }
    ranks
}

/// Spearman rank correlation using `1 - 6 * sum(d^2) / (n * (n^2 - 1))`.
///
/// Returns 0.0 when fewer than two pairs are available or the slices differ
/// in length.
pub fn spearman(predicted: &[f64], actual: &[f64]) -> f64 {
    let n = predicted.len();
    if n < 2 || n != actual.len() {
        return 0.0;
    }
    let rp = fractional_ranks(predicted);
    let ra = fractional_ranks(actual);
    let sum_d2: f64 = rp.iter().zip(&ra).map(|(a, b)| (a - b).powi(2)).sum();
    let n = n as f64;
    1.0 - 6.0 * sum_d2 / (n * (n * n - 1.0))
}

/// Mean absolute percentage error (in percent) of `predicted` against
/// `actual`. Pairs with a zero actual are skipped; 0.0 when nothing remains.
pub fn mape(predicted: &[f64], actual: &[f64]) -> f64 {
    let (sum, count) = predicted
        .iter()
        .zip(actual)
        .filter(|(_, a)| **a != 0.0)
        .fold((0.0, 0usize), |(sum, count), (p, a)| {
            (sum + ((p - a) / a).abs(), count + 1)
        });
    if count == 0 {
        0.0
    } else {
        sum / count as f64 * 100.0
    }
}

/// Jensen-Shannon divergence (base 2, so bounded by [0, 1]) between two
/// discrete distributions given as non-negative weights. Weights are
/// normalized first. Two empty distributions are identical (0.0); one empty
/// and one non-empty are maximally apart (1.0).
pub fn jensen_shannon(p: &[f64], q: &[f64]) -> f64 {
    let total_p: f64 = p.iter().sum();
    let total_q: f64 = q.iter().sum();
    match (total_p > 0.0, total_q > 0.0) {
        (false, false) => return 0.0,
        (true, false) | (false, true) => return 1.0,
        (true, true) => {}
    }

    let len = p.len().max(q.len());
    let at = |v: &[f64], i: usize, total: f64| v.get(i).copied().unwrap_or(0.0) / total;

    let mut js = 0.0;
    for i in 0..len {
        let pi = at(p, i, total_p);
        let qi = at(q, i, total_q);
        let mi = 0.5 * (pi + qi);
        if pi > 0.0 {
            js += 0.5 * pi * (pi / mi).log2();
        }
        if qi > 0.0 {
            js += 0.5 * qi * (qi / mi).log2();
        }
    }
    js.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn ranks_handle_ties() {
        assert_eq!(fractional_ranks(&[10.0, 20.0, 20.0, 30.0]), vec![1.0, 2.5, 2.5, 4.0]);
        assert_eq!(fractional_ranks(&[3.0, 1.0, 2.0]), vec![3.0, 1.0, 2.0]);
        assert!(fractional_ranks(&[]).is_empty());
    }

    #[test]
    fn spearman_self_is_one() {
        let xs = [5.0, 1.0, 9.0, 3.0, 7.0, 2.0];
        assert_eq!(spearman(&xs, &xs), 1.0);
    }

    #[test]
    fn spearman_reverse_is_minus_one() {
        let xs: Vec<f64> = (1..=25).map(f64::from).collect();
        let rev: Vec<f64> = xs.iter().rev().copied().collect();
        assert_eq!(spearman(&xs, &rev), -1.0);
    }

    #[test]
    fn spearman_small_samples_are_zero() {
        assert_eq!(spearman(&[], &[]), 0.0);
        assert_eq!(spearman(&[1.0], &[1.0]), 0.0);
        assert_eq!(spearman(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn spearman_known_value() {
        // Ranks: [1,2,3,4,5] vs [2,1,4,3,5]; sum d^2 = 4 -> 1 - 24/120 = 0.8
        let p = [1.0, 2.0, 3.0, 4.0, 5.0];
        let a = [20.0, 10.0, 40.0, 30.0, 50.0];
        assert!(approx_eq(spearman(&p, &a), 0.8, 1e-12));
    }

    #[test]
    fn mape_basic() {
        let m = mape(&[110.0, 90.0], &[100.0, 100.0]);
        assert!(approx_eq(m, 10.0, 1e-12));
    }

    #[test]
    fn mape_skips_zero_actuals() {
        let m = mape(&[50.0, 110.0], &[0.0, 100.0]);
        assert!(approx_eq(m, 10.0, 1e-12));
        assert_eq!(mape(&[1.0], &[0.0]), 0.0);
    }

    #[test]
    fn js_identical_is_zero() {
        let d = jensen_shannon(&[10.0, 30.0, 40.0, 20.0], &[1.0, 3.0, 4.0, 2.0]);
        assert!(approx_eq(d, 0.0, 1e-12));
    }

    #[test]
    fn js_disjoint_is_one() {
        let d = jensen_shannon(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(approx_eq(d, 1.0, 1e-12));
    }

    #[test]
    fn js_is_symmetric_and_bounded() {
        let p = [0.25, 0.35, 0.30, 0.10];
        let q = [0.10, 0.40, 0.35, 0.15];
        let a = jensen_shannon(&p, &q);
        let b = jensen_shannon(&q, &p);
        assert!(approx_eq(a, b, 1e-12));
        assert!(a > 0.0 && a < 1.0);
    }

    #[test]
    fn js_empty_inputs() {
        assert_eq!(jensen_shannon(&[], &[]), 0.0);
        assert_eq!(jensen_shannon(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
