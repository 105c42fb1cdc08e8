//! Statistics kernel shared by every risk calculation.
//!
//! Population moments throughout. Degenerate inputs (empty series, zero
//! variance) return neutral values instead of NaN.

use statrs::statistics::Statistics;

/// Standard deviations below this are treated as exactly zero.
pub const ZERO_VARIANCE_EPSILON: f64 = 1e-12;

/// Arithmetic mean; 0 for an empty series.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().mean()
}

/// Population standard deviation; 0 for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sd = values.iter().population_std_dev();
    if sd.is_finite() && sd >= ZERO_VARIANCE_EPSILON {
        sd
    } else {
        0.0
    }
}

/// Trim two series to their common most-recent length.
pub fn align_tail<'a>(a: &'a [f64], b: &'a [f64]) -> (&'a [f64], &'a [f64]) {
    let n = a.len().min(b.len());
    (&a[a.len() - n..], &b[b.len() - n..])
}

/// Population covariance over the aligned tails; 0 when fewer than two pairs.
pub fn covariance(a: &[f64], b: &[f64]) -> f64 {
    let (a, b) = align_tail(a, b);
    if a.len() < 2 {
        return 0.0;
    }
    let cov = a.iter().population_covariance(b.iter());
    if cov.is_finite() {
        cov
    } else {
        0.0
    }
}

/// Pearson correlation over the aligned tails, in [-1, 1].
///
/// Returns 0 when either side has zero variance.
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let (a, b) = align_tail(a, b);
    if a.len() < 2 {
        return 0.0;
    }
    let sa = std_dev(a);
    let sb = std_dev(b);
    if sa == 0.0 || sb == 0.0 {
        return 0.0;
    }
    (covariance(a, b) / (sa * sb)).clamp(-1.0, 1.0)
}

/// Least-squares slope of `y` on `x`; 0 when `x` has zero variance.
pub fn linear_regression_slope(x: &[f64], y: &[f64]) -> f64 {
    let (x, y) = align_tail(x, y);
    if x.len() < 2 {
        return 0.0;
    }
    let var_x = std_dev(x).powi(2);
    if var_x == 0.0 {
        return 0.0;
    }
    covariance(x, y) / var_x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values) - 5.0).abs() < 1e-12);
        assert!((std_dev(&values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
        assert_eq!(std_dev(&[3.0]), 0.0);
        assert_eq!(covariance(&[1.0], &[2.0]), 0.0);
        assert_eq!(correlation(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(linear_regression_slope(&[2.0, 2.0], &[1.0, 5.0]), 0.0);
    }

    #[test]
    fn test_constant_series_has_zero_spread() {
        let values = vec![0.01 - 0.02 / 252.0; 40];
        assert_eq!(std_dev(&values), 0.0);
    }

    #[test]
    fn test_correlation_extremes() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 6.0, 8.0, 10.0];
        let c = [5.0, 4.0, 3.0, 2.0, 1.0];
        assert!((correlation(&a, &b) - 1.0).abs() < 1e-12);
        assert!((correlation(&a, &c) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unequal_lengths_use_recent_tail() {
        let a = [100.0, 1.0, 2.0, 3.0];
        let b = [1.0, 2.0, 3.0];
        assert!((correlation(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_regression_slope() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [3.0, 5.0, 7.0, 9.0];
        assert!((linear_regression_slope(&x, &y) - 2.0).abs() < 1e-12);
    }
}
