//! Statistical functions for PSF integration and for testing stochastic models

use scilib::math::basic::erf;
use std::f64::consts::SQRT_2;

/// Cumulative distribution function for standard normal distribution
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

/// Probability mass of a zero-mean normal distribution with standard deviation
/// `sigma` that falls inside `[lo, hi]`.
///
/// This is the 1-D building block of every separable pixel integral: the
/// fraction of a Gaussian spot centred at the origin that lands between two
/// pixel edges.
pub fn gaussian_interval_mass(lo: f64, hi: f64, sigma: f64) -> f64 {
    let scale = 1.0 / (sigma * SQRT_2);
    0.5 * (erf(hi * scale) - erf(lo * scale))
}

/// Sample mean and unbiased sample variance
///
/// Returns `None` for fewer than two samples.
pub fn mean_and_variance(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, var))
}

/// Z-score of an observed success count against a binomial expectation.
///
/// Used by statistical tests to assert that an empirical fraction is
/// consistent with a target probability within a number of standard errors.
pub fn binomial_z_score(successes: usize, trials: usize, p: f64) -> f64 {
    let n = trials as f64;
    let expected = n * p;
    let sd = (n * p * (1.0 - p)).sqrt();
    if sd == 0.0 {
        return if (successes as f64 - expected).abs() < f64::EPSILON {
            0.0
        } else {
            f64::INFINITY
        };
    }
    (successes as f64 - expected) / sd
}
