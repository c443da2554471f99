//! Stochastic noise primitives for detector simulation.
//!
//! Each function models one physical stage of image formation on a single
//! pixel and draws from a caller-supplied RNG, so the caller decides how
//! randomness is partitioned (per row chunk, per emitter, ...).
//!
//! # Stages
//! - **Shot noise**: Poisson photon arrival
//! - **Quantum efficiency**: binomial retention of each photon
//! - **Electron multiplication**: gamma-distributed EM register output
//! - **Dark current**: Poisson thermal electrons
//! - **Read noise**: zero-mean Gaussian

use rand::Rng;
use rand_distr::{Binomial, Distribution, Gamma, Normal, Poisson, StandardNormal};

/// Counts above this are drawn from the normal limit of the exact
/// distribution. The exact samplers stall or overflow near `f64::MAX`, and
/// at this size the two are indistinguishable after quantization.
pub const NORMAL_LIMIT_COUNT: f64 = 1e12;

/// Normal draw with the given mean and variance, clamped to a
/// non-negative whole number of counts.
fn sample_normal_limit<R: Rng + ?Sized>(mean: f64, variance: f64, rng: &mut R) -> f64 {
    if !mean.is_finite() {
        return mean.max(0.0);
    }
    let z: f64 = StandardNormal.sample(rng);
    let spread = variance.max(0.0).sqrt() * z;
    if !spread.is_finite() {
        return mean.max(0.0);
    }
    (mean + spread).round().max(0.0)
}

/// Draw a Poisson-distributed count with the given mean.
///
/// Non-positive and non-finite means produce zero.
pub fn sample_poisson<R: Rng + ?Sized>(mean: f64, rng: &mut R) -> f64 {
    if !mean.is_finite() || mean <= 0.0 {
        return 0.0;
    }
    if mean > NORMAL_LIMIT_COUNT {
        return sample_normal_limit(mean, mean, rng);
    }
    match Poisson::new(mean) {
        Ok(poisson) => poisson.sample(rng),
        Err(_) => 0.0,
    }
}

/// Keep each of `count` photons independently with probability `efficiency`.
///
/// An efficiency of 1 (or more) keeps every photon without drawing.
pub fn sample_binomial_thinning<R: Rng + ?Sized>(count: f64, efficiency: f64, rng: &mut R) -> f64 {
    if count.is_nan() || count <= 0.0 || efficiency <= 0.0 {
        return 0.0;
    }
    if efficiency >= 1.0 {
        return count;
    }
    if count > NORMAL_LIMIT_COUNT {
        let mean = count * efficiency;
        return sample_normal_limit(mean, mean * (1.0 - efficiency), rng).min(count);
    }
    let trials = count.round() as u64;
    match Binomial::new(trials, efficiency) {
        Ok(binomial) => binomial.sample(rng) as f64,
        Err(_) => 0.0,
    }
}

/// Stochastic electron-multiplication gain.
///
/// The output of an EM register fed with `n` electrons is well described by a
/// gamma distribution with shape `n` and scale `gain`. Gains of 0 or 1 mean
/// the sensor has no multiplication register and return the input untouched.
pub fn sample_em_gain<R: Rng + ?Sized>(electrons: f64, gain: f64, rng: &mut R) -> f64 {
    if gain <= 1.0 || electrons <= 0.0 {
        return electrons.max(0.0);
    }
    if electrons > NORMAL_LIMIT_COUNT {
        let mean = electrons * gain;
        return sample_normal_limit(mean, mean * gain, rng);
    }
    match Gamma::new(electrons, gain) {
        Ok(gamma) => gamma.sample(rng),
        Err(_) => electrons * gain,
    }
}

/// Zero-mean Gaussian read noise with standard deviation `sigma` (electrons).
pub fn sample_read_noise<R: Rng + ?Sized>(sigma: f64, rng: &mut R) -> f64 {
    if sigma <= 0.0 {
        return 0.0;
    }
    match Normal::new(0.0, sigma) {
        Ok(normal) => normal.sample(rng),
        Err(_) => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn draws<F: FnMut(&mut StdRng) -> f64>(n: usize, seed: u64, mut f: F) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| f(&mut rng)).collect()
    }

    fn mean_var(v: &[f64]) -> (f64, f64) {
        crate::algo::mean_and_variance(v).unwrap()
    }

    #[test]
    fn test_poisson_mean_and_variance() {
        let samples = draws(20_000, 1, |rng| sample_poisson(12.0, rng));
        let (mean, var) = mean_var(&samples);
        assert_relative_eq!(mean, 12.0, epsilon = 0.2);
        assert_relative_eq!(var, 12.0, epsilon = 0.6);
        assert!(samples.iter().all(|v| v.fract() == 0.0 && *v >= 0.0));
    }

    #[test]
    fn test_poisson_degenerate_means() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(sample_poisson(0.0, &mut rng), 0.0);
        assert_eq!(sample_poisson(-4.0, &mut rng), 0.0);
        assert_eq!(sample_poisson(f64::NAN, &mut rng), 0.0);
        assert_eq!(sample_poisson(f64::INFINITY, &mut rng), 0.0);
    }

    #[test]
    fn test_binomial_thinning() {
        let mut rng = StdRng::seed_from_u64(4);
        assert_eq!(sample_binomial_thinning(37.0, 1.0, &mut rng), 37.0);
        assert_eq!(sample_binomial_thinning(37.0, 0.0, &mut rng), 0.0);

        let samples = draws(20_000, 5, |rng| sample_binomial_thinning(100.0, 0.7, rng));
        let (mean, var) = mean_var(&samples);
        assert_relative_eq!(mean, 70.0, epsilon = 0.3);
        assert_relative_eq!(var, 21.0, epsilon = 1.5);
        assert!(samples.iter().all(|v| *v <= 100.0));
    }

    #[test]
    fn test_em_gain() {
        let mut rng = StdRng::seed_from_u64(6);
        assert_eq!(sample_em_gain(10.0, 0.0, &mut rng), 10.0);
        assert_eq!(sample_em_gain(10.0, 1.0, &mut rng), 10.0);
        assert_eq!(sample_em_gain(0.0, 300.0, &mut rng), 0.0);

        // Gamma(n, g) has mean n*g and variance n*g^2 (excess noise factor 2)
        let samples = draws(20_000, 7, |rng| sample_em_gain(20.0, 100.0, rng));
        let (mean, var) = mean_var(&samples);
        assert_relative_eq!(mean, 2000.0, max_relative = 0.02);
        assert_relative_eq!(var, 20.0 * 100.0 * 100.0, max_relative = 0.05);
    }

    #[test]
    fn test_extreme_counts_return_finite_draws() {
        let mut rng = StdRng::seed_from_u64(10);
        for &level in &[1e13, 1e300, 1e307, 1e308, f64::MAX] {
            let arrived = sample_poisson(level, &mut rng);
            assert!(arrived.is_finite() && arrived > 0.0, "poisson at {level}");
            let kept = sample_binomial_thinning(level, 0.9, &mut rng);
            assert!(kept.is_finite() && kept <= level, "binomial at {level}");
        }
        // Gain on the largest counts may overflow but never turns negative or NaN
        let amplified = sample_em_gain(f64::MAX, 300.0, &mut rng);
        assert!(!amplified.is_nan() && amplified > 0.0);
    }

    #[test]
    fn test_normal_limit_matches_poisson_moments() {
        let samples = draws(20_000, 12, |rng| sample_poisson(4e12, rng));
        let (mean, var) = mean_var(&samples);
        assert_relative_eq!(mean, 4e12, max_relative = 1e-6);
        assert_relative_eq!(var, 4e12, max_relative = 0.05);
    }

    #[test]
    fn test_read_noise() {
        let mut rng = StdRng::seed_from_u64(8);
        assert_eq!(sample_read_noise(0.0, &mut rng), 0.0);

        let samples = draws(20_000, 9, |rng| sample_read_noise(3.0, rng));
        let (mean, var) = mean_var(&samples);
        assert_relative_eq!(mean, 0.0, epsilon = 0.1);
        assert_relative_eq!(var.sqrt(), 3.0, epsilon = 0.1);
    }
}
