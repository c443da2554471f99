//! Photon image to digitized frame conversion.
//!
//! Every pixel passes through the same seven stages, in order:
//! 1. Poisson shot noise on the expected photon count
//! 2. Binomial quantum-efficiency thinning
//! 3. Gamma-distributed EM gain (skipped for gain 0 or 1)
//! 4. Poisson dark-current electrons for one exposure
//! 5. Gaussian read noise
//! 6. Conversion to ADU plus baseline
//! 7. Rounding and clipping to the bit depth
//!
//! Pixels are processed in parallel row chunks, each with an RNG derived
//! from the frame seed, so a seed fully determines the output.

use std::sync::Arc;

use ndarray::Array2;
use rand::{thread_rng, Rng, RngCore};
use shared::algo::process_array_in_parallel_chunks;
use shared::image_proc::noise::{
    sample_binomial_thinning, sample_em_gain, sample_poisson, sample_read_noise,
};

use super::camera::CameraConfig;
use crate::error::{ConfigError, ShapeError};

/// Camera noise and quantization chain
#[derive(Debug, Clone)]
pub struct CameraNoiseModel {
    config: Arc<CameraConfig>,
}

impl CameraNoiseModel {
    pub fn new(config: CameraConfig) -> Result<Self, ConfigError> {
        Self::from_shared(Arc::new(config))
    }

    pub fn from_shared(config: Arc<CameraConfig>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn shared_config(&self) -> Arc<CameraConfig> {
        Arc::clone(&self.config)
    }

    /// Confirm `image` has the camera's dimensions
    pub fn check_shape<T>(&self, image: &Array2<T>) -> Result<(), ShapeError> {
        let (rows, cols) = image.dim();
        if rows == self.config.height && cols == self.config.width {
            Ok(())
        } else {
            Err(ShapeError {
                width: self.config.width,
                height: self.config.height,
                actual_width: cols,
                actual_height: rows,
            })
        }
    }

    /// Photons to electrons: stages 1 through 5 for one pixel
    pub fn sample_electrons<R: Rng + ?Sized>(&self, photons: f64, rng: &mut R) -> f64 {
        let config = &*self.config;
        let expected = if photons.is_finite() && photons > 0.0 {
            photons
        } else {
            0.0
        };

        let arrived = sample_poisson(expected, rng);
        let converted = sample_binomial_thinning(arrived, config.quantum_efficiency, rng);
        let amplified = sample_em_gain(converted, config.em_gain, rng);
        let dark = sample_poisson(config.dark_electrons_per_frame(), rng);
        amplified + dark + sample_read_noise(config.read_noise_e, rng)
    }

    /// Electrons to ADU: stages 6 and 7 for one pixel
    pub fn electrons_to_adu(&self, electrons: f64) -> u16 {
        let config = &*self.config;
        let adu = electrons / config.electrons_per_adu + config.baseline_adu;
        if adu.is_nan() {
            return 0;
        }
        adu.round().clamp(0.0, config.max_adu() as f64) as u16
    }

    /// Run the full chain with a fresh random seed
    pub fn digitize(&self, photons: &Array2<f64>) -> Result<Array2<u16>, ShapeError> {
        self.digitize_with_seed(photons, thread_rng().next_u64())
    }

    /// Run the full chain; the same seed and input give the same frame
    pub fn digitize_with_seed(
        &self,
        photons: &Array2<f64>,
        seed: u64,
    ) -> Result<Array2<u16>, ShapeError> {
        self.check_shape(photons)?;

        let adu = process_array_in_parallel_chunks(photons.clone(), seed, None, |chunk, rng| {
            chunk.iter_mut().for_each(|pixel| {
                let electrons = self.sample_electrons(*pixel, rng);
                *pixel = self.electrons_to_adu(electrons) as f64;
            });
        });
        Ok(adu.mapv(|v| v as u16))
    }

    /// Noise-free conversion of an electron image: ADU scaling, baseline,
    /// rounding and clipping only.
    pub fn quantize(&self, electrons: &Array2<f64>) -> Result<Array2<u16>, ShapeError> {
        self.check_shape(electrons)?;
        Ok(electrons.mapv(|e| {
            let e = if e.is_finite() { e } else { 0.0 };
            self.electrons_to_adu(e)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::camera::models;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::algo::mean_and_variance;

    fn camera(width: usize, height: usize) -> CameraConfig {
        models::SCMOS.with_dimensions(width, height)
    }

    fn mean_var(image: &Array2<u16>) -> (f64, f64) {
        let values: Vec<f64> = image.iter().map(|&v| v as f64).collect();
        mean_and_variance(&values).unwrap()
    }

    #[test]
    fn test_shape_mismatch() {
        let model = CameraNoiseModel::new(camera(16, 8)).unwrap();
        let err = model
            .digitize_with_seed(&Array2::zeros((16, 8)), 1)
            .unwrap_err();
        assert_eq!(
            err,
            ShapeError {
                width: 16,
                height: 8,
                actual_width: 8,
                actual_height: 16
            }
        );
        assert!(model.quantize(&Array2::zeros((8, 16))).is_ok());
    }

    #[test]
    fn test_rejects_invalid_camera() {
        let mut config = camera(4, 4);
        config.bit_depth = 20;
        assert!(CameraNoiseModel::new(config).is_err());
    }

    #[test]
    fn test_output_within_bit_depth() {
        let mut config = models::EMCCD_512.with_dimensions(32, 32);
        config.bit_depth = 12;
        let model = CameraNoiseModel::new(config).unwrap();

        for &level in &[0.0, 1.0, 50.0, 1e4, 1e7] {
            let photons = Array2::from_elem((32, 32), level);
            let frame = model.digitize_with_seed(&photons, 7).unwrap();
            assert!(frame.iter().all(|&v| v <= 4095));
        }
        // Huge input saturates
        let frame = model
            .digitize_with_seed(&Array2::from_elem((32, 32), 1e7), 3)
            .unwrap();
        assert!(frame.iter().all(|&v| v == 4095));
    }

    #[test]
    fn test_extreme_finite_input_saturates() {
        let configs = [
            camera(2, 2),
            models::EMCCD_512.with_dimensions(2, 2),
            camera(2, 2).noiseless(),
        ];
        for config in configs {
            let max = config.max_adu();
            let model = CameraNoiseModel::new(config).unwrap();
            for &level in &[1e15, 1e307, 1e308, f64::MAX] {
                let frame = model
                    .digitize_with_seed(&Array2::from_elem((2, 2), level), 5)
                    .unwrap();
                assert!(frame.iter().all(|&v| v == max), "level {level}");
            }
        }
    }

    #[test]
    fn test_invalid_input_counts_as_dark() {
        let config = camera(8, 8).noiseless();
        let model = CameraNoiseModel::new(config).unwrap();
        let mut photons = Array2::from_elem((8, 8), 0.0);
        photons[[0, 0]] = f64::NAN;
        photons[[1, 1]] = -50.0;
        photons[[2, 2]] = f64::INFINITY;
        let frame = model.digitize_with_seed(&photons, 9).unwrap();
        assert!(frame.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_noiseless_chain_is_shot_noise_only() {
        let config = camera(64, 64).noiseless();
        let model = CameraNoiseModel::new(config).unwrap();
        let photons = Array2::from_elem((64, 64), 25.0);
        let frame = model.digitize_with_seed(&photons, 11).unwrap();
        let (mean, var) = mean_var(&frame);
        assert_relative_eq!(mean, 25.0, max_relative = 0.03);
        assert_relative_eq!(var, 25.0, max_relative = 0.1);
    }

    #[test]
    fn test_baseline_and_read_noise() {
        let mut config = camera(64, 64).noiseless();
        config.baseline_adu = 100.0;
        config.read_noise_e = 4.0;
        config.electrons_per_adu = 2.0;
        let model = CameraNoiseModel::new(config).unwrap();
        let frame = model
            .digitize_with_seed(&Array2::zeros((64, 64)), 21)
            .unwrap();
        let (mean, var) = mean_var(&frame);
        // Read noise of 4 e- is 2 ADU; rounding adds 1/12
        assert_relative_eq!(mean, 100.0, epsilon = 0.1);
        assert_relative_eq!(var, 4.0 + 1.0 / 12.0, max_relative = 0.1);
    }

    #[test]
    fn test_em_gain_scales_mean() {
        let mut config = camera(64, 64).noiseless();
        config.em_gain = 10.0;
        config.electrons_per_adu = 10.0;
        let model = CameraNoiseModel::new(config).unwrap();
        let frame = model
            .digitize_with_seed(&Array2::from_elem((64, 64), 20.0), 5)
            .unwrap();
        let (mean, var) = mean_var(&frame);
        assert_relative_eq!(mean, 20.0, max_relative = 0.03);
        // Excess noise factor of two for an EM register
        assert_relative_eq!(var, 40.0, max_relative = 0.15);
    }

    #[test]
    fn test_seed_reproducibility() {
        let model = CameraNoiseModel::new(models::EMCCD_512.with_dimensions(100, 70)).unwrap();
        let photons = Array2::from_shape_fn((70, 100), |(r, c)| (r * c) as f64 % 37.0);
        let a = model.digitize_with_seed(&photons, 1234).unwrap();
        let b = model.digitize_with_seed(&photons, 1234).unwrap();
        let c = model.digitize_with_seed(&photons, 1235).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_quantize_is_deterministic() {
        let mut config = camera(2, 2);
        config.electrons_per_adu = 2.0;
        config.baseline_adu = 10.0;
        config.bit_depth = 8;
        let model = CameraNoiseModel::new(config).unwrap();
        let electrons = ndarray::arr2(&[[0.0, 3.0], [-100.0, 1e6]]);
        let frame = model.quantize(&electrons).unwrap();
        assert_eq!(frame, ndarray::arr2(&[[10u16, 12], [0, 255]]));
    }

    #[test]
    fn test_sample_electrons_dark_current() {
        let mut config = camera(1, 1).noiseless();
        config.dark_current_e_p_s = 500.0;
        config.acquisition_rate_hz = 10.0;
        let model = CameraNoiseModel::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let draws: Vec<f64> = (0..20_000).map(|_| model.sample_electrons(0.0, &mut rng)).collect();
        let (mean, var) = mean_and_variance(&draws).unwrap();
        assert_relative_eq!(mean, 50.0, max_relative = 0.02);
        assert_relative_eq!(var, 50.0, max_relative = 0.05);
    }
}
