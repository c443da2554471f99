//! Camera configuration for simulating detector characteristics

use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use shared::PixelShape;

use crate::error::{require_non_negative, require_positive, ConfigError};

fn default_name() -> String {
    "camera".to_string()
}

/// Configuration for a camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Name/model of the camera
    #[serde(default = "default_name")]
    pub name: String,
    /// Width of sensor in pixels
    pub width: usize,
    /// Height of sensor in pixels
    pub height: usize,
    /// Object-space pixel size in microns
    pub pixel_size_um: f64,
    /// Frames per second; exposure is the reciprocal
    pub acquisition_rate_hz: f64,
    /// Probability that an incident photon produces a photoelectron
    pub quantum_efficiency: f64,
    /// Electron multiplication gain, 0 or 1 disables the EM register
    #[serde(default)]
    pub em_gain: f64,
    /// Read noise in electrons per pixel
    pub read_noise_e: f64,
    /// Dark current in electrons per pixel per second
    pub dark_current_e_p_s: f64,
    /// Electrons per analog-digital unit
    pub electrons_per_adu: f64,
    /// Offset added to every pixel, in ADU
    #[serde(default)]
    pub baseline_adu: f64,
    /// Bit depth of the ADC
    pub bit_depth: u8,
}

impl CameraConfig {
    /// Validate every field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "camera dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.bit_depth == 0 || self.bit_depth > 16 {
            return Err(ConfigError::OutOfRange {
                name: "bit_depth",
                value: self.bit_depth as f64,
                min: 1.0,
                max: 16.0,
            });
        }
        if !(0.0..=1.0).contains(&self.quantum_efficiency) {
            return Err(ConfigError::OutOfRange {
                name: "quantum_efficiency",
                value: self.quantum_efficiency,
                min: 0.0,
                max: 1.0,
            });
        }
        require_positive("pixel_size_um", self.pixel_size_um)?;
        require_positive("acquisition_rate_hz", self.acquisition_rate_hz)?;
        require_positive("electrons_per_adu", self.electrons_per_adu)?;
        require_non_negative("em_gain", self.em_gain)?;
        if self.em_gain > 0.0 && self.em_gain < 1.0 {
            return Err(ConfigError::OutOfRange {
                name: "em_gain",
                value: self.em_gain,
                min: 1.0,
                max: f64::INFINITY,
            });
        }
        require_non_negative("read_noise_e", self.read_noise_e)?;
        require_non_negative("dark_current_e_p_s", self.dark_current_e_p_s)?;
        require_non_negative("baseline_adu", self.baseline_adu)?;
        Ok(())
    }

    /// Frame dimensions
    pub fn shape(&self) -> PixelShape {
        PixelShape::new(self.width, self.height)
    }

    /// Integration time of one frame
    pub fn exposure(&self) -> Duration {
        Duration::from_secs_f64(self.exposure_secs())
    }

    /// Integration time of one frame in seconds
    pub fn exposure_secs(&self) -> f64 {
        1.0 / self.acquisition_rate_hz
    }

    /// Largest representable pixel value
    pub fn max_adu(&self) -> u16 {
        ((1u32 << self.bit_depth) - 1) as u16
    }

    /// Whether the EM register amplifies
    pub fn em_enabled(&self) -> bool {
        self.em_gain > 1.0
    }

    /// Expected dark electrons per pixel per frame
    pub fn dark_electrons_per_frame(&self) -> f64 {
        self.dark_current_e_p_s * self.exposure_secs()
    }

    /// Same camera with a different region of interest
    pub fn with_dimensions(&self, width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            ..self.clone()
        }
    }

    /// Same camera without any noise source: unit QE, no gain, no dark
    /// current, no read noise, one electron per ADU and zero baseline.
    pub fn noiseless(&self) -> Self {
        Self {
            quantum_efficiency: 1.0,
            em_gain: 0.0,
            read_noise_e: 0.0,
            dark_current_e_p_s: 0.0,
            electrons_per_adu: 1.0,
            baseline_adu: 0.0,
            ..self.clone()
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        models::SCMOS.clone()
    }
}

/// Standard camera models
pub mod models {
    use super::*;

    /// Back-illuminated EMCCD, 512x512 at 100 nm object-space pixels
    pub static EMCCD_512: Lazy<CameraConfig> = Lazy::new(|| CameraConfig {
        name: "EMCCD 512".to_string(),
        width: 512,
        height: 512,
        pixel_size_um: 0.1,
        acquisition_rate_hz: 100.0,
        quantum_efficiency: 0.95,
        em_gain: 100.0,
        read_noise_e: 50.0,
        dark_current_e_p_s: 0.001,
        electrons_per_adu: 12.0,
        baseline_adu: 100.0,
        bit_depth: 16,
    });

    /// Scientific CMOS, 128x128 region of interest
    pub static SCMOS: Lazy<CameraConfig> = Lazy::new(|| CameraConfig {
        name: "sCMOS".to_string(),
        width: 128,
        height: 128,
        pixel_size_um: 0.1,
        acquisition_rate_hz: 100.0,
        quantum_efficiency: 0.8,
        em_gain: 0.0,
        read_noise_e: 1.6,
        dark_current_e_p_s: 0.06,
        electrons_per_adu: 0.45,
        baseline_adu: 100.0,
        bit_depth: 16,
    });

    /// All predefined cameras
    pub static ALL_CAMERAS: Lazy<Vec<CameraConfig>> =
        Lazy::new(|| vec![EMCCD_512.clone(), SCMOS.clone()]);
}
