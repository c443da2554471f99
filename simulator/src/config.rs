//! Simulation configuration loaded from JSON.
//!
//! Every section has a default, so a configuration file only needs the
//! fields it changes:
//!
//! ```json
//! {
//!   "camera": { "width": 64, "height": 64, "pixel_size_um": 0.1,
//!               "acquisition_rate_hz": 100.0, "quantum_efficiency": 0.9,
//!               "read_noise_e": 1.5, "dark_current_e_p_s": 0.05,
//!               "electrons_per_adu": 0.5, "baseline_adu": 100.0,
//!               "bit_depth": 16 },
//!   "psf": { "type": "gaussian_2d", "fwhm": 2.0 },
//!   "dynamics": { "model": "palm", "activation_rate": 0.5,
//!                 "dark_time": 0.05, "dark_recovery_time": 1.0,
//!                 "bleach_time": 0.2 },
//!   "fluorophores": { "signal": 1500.0,
//!                     "placement": { "kind": "random", "count": 200 } },
//!   "background": { "kind": "uniform", "value": 10.0 },
//!   "laser": { "min_power": 0.0, "max_power": 10.0, "initial_power": 1.0 },
//!   "seed": 42
//! }
//! ```

use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{require_positive, ConfigError};
use crate::hardware::{CameraConfig, Laser, LaserConfig};
use crate::photophysics::DynamicsConfig;
use crate::psf::Psf;
use crate::scene::{BackgroundConfig, ObstructorConfig, PlacementConfig};

/// Emitter brightness and layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluorophoreConfig {
    /// Photons per frame while continuously emitting
    pub signal: f64,
    #[serde(default)]
    pub placement: PlacementConfig,
}

impl Default for FluorophoreConfig {
    fn default() -> Self {
        Self {
            signal: 1000.0,
            placement: PlacementConfig::default(),
        }
    }
}

/// Complete description of a simulated acquisition
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub psf: Psf,
    #[serde(default)]
    pub dynamics: DynamicsConfig,
    #[serde(default)]
    pub fluorophores: FluorophoreConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub obstructors: Vec<ObstructorConfig>,
    #[serde(default)]
    pub laser: LaserConfig,
    /// Initial axial stage position in µm
    #[serde(default)]
    pub stage_z: f64,
    /// Run seed; a random one is drawn when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading simulation config from {}", path.display());
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every section without building the microscope
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.camera.validate()?;
        self.psf.validate()?;
        let model = self.dynamics.build()?;
        let initial = self.dynamics.initial_state();
        if initial >= model.n_states() {
            return Err(ConfigError::StateOutOfRange {
                index: initial,
                states: model.n_states(),
            });
        }
        require_positive("signal", self.fluorophores.signal)?;
        Laser::from_config(&self.laser)?;
        if !self.stage_z.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "stage_z must be finite, got {}",
                self.stage_z
            )));
        }
        Ok(())
    }
}
