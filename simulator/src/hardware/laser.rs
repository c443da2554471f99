//! Illumination source whose power is adjusted by external controllers.

use std::sync::{Arc, Mutex, MutexGuard};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{require_non_negative, ConfigError};

/// Power limits and starting power of the laser
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaserConfig {
    pub min_power: f64,
    pub max_power: f64,
    pub initial_power: f64,
}

impl Default for LaserConfig {
    fn default() -> Self {
        Self {
            min_power: 0.0,
            max_power: 1.0,
            initial_power: 0.1,
        }
    }
}

/// Laser with a power level clamped to `[min_power, max_power]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Laser {
    min_power: f64,
    max_power: f64,
    power: f64,
}

impl Laser {
    /// Create a laser; `initial` is clamped into the allowed range.
    pub fn new(min_power: f64, max_power: f64, initial: f64) -> Result<Self, ConfigError> {
        require_non_negative("min_power", min_power)?;
        require_non_negative("max_power", max_power)?;
        if min_power > max_power {
            return Err(ConfigError::Invalid(format!(
                "laser min_power {min_power} exceeds max_power {max_power}"
            )));
        }
        let mut laser = Self {
            min_power,
            max_power,
            power: min_power,
        };
        laser.set_power(initial);
        Ok(laser)
    }

    pub fn from_config(config: &LaserConfig) -> Result<Self, ConfigError> {
        Self::new(config.min_power, config.max_power, config.initial_power)
    }

    pub fn power(&self) -> f64 {
        self.power
    }

    pub fn min_power(&self) -> f64 {
        self.min_power
    }

    pub fn max_power(&self) -> f64 {
        self.max_power
    }

    /// Set the power, clamped to the limits. Returns the applied power.
    /// NaN requests are ignored.
    pub fn set_power(&mut self, power: f64) -> f64 {
        if power.is_nan() {
            warn!("Ignoring NaN laser power request, keeping {}", self.power);
            return self.power;
        }
        self.power = power.clamp(self.min_power, self.max_power);
        self.power
    }
}

/// Cloneable handle to a laser shared between the microscope and controllers
#[derive(Debug, Clone)]
pub struct LaserHandle {
    inner: Arc<Mutex<Laser>>,
}

impl LaserHandle {
    pub fn new(laser: Laser) -> Self {
        Self {
            inner: Arc::new(Mutex::new(laser)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Laser> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current power
    pub fn power(&self) -> f64 {
        self.lock().power()
    }

    /// Set the power, clamped to the limits. Returns the applied power.
    pub fn set_power(&self, power: f64) -> f64 {
        self.lock().set_power(power)
    }

    /// Copy of the laser state
    pub fn get(&self) -> Laser {
        *self.lock()
    }
}
