//! Serialisable simulation state for pausing and resuming runs.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::photophysics::Fluorophore;

/// State of one emitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterSnapshot {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub signal: f64,
    pub state: usize,
    pub on_time: f64,
    pub off_time: f64,
}

impl From<&Fluorophore> for EmitterSnapshot {
    fn from(f: &Fluorophore) -> Self {
        let p = f.position();
        Self {
            id: f.id(),
            x: p.x,
            y: p.y,
            z: p.z,
            signal: f.signal(),
            state: f.state(),
            on_time: f.total_emitting_time(),
            off_time: f.total_dark_time(),
        }
    }
}

/// Everything needed to continue a run at `frame_index`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub frame_index: u64,
    pub power: f64,
    pub stage_z: f64,
    pub emitters: Vec<EmitterSnapshot>,
}

impl SimulationSnapshot {
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }
}
