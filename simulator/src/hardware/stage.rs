//! Axial sample stage.

use std::sync::{Arc, Mutex};

/// Shared axial offset of the stage in micrometres
///
/// Positive values move the focal plane towards larger emitter `z`.
#[derive(Debug, Clone, Default)]
pub struct StageHandle {
    z: Arc<Mutex<f64>>,
}

impl StageHandle {
    pub fn new(z: f64) -> Self {
        Self {
            z: Arc::new(Mutex::new(if z.is_finite() { z } else { 0.0 })),
        }
    }

    /// Current focal plane position
    pub fn z(&self) -> f64 {
        *self.z.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move the focal plane; non-finite positions are ignored.
    pub fn set_z(&self, z: f64) -> f64 {
        let mut current = self.z.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if z.is_finite() {
            *current = z;
        }
        *current
    }
}
