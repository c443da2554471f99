//! Fixed point sources such as fiducial beads.

use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::PixelShape;

use super::placement::random_positions;
use crate::error::{require_non_negative, ConfigError};
use crate::photophysics::Position;
use crate::psf::{PointSpreadFunction, Psf};

/// Always-on sources, tagged by `kind` in JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObstructorConfig {
    /// `count` beads at random in-focus positions, `signal` photons per frame each
    Fiducials { count: usize, signal: f64 },
}

impl ObstructorConfig {
    pub fn build<R: Rng + ?Sized>(
        &self,
        shape: PixelShape,
        rng: &mut R,
    ) -> Result<Vec<Fiducial>, ConfigError> {
        match self {
            ObstructorConfig::Fiducials { count, signal } => {
                require_non_negative("fiducial signal", *signal)?;
                Ok(random_positions(*count, shape, 0.0, 0.0, rng)
                    .into_iter()
                    .map(|position| Fiducial::new(position, *signal))
                    .collect())
            }
        }
    }
}

/// Constant-brightness point source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fiducial {
    pub position: Position,
    pub signal: f64,
}

impl Fiducial {
    pub fn new(position: Position, signal: f64) -> Self {
        Self { position, signal }
    }

    pub fn render_into(&self, frame: &mut Array2<f64>, psf: &Psf, stage_z: f64) {
        psf.render_into(frame, self.position, stage_z, self.signal);
    }
}
