//! Single-molecule localization microscopy acquisition simulator
//!
//! This crate synthesizes raw camera frames of a fluorescence microscope
//! imaging photoswitchable emitters. Each frame runs three stages:
//! a continuous-time Markov chain per emitter decides how long it emitted,
//! a pixel-integrated Gaussian PSF spreads its photons over the sensor, and
//! a camera model adds shot, multiplication, dark and read noise before
//! quantizing to ADU. Illumination power is exposed through a shared handle
//! so external controllers can close a feedback loop on the frames.

pub mod config;
pub mod error;
pub mod events;
pub mod hardware;
pub mod logging;
pub mod microscope;
pub mod photophysics;
pub mod psf;
pub mod scene;
pub mod snapshot;

// Re-exports for easier access
pub use config::{FluorophoreConfig, SimulationConfig};
pub use error::{ConfigError, GenerationError, ShapeError, SimulationError};
pub use events::{CallbackId, EventBus, SimulationEvent};
pub use hardware::{CameraConfig, CameraNoiseModel, Laser, LaserConfig, LaserHandle, StageHandle};
pub use logging::StateLogger;
pub use microscope::{Frame, GroundTruth, Microscope};
pub use photophysics::{
    DynamicsConfig, Fluorophore, Position, Rate, RateModel, StateTransition, Transition,
};
pub use psf::{PointSpreadFunction, Psf};
pub use scene::{BackgroundConfig, ObstructorConfig, PlacementConfig};
pub use snapshot::{EmitterSnapshot, SimulationSnapshot};
