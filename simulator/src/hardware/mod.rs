//! Camera, illumination and stage models

pub mod camera;
pub mod camera_noise;
pub mod laser;
pub mod stage;

pub use camera::{models, CameraConfig};
pub use camera_noise::CameraNoiseModel;
pub use laser::{Laser, LaserConfig, LaserHandle};
pub use stage::StageHandle;
