//! Scene inputs: emitter placement, background light and fixed sources.

pub mod background;
pub mod obstructor;
pub mod placement;

pub use background::BackgroundConfig;
pub use obstructor::{Fiducial, ObstructorConfig};
pub use placement::PlacementConfig;
