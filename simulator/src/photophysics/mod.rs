//! Fluorophore photophysics: rate tables, emitters and model presets.

pub mod dynamics;
pub mod fluorophore;
pub mod rates;

pub use dynamics::DynamicsConfig;
pub use fluorophore::{FrameAdvance, Fluorophore, Position, StateTransition};
pub use rates::{PoweredRates, Rate, RateModel, Step, Transition};
