//! Shared components for the SMLM acquisition simulator.
//!
//! Numeric helpers, per-stage sensor noise primitives and raster I/O that
//! do not depend on the photophysics or optics of the simulator itself.

pub mod algo;
pub mod frame_writer;
pub mod image_proc;
pub mod image_size;

pub use frame_writer::{FrameWriteError, TiffStackWriter};
pub use image_size::PixelShape;
