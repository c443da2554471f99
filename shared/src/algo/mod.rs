//! Algorithms shared across the simulator
//!
//! Deterministic parallel helpers and the small amount of statistics needed
//! for optical integration and stochastic test assertions.

pub mod parallel;
pub mod stats;

pub use parallel::{
    derive_seed, map_items_seeded, process_array_in_parallel_chunks, seeded_rng,
};
pub use stats::{binomial_z_score, gaussian_interval_mass, mean_and_variance, normal_cdf};
