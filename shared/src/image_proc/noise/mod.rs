//! Noise generation module for sensor modeling

pub mod generate;

pub use generate::{sample_binomial_thinning, sample_em_gain, sample_poisson, sample_read_noise};
