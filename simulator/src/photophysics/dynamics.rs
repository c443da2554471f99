//! Parameterised photophysics presets.
//!
//! Each preset names its states with the constants in the matching module
//! ([`simple`], [`palm`], [`storm`]) and builds a validated [`RateModel`].
//! Lifetimes are in seconds; power enters rates linearly.

use serde::{Deserialize, Serialize};

use super::rates::{Rate, RateModel, Transition};
use crate::error::{require_non_negative, require_positive, ConfigError};

/// State indices of the simple blinking model
pub mod simple {
    pub const ON: usize = 0;
    pub const OFF: usize = 1;
    pub const BLEACHED: usize = 2;
}

/// State indices of the PALM model
pub mod palm {
    pub const INACTIVE: usize = 0;
    pub const ON: usize = 1;
    pub const DARK: usize = 2;
    pub const BLEACHED: usize = 3;
}

/// State indices of the STORM model
pub mod storm {
    pub const ON: usize = 0;
    pub const TRIPLET: usize = 1;
    pub const DARK: usize = 2;
    pub const BLEACHED: usize = 3;
}

/// Photophysical model selection, tagged by `model` in JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum DynamicsConfig {
    /// Two-state blinking with optional bleaching; activation scales with power
    Simple {
        /// Mean on-state lifetime
        on_time: f64,
        /// Mean off-state lifetime at unit power
        off_time: f64,
        /// Mean time to bleach while on, `None` disables bleaching
        #[serde(default)]
        bleach_time: Option<f64>,
    },
    /// Photoactivation from an inactive pool
    Palm {
        /// Activation rate per unit power (1/s)
        activation_rate: f64,
        /// Mean on-state lifetime before going dark
        dark_time: f64,
        /// Mean dark-state lifetime
        dark_recovery_time: f64,
        /// Mean time to bleach while on, `None` disables bleaching
        #[serde(default)]
        bleach_time: Option<f64>,
    },
    /// Triplet-mediated dark-state switching
    Storm {
        /// Mean on-state lifetime before intersystem crossing
        triplet_time: f64,
        /// Mean triplet lifetime before relaxing to on
        triplet_recovery_time: f64,
        /// Mean triplet lifetime before entering the long-lived dark state
        dark_time: f64,
        /// Mean spontaneous dark-state lifetime
        dark_recovery_time: f64,
        /// Additional dark to on rate per unit power
        #[serde(default)]
        dark_recovery_power: f64,
        /// Mean time to bleach while on, `None` disables bleaching
        #[serde(default)]
        bleach_time: Option<f64>,
    },
    /// Explicit rate table
    Custom {
        /// Number of states
        states: usize,
        /// Emitting states
        emitting: Vec<usize>,
        /// Terminal state, if any
        #[serde(default)]
        bleached: Option<usize>,
        /// Starting state of every emitter
        #[serde(default)]
        initial_state: usize,
        /// Non-zero entries of the table
        transitions: Vec<Transition>,
    },
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        DynamicsConfig::Simple {
            on_time: 0.03,
            off_time: 1.0,
            bleach_time: Some(1.0),
        }
    }
}

/// `Some(1 / lifetime)` for finite lifetimes, `None` for an infinite one
fn optional_rate(name: &'static str, lifetime: Option<f64>) -> Result<Option<f64>, ConfigError> {
    match lifetime {
        None => Ok(None),
        Some(t) if t == f64::INFINITY => Ok(None),
        Some(t) => Ok(Some(1.0 / require_positive(name, t)?)),
    }
}

fn with_bleaching(
    mut transitions: Vec<Transition>,
    from: usize,
    to: usize,
    rate: Option<f64>,
) -> Vec<Transition> {
    if let Some(rate) = rate {
        transitions.push(Transition::new(from, to, Rate::constant(rate)));
    }
    transitions
}

impl DynamicsConfig {
    /// Build and validate the rate model
    pub fn build(&self) -> Result<RateModel, ConfigError> {
        match self {
            DynamicsConfig::Simple {
                on_time,
                off_time,
                bleach_time,
            } => {
                let off_rate = 1.0 / require_positive("on_time", *on_time)?;
                let on_per_power = 1.0 / require_positive("off_time", *off_time)?;
                let bleach = optional_rate("bleach_time", *bleach_time)?;
                let transitions = with_bleaching(
                    vec![
                        Transition::new(simple::ON, simple::OFF, Rate::constant(off_rate)),
                        Transition::new(simple::OFF, simple::ON, Rate::linear(on_per_power)),
                    ],
                    simple::ON,
                    simple::BLEACHED,
                    bleach,
                );
                RateModel::new(3, transitions, &[simple::ON], Some(simple::BLEACHED))
            }
            DynamicsConfig::Palm {
                activation_rate,
                dark_time,
                dark_recovery_time,
                bleach_time,
            } => {
                let activation = require_positive("activation_rate", *activation_rate)?;
                let to_dark = 1.0 / require_positive("dark_time", *dark_time)?;
                let recovery = 1.0 / require_positive("dark_recovery_time", *dark_recovery_time)?;
                let bleach = optional_rate("bleach_time", *bleach_time)?;
                let transitions = with_bleaching(
                    vec![
                        Transition::new(palm::INACTIVE, palm::ON, Rate::linear(activation)),
                        Transition::new(palm::ON, palm::DARK, Rate::constant(to_dark)),
                        Transition::new(palm::DARK, palm::ON, Rate::constant(recovery)),
                    ],
                    palm::ON,
                    palm::BLEACHED,
                    bleach,
                );
                RateModel::new(4, transitions, &[palm::ON], Some(palm::BLEACHED))
            }
            DynamicsConfig::Storm {
                triplet_time,
                triplet_recovery_time,
                dark_time,
                dark_recovery_time,
                dark_recovery_power,
                bleach_time,
            } => {
                let isc = 1.0 / require_positive("triplet_time", *triplet_time)?;
                let relax = 1.0 / require_positive("triplet_recovery_time", *triplet_recovery_time)?;
                let to_dark = 1.0 / require_positive("dark_time", *dark_time)?;
                let recovery = 1.0 / require_positive("dark_recovery_time", *dark_recovery_time)?;
                let per_power = require_non_negative("dark_recovery_power", *dark_recovery_power)?;
                let bleach = optional_rate("bleach_time", *bleach_time)?;
                let transitions = with_bleaching(
                    vec![
                        Transition::new(storm::ON, storm::TRIPLET, Rate::constant(isc)),
                        Transition::new(storm::TRIPLET, storm::ON, Rate::constant(relax)),
                        Transition::new(storm::TRIPLET, storm::DARK, Rate::constant(to_dark)),
                        Transition::new(storm::DARK, storm::ON, Rate::affine(recovery, per_power)),
                    ],
                    storm::ON,
                    storm::BLEACHED,
                    bleach,
                );
                RateModel::new(4, transitions, &[storm::ON], Some(storm::BLEACHED))
            }
            DynamicsConfig::Custom {
                states,
                emitting,
                bleached,
                transitions,
                ..
            } => RateModel::new(*states, transitions.clone(), emitting, *bleached),
        }
    }

    /// State every new emitter starts in
    pub fn initial_state(&self) -> usize {
        match self {
            DynamicsConfig::Simple { .. } => simple::OFF,
            DynamicsConfig::Palm { .. } => palm::INACTIVE,
            DynamicsConfig::Storm { .. } => storm::ON,
            DynamicsConfig::Custom { initial_state, .. } => *initial_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_simple_rates() {
        let model = DynamicsConfig::Simple {
            on_time: 0.5,
            off_time: 4.0,
            bleach_time: Some(10.0),
        }
        .build()
        .unwrap();

        assert_eq!(model.n_states(), 3);
        assert!(model.is_emitting(simple::ON));
        assert!(!model.is_emitting(simple::OFF));
        assert_eq!(model.bleached_state(), Some(simple::BLEACHED));
        assert_relative_eq!(model.rate(simple::ON, simple::OFF, 7.0), 2.0);
        assert_relative_eq!(model.rate(simple::OFF, simple::ON, 2.0), 0.5);
        assert_relative_eq!(model.rate(simple::ON, simple::BLEACHED, 0.0), 0.1);
    }

    #[test]
    fn test_simple_without_bleaching() {
        let config = DynamicsConfig::Simple {
            on_time: 1.0,
            off_time: 1.0,
            bleach_time: None,
        };
        let model = config.build().unwrap();
        assert_eq!(model.rate(simple::ON, simple::BLEACHED, 1.0), 0.0);
        assert_eq!(config.initial_state(), simple::OFF);
    }

    #[test]
    fn test_palm_and_storm_rates() {
        let palm_model = DynamicsConfig::Palm {
            activation_rate: 0.2,
            dark_time: 0.05,
            dark_recovery_time: 2.0,
            bleach_time: Some(0.1),
        }
        .build()
        .unwrap();
        assert_relative_eq!(palm_model.rate(palm::INACTIVE, palm::ON, 5.0), 1.0);
        assert_relative_eq!(palm_model.rate(palm::ON, palm::DARK, 0.0), 20.0);
        assert_relative_eq!(palm_model.rate(palm::DARK, palm::ON, 0.0), 0.5);
        assert_relative_eq!(palm_model.total_rate(palm::ON, 3.0), 30.0);

        let storm_model = DynamicsConfig::Storm {
            triplet_time: 0.001,
            triplet_recovery_time: 0.002,
            dark_time: 0.01,
            dark_recovery_time: 10.0,
            dark_recovery_power: 0.3,
            bleach_time: None,
        }
        .build()
        .unwrap();
        assert_relative_eq!(storm_model.rate(storm::DARK, storm::ON, 2.0), 0.1 + 0.6);
        assert_relative_eq!(storm_model.total_rate(storm::TRIPLET, 0.0), 500.0 + 100.0);
        assert!(storm_model.is_emitting(storm::ON));
    }

    #[test]
    fn test_rejects_non_positive_lifetimes() {
        let zero_on = DynamicsConfig::Simple {
            on_time: 0.0,
            off_time: 1.0,
            bleach_time: None,
        };
        assert!(matches!(
            zero_on.build(),
            Err(ConfigError::NonPositive { name: "on_time", .. })
        ));

        let no_activation = DynamicsConfig::Palm {
            activation_rate: 0.0,
            dark_time: 1.0,
            dark_recovery_time: 1.0,
            bleach_time: None,
        };
        assert!(matches!(
            no_activation.build(),
            Err(ConfigError::NonPositive { name: "activation_rate", .. })
        ));

        let bad_bleach = DynamicsConfig::Simple {
            on_time: 1.0,
            off_time: 1.0,
            bleach_time: Some(-2.0),
        };
        assert!(bad_bleach.build().is_err());
    }

    #[test]
    fn test_custom_from_json() {
        let json = r#"{
            "model": "custom",
            "states": 3,
            "emitting": [1],
            "bleached": 2,
            "initial_state": 0,
            "transitions": [
                {"from": 0, "to": 1, "rate": {"polynomial": [0.0, 4.0]}},
                {"from": 1, "to": 0, "rate": {"polynomial": [10.0]}},
                {"from": 1, "to": 2, "rate": "instantaneous"}
            ]
        }"#;
        let config: DynamicsConfig = serde_json::from_str(json).unwrap();
        let model = config.build().unwrap();
        assert_relative_eq!(model.rate(0, 1, 0.5), 2.0);
        assert_eq!(model.outgoing(1).len(), 2);
        assert!(model.outgoing(1)[1].1.is_instantaneous());
        assert_eq!(config.initial_state(), 0);
    }

    #[test]
    fn test_preset_json_tagging() {
        let json = r#"{"model": "simple", "on_time": 0.1, "off_time": 2.0}"#;
        let config: DynamicsConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config,
            DynamicsConfig::Simple {
                on_time: 0.1,
                off_time: 2.0,
                bleach_time: None
            }
        );
    }
}
