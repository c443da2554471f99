//! Transition rate tables for continuous-time photophysical models.
//!
//! A [`RateModel`] is a sparse N x N table. Each entry is either a polynomial
//! in illumination power, `rate(P) = c0 + c1*P + c2*P^2 + ...` (per second),
//! or the reserved [`Rate::Instantaneous`] value. All validation happens in
//! [`RateModel::new`]; evaluating a table never fails.
//!
//! Evaluating the table once per frame with [`RateModel::at_power`] yields
//! [`PoweredRates`], a read-only view shared by every emitter in that frame.

use rand::distributions::WeightedIndex;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Rate of a single transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rate {
    /// Polynomial in power, coefficients in ascending order
    Polynomial(Vec<f64>),
    /// Happens with zero dwell time, ahead of any stochastic transition
    Instantaneous,
}

impl Rate {
    /// Power independent rate
    pub fn constant(rate: f64) -> Self {
        Rate::Polynomial(vec![rate])
    }

    /// Rate proportional to power
    pub fn linear(per_unit_power: f64) -> Self {
        Rate::Polynomial(vec![0.0, per_unit_power])
    }

    /// `offset + slope * power`
    pub fn affine(offset: f64, slope: f64) -> Self {
        Rate::Polynomial(vec![offset, slope])
    }

    /// Whether this is the instantaneous sentinel
    pub fn is_instantaneous(&self) -> bool {
        matches!(self, Rate::Instantaneous)
    }

    /// Evaluate at the given power. Instantaneous rates evaluate to infinity.
    pub fn value_at(&self, power: f64) -> f64 {
        match self {
            Rate::Polynomial(coefficients) => coefficients
                .iter()
                .rev()
                .fold(0.0, |acc, &c| acc * power + c),
            Rate::Instantaneous => f64::INFINITY,
        }
    }

    fn validate(&self, from: usize, to: usize) -> Result<(), ConfigError> {
        if let Rate::Polynomial(coefficients) = self {
            if let Some(&value) = coefficients.iter().find(|c| !c.is_finite() || **c < 0.0) {
                return Err(ConfigError::InvalidRate { from, to, value });
            }
        }
        Ok(())
    }
}

/// One entry of the rate table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Source state
    pub from: usize,
    /// Target state
    pub to: usize,
    /// Rate of the transition
    pub rate: Rate,
}

impl Transition {
    /// Convenience constructor
    pub fn new(from: usize, to: usize, rate: Rate) -> Self {
        Self { from, to, rate }
    }
}

/// Validated table of transition rates between photophysical states
#[derive(Debug, Clone, PartialEq)]
pub struct RateModel {
    states: usize,
    outgoing: Vec<Vec<(usize, Rate)>>,
    emitting: Vec<bool>,
    bleached: Option<usize>,
}

impl RateModel {
    /// Build a rate model.
    ///
    /// # Arguments
    /// * `states` - Number of discrete states
    /// * `transitions` - Non-diagonal entries of the table; missing entries are zero
    /// * `emitting` - States in which the emitter produces photons
    /// * `bleached` - Terminal state, must have no outgoing transitions
    ///
    /// # Errors
    /// Negative or non-finite coefficients, indices out of range, self
    /// transitions, duplicated entries, an outgoing transition from the
    /// bleached state, an emitting bleached state, or a cycle made only of
    /// instantaneous transitions.
    pub fn new(
        states: usize,
        transitions: Vec<Transition>,
        emitting: &[usize],
        bleached: Option<usize>,
    ) -> Result<Self, ConfigError> {
        if states == 0 {
            return Err(ConfigError::Invalid(
                "a rate model needs at least one state".to_string(),
            ));
        }
        let check_index = |index: usize| {
            if index < states {
                Ok(index)
            } else {
                Err(ConfigError::StateOutOfRange { index, states })
            }
        };

        let mut outgoing: Vec<Vec<(usize, Rate)>> = vec![Vec::new(); states];
        for Transition { from, to, rate } in transitions {
            check_index(from)?;
            check_index(to)?;
            if from == to {
                return Err(ConfigError::SelfTransition(from));
            }
            rate.validate(from, to)?;
            if outgoing[from].iter().any(|(target, _)| *target == to) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate transition {from} -> {to}"
                )));
            }
            outgoing[from].push((to, rate));
        }
        for targets in outgoing.iter_mut() {
            targets.sort_by_key(|(target, _)| *target);
        }

        let mut emitting_flags = vec![false; states];
        for &state in emitting {
            emitting_flags[check_index(state)?] = true;
        }

        if let Some(terminal) = bleached {
            check_index(terminal)?;
            if !outgoing[terminal].is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "bleached state {terminal} must be absorbing"
                )));
            }
            if emitting_flags[terminal] {
                return Err(ConfigError::Invalid(format!(
                    "bleached state {terminal} cannot be emitting"
                )));
            }
        }

        let model = Self {
            states,
            outgoing,
            emitting: emitting_flags,
            bleached,
        };
        model.check_instantaneous_cycles()?;
        Ok(model)
    }

    /// Depth-first search over instantaneous edges only.
    fn check_instantaneous_cycles(&self) -> Result<(), ConfigError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        fn visit(model: &RateModel, state: usize, marks: &mut [Mark]) -> Result<(), ConfigError> {
            marks[state] = Mark::Active;
            for (target, rate) in &model.outgoing[state] {
                if !rate.is_instantaneous() {
                    continue;
                }
                match marks[*target] {
                    Mark::Active => return Err(ConfigError::InstantaneousCycle(*target)),
                    Mark::New => visit(model, *target, marks)?,
                    Mark::Done => {}
                }
            }
            marks[state] = Mark::Done;
            Ok(())
        }

        let mut marks = vec![Mark::New; self.states];
        for state in 0..self.states {
            if marks[state] == Mark::New {
                visit(self, state, &mut marks)?;
            }
        }
        Ok(())
    }

    /// Number of states
    pub fn n_states(&self) -> usize {
        self.states
    }

    /// Whether `state` produces photons
    pub fn is_emitting(&self, state: usize) -> bool {
        self.emitting.get(state).copied().unwrap_or(false)
    }

    /// The terminal bleached state, if the model has one
    pub fn bleached_state(&self) -> Option<usize> {
        self.bleached
    }

    /// Whether `state` is the terminal bleached state
    pub fn is_bleached(&self, state: usize) -> bool {
        self.bleached == Some(state)
    }

    /// Outgoing transitions of `state`, sorted by target
    pub fn outgoing(&self, state: usize) -> &[(usize, Rate)] {
        &self.outgoing[state]
    }

    /// Rate of `from -> to` at `power`, zero if the entry is absent
    pub fn rate(&self, from: usize, to: usize, power: f64) -> f64 {
        self.outgoing[from]
            .iter()
            .find(|(target, _)| *target == to)
            .map(|(_, rate)| rate.value_at(power))
            .unwrap_or(0.0)
    }

    /// Check every state's total rate stays finite for powers up to
    /// `max_power`. Coefficients are non-negative, so rates only grow with
    /// power and the largest power is the one to test.
    pub fn check_finite_up_to(&self, max_power: f64) -> Result<(), ConfigError> {
        for state in 0..self.states {
            let total = self.total_rate(state, max_power);
            if !total.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "rates out of state {state} overflow at power {max_power}"
                )));
            }
        }
        Ok(())
    }

    /// Sum of finite outgoing rates of `state` at `power`
    pub fn total_rate(&self, state: usize, power: f64) -> f64 {
        self.outgoing[state]
            .iter()
            .filter(|(_, rate)| !rate.is_instantaneous())
            .map(|(_, rate)| rate.value_at(power))
            .sum()
    }

    /// Evaluate the whole table for one frame's illumination power.
    pub fn at_power(&self, power: f64) -> PoweredRates<'_> {
        let power = power.max(0.0);
        let exits = (0..self.states)
            .map(|state| Exit::evaluate(&self.outgoing[state], power))
            .collect();
        PoweredRates {
            model: self,
            power,
            exits,
        }
    }
}

/// How an emitter leaves a state at a fixed power
#[derive(Debug, Clone)]
pub enum Exit {
    /// No outgoing rate, the state holds forever
    Absorbing,
    /// One or more instantaneous targets, chosen uniformly
    Instantaneous(Vec<usize>),
    /// Rates too large to represent: jump at once, target drawn by weight
    Immediate {
        /// Candidate targets
        targets: Vec<usize>,
        /// Weighted choice over `targets`
        choice: WeightedIndex<f64>,
    },
    /// Exponential dwell with total rate `total`, target drawn by weight
    Stochastic {
        /// Total outgoing rate
        total: f64,
        /// Dwell time distribution
        dwell: Exp<f64>,
        /// Candidate targets
        targets: Vec<usize>,
        /// Weighted choice over `targets`
        choice: WeightedIndex<f64>,
    },
}

impl Exit {
    fn evaluate(outgoing: &[(usize, Rate)], power: f64) -> Self {
        let instantaneous: Vec<usize> = outgoing
            .iter()
            .filter(|(_, rate)| rate.is_instantaneous())
            .map(|(target, _)| *target)
            .collect();
        if !instantaneous.is_empty() {
            return Exit::Instantaneous(instantaneous);
        }

        let (targets, weights): (Vec<usize>, Vec<f64>) = outgoing
            .iter()
            .map(|(target, rate)| (*target, rate.value_at(power)))
            .filter(|(_, value)| *value > 0.0)
            .unzip();

        // A polynomial that overflows behaves like an instantaneous edge
        let overflowed: Vec<usize> = targets
            .iter()
            .zip(&weights)
            .filter(|(_, value)| value.is_infinite())
            .map(|(target, _)| *target)
            .collect();
        if !overflowed.is_empty() {
            return Exit::Instantaneous(overflowed);
        }

        let total: f64 = weights.iter().sum();
        if total <= 0.0 || total.is_nan() {
            return Exit::Absorbing;
        }
        if total.is_infinite() {
            let largest = weights.iter().copied().fold(0.0, f64::max);
            let scaled: Vec<f64> = weights.iter().map(|w| w / largest).collect();
            return match WeightedIndex::new(&scaled) {
                Ok(choice) => Exit::Immediate { targets, choice },
                Err(_) => Exit::Absorbing,
            };
        }

        // Both constructors only fail for non-positive or non-finite input,
        // excluded just above.
        match (Exp::new(total), WeightedIndex::new(&weights)) {
            (Ok(dwell), Ok(choice)) => Exit::Stochastic {
                total,
                dwell,
                targets,
                choice,
            },
            _ => Exit::Absorbing,
        }
    }
}

/// The next event an emitter experiences from its current state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// No transition will ever happen
    Hold,
    /// Transition after `dwell` seconds
    Jump {
        /// Time spent in the current state before jumping
        dwell: f64,
        /// New state
        target: usize,
    },
}

/// Rate table evaluated at one illumination power
#[derive(Debug, Clone)]
pub struct PoweredRates<'a> {
    model: &'a RateModel,
    power: f64,
    exits: Vec<Exit>,
}

impl<'a> PoweredRates<'a> {
    /// The underlying model
    pub fn model(&self) -> &'a RateModel {
        self.model
    }

    /// Power this table was evaluated at
    pub fn power(&self) -> f64 {
        self.power
    }

    /// Exit description of `state`
    pub fn exit(&self, state: usize) -> &Exit {
        &self.exits[state]
    }

    /// Total finite outgoing rate of `state`
    pub fn total_rate(&self, state: usize) -> f64 {
        match &self.exits[state] {
            Exit::Stochastic { total, .. } => *total,
            Exit::Instantaneous(_) | Exit::Immediate { .. } => f64::INFINITY,
            Exit::Absorbing => 0.0,
        }
    }

    /// Draw the next transition out of `state`.
    ///
    /// Instantaneous targets take priority and are tied uniformly; otherwise
    /// the dwell is exponential in the total rate and the target is chosen
    /// with probability `rate / total`.
    pub fn sample_step<R: Rng + ?Sized>(&self, state: usize, rng: &mut R) -> Step {
        match &self.exits[state] {
            Exit::Absorbing => Step::Hold,
            Exit::Instantaneous(targets) => match targets.choose(rng) {
                Some(&target) => Step::Jump { dwell: 0.0, target },
                None => Step::Hold,
            },
            Exit::Immediate { targets, choice } => Step::Jump {
                dwell: 0.0,
                target: targets[choice.sample(rng)],
            },
            Exit::Stochastic {
                dwell,
                targets,
                choice,
                ..
            } => {
                let dwell = dwell.sample(rng);
                let target = targets[choice.sample(rng)];
                Step::Jump { dwell, target }
            }
        }
    }
}
