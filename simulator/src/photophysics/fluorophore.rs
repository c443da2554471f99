//! Single emitters and their per-frame state evolution.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::rates::{PoweredRates, RateModel, Step};
use crate::error::{require_non_negative, ConfigError};

static NEXT_FLUOROPHORE_ID: AtomicU64 = AtomicU64::new(0);

/// Allocate a process-wide unique fluorophore id
fn next_id() -> u64 {
    NEXT_FLUOROPHORE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Emitter position: `x`, `y` in pixels, `z` in micrometres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Column coordinate in pixels
    pub x: f64,
    /// Row coordinate in pixels
    pub y: f64,
    /// Axial position in micrometres
    #[serde(default)]
    pub z: f64,
}

impl Position {
    /// Position in the focal plane
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Position with an axial coordinate
    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A state change that happened inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// Emitter that changed state
    pub fluorophore_id: u64,
    /// Previous state
    pub from: usize,
    /// New state
    pub to: usize,
    /// Seconds since the start of the exposure
    pub time: f64,
}

/// Result of advancing one emitter through one exposure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameAdvance {
    /// Photons emitted during the exposure
    pub photons: f64,
    /// Seconds spent in emitting states
    pub emitting_time: f64,
    /// Transitions in chronological order, empty unless recording was requested
    pub transitions: Vec<StateTransition>,
    /// Whether the emitter reached the bleached state during this exposure
    pub bleached_now: bool,
}

/// One photoswitchable emitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fluorophore {
    id: u64,
    position: Position,
    signal: f64,
    state: usize,
    emitting: bool,
    bleached: bool,
    total_emitting_time: f64,
    total_dark_time: f64,
    last_photons: f64,
}

impl Fluorophore {
    /// Create an emitter in `initial_state` of `model`.
    ///
    /// # Arguments
    /// * `position` - Location in pixels (x, y) and micrometres (z)
    /// * `signal` - Photons emitted per frame while continuously emitting
    /// * `model` - Rate model the state index refers to
    /// * `initial_state` - Starting state
    pub fn new(
        position: Position,
        signal: f64,
        model: &RateModel,
        initial_state: usize,
    ) -> Result<Self, ConfigError> {
        require_non_negative("signal", signal)?;
        if initial_state >= model.n_states() {
            return Err(ConfigError::StateOutOfRange {
                index: initial_state,
                states: model.n_states(),
            });
        }
        Ok(Self {
            id: next_id(),
            position,
            signal,
            state: initial_state,
            emitting: model.is_emitting(initial_state),
            bleached: model.is_bleached(initial_state),
            total_emitting_time: 0.0,
            total_dark_time: 0.0,
            last_photons: 0.0,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn signal(&self) -> f64 {
        self.signal
    }

    pub fn state(&self) -> usize {
        self.state
    }

    pub fn is_emitting(&self) -> bool {
        self.emitting
    }

    pub fn is_bleached(&self) -> bool {
        self.bleached
    }

    /// Photons emitted in the most recent exposure
    pub fn last_photons(&self) -> f64 {
        self.last_photons
    }

    /// Accumulated seconds spent in emitting states
    pub fn total_emitting_time(&self) -> f64 {
        self.total_emitting_time
    }

    /// Accumulated seconds spent in non-emitting states
    pub fn total_dark_time(&self) -> f64 {
        self.total_dark_time
    }

    /// Overwrite the mutable state, used when restoring a snapshot.
    pub(crate) fn restore_state(
        &mut self,
        model: &RateModel,
        state: usize,
        total_emitting_time: f64,
        total_dark_time: f64,
    ) {
        self.state = state;
        self.emitting = model.is_emitting(state);
        self.bleached = model.is_bleached(state);
        self.total_emitting_time = total_emitting_time;
        self.total_dark_time = total_dark_time;
        self.last_photons = 0.0;
    }

    fn enter(&mut self, rates: &PoweredRates<'_>, state: usize) {
        let model = rates.model();
        self.state = state;
        self.emitting = model.is_emitting(state);
        self.bleached = model.is_bleached(state);
    }

    fn spend(&mut self, seconds: f64, emitting_time: &mut f64) {
        if self.emitting {
            *emitting_time += seconds;
            self.total_emitting_time += seconds;
        } else {
            self.total_dark_time += seconds;
        }
    }

    /// Run the state machine through one exposure of `exposure` seconds.
    ///
    /// Photons are `signal` scaled by the fraction of the exposure spent in
    /// emitting states. A bleached emitter stays bleached and emits nothing.
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        rates: &PoweredRates<'_>,
        exposure: f64,
        rng: &mut R,
        record: bool,
    ) -> FrameAdvance {
        let exposure = exposure.max(0.0);
        let was_bleached = self.bleached;
        let mut outcome = FrameAdvance::default();
        let mut elapsed = 0.0;

        loop {
            match rates.sample_step(self.state, rng) {
                Step::Hold => {
                    self.spend(exposure - elapsed, &mut outcome.emitting_time);
                    break;
                }
                Step::Jump { dwell, target } => {
                    if dwell > 0.0 && elapsed + dwell >= exposure {
                        self.spend(exposure - elapsed, &mut outcome.emitting_time);
                        break;
                    }
                    self.spend(dwell, &mut outcome.emitting_time);
                    elapsed += dwell;
                    if record {
                        outcome.transitions.push(StateTransition {
                            fluorophore_id: self.id,
                            from: self.state,
                            to: target,
                            time: elapsed,
                        });
                    }
                    self.enter(rates, target);
                }
            }
        }

        outcome.photons = if exposure > 0.0 {
            self.signal * (outcome.emitting_time / exposure)
        } else {
            0.0
        };
        outcome.bleached_now = self.bleached && !was_bleached;
        self.last_photons = outcome.photons;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photophysics::rates::{Rate, Transition};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn blinker(on_rate: f64, off_rate: f64) -> RateModel {
        RateModel::new(
            2,
            vec![
                Transition::new(0, 1, Rate::constant(off_rate)),
                Transition::new(1, 0, Rate::constant(on_rate)),
            ],
            &[0],
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_ids_are_unique() {
        let model = blinker(1.0, 1.0);
        let a = Fluorophore::new(Position::new(0.0, 0.0), 100.0, &model, 0).unwrap();
        let b = Fluorophore::new(Position::new(0.0, 0.0), 100.0, &model, 0).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_rejects_bad_construction() {
        let model = blinker(1.0, 1.0);
        assert!(Fluorophore::new(Position::default(), -1.0, &model, 0).is_err());
        assert!(matches!(
            Fluorophore::new(Position::default(), 1.0, &model, 2),
            Err(ConfigError::StateOutOfRange { index: 2, states: 2 })
        ));
    }

    #[test]
    fn test_always_on_emits_full_signal() {
        let model = RateModel::new(1, vec![], &[0], None).unwrap();
        let rates = model.at_power(1.0);
        let mut f = Fluorophore::new(Position::new(3.0, 4.0), 1000.0, &model, 0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        for _ in 0..5 {
            let out = f.advance(&rates, 0.01, &mut rng, true);
            assert_relative_eq!(out.photons, 1000.0);
            assert!(out.transitions.is_empty());
        }
        assert_relative_eq!(f.total_emitting_time(), 0.05, epsilon = 1e-12);
        assert_relative_eq!(f.last_photons(), 1000.0);
    }

    #[test]
    fn test_zero_rates_hold_state() {
        let model = RateModel::new(
            2,
            vec![Transition::new(1, 0, Rate::linear(10.0))],
            &[0],
            None,
        )
        .unwrap();
        let rates = model.at_power(0.0);
        let mut f = Fluorophore::new(Position::default(), 500.0, &model, 1).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let out = f.advance(&rates, 0.1, &mut rng, false);
            assert_eq!(out.photons, 0.0);
            assert_eq!(f.state(), 1);
        }
    }

    #[test]
    fn test_photons_scale_with_emitting_fraction() {
        let model = blinker(50.0, 50.0);
        let rates = model.at_power(1.0);
        let mut rng = StdRng::seed_from_u64(11);
        let mut f = Fluorophore::new(Position::default(), 100.0, &model, 0).unwrap();

        for _ in 0..2000 {
            let out = f.advance(&rates, 0.05, &mut rng, true);
            assert!(out.photons >= 0.0 && out.photons <= 100.0 + 1e-9);
            assert_relative_eq!(out.photons, 100.0 * out.emitting_time / 0.05, epsilon = 1e-9);
            // Transition times are ordered and inside the exposure
            let mut last = 0.0;
            for t in &out.transitions {
                assert!(t.time >= last && t.time <= 0.05);
                assert_eq!(t.fluorophore_id, f.id());
                last = t.time;
            }
        }
        // Symmetric rates spend roughly half the time on
        let fraction = f.total_emitting_time() / (f.total_emitting_time() + f.total_dark_time());
        assert_relative_eq!(fraction, 0.5, epsilon = 0.05);
    }

    #[test]
    fn test_bleached_is_terminal() {
        let model = RateModel::new(
            2,
            vec![Transition::new(0, 1, Rate::constant(1e3))],
            &[0],
            Some(1),
        )
        .unwrap();
        let rates = model.at_power(1.0);
        let mut rng = StdRng::seed_from_u64(8);
        let mut f = Fluorophore::new(Position::default(), 100.0, &model, 0).unwrap();

        let first = f.advance(&rates, 1.0, &mut rng, true);
        assert!(first.bleached_now);
        assert!(f.is_bleached());
        assert_eq!(first.transitions.len(), 1);

        for _ in 0..50 {
            let out = f.advance(&rates, 1.0, &mut rng, true);
            assert_eq!(out.photons, 0.0);
            assert!(!out.bleached_now);
            assert!(out.transitions.is_empty());
        }
    }

    #[test]
    fn test_instantaneous_chain_resolves_at_time_zero() {
        let model = RateModel::new(
            3,
            vec![
                Transition::new(0, 1, Rate::Instantaneous),
                Transition::new(1, 2, Rate::Instantaneous),
            ],
            &[2],
            None,
        )
        .unwrap();
        let rates = model.at_power(1.0);
        let mut rng = StdRng::seed_from_u64(2);
        let mut f = Fluorophore::new(Position::default(), 10.0, &model, 0).unwrap();
        let out = f.advance(&rates, 0.02, &mut rng, true);
        assert_eq!(f.state(), 2);
        assert_eq!(out.transitions.len(), 2);
        assert!(out.transitions.iter().all(|t| t.time == 0.0));
        assert_relative_eq!(out.photons, 10.0);
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let model = blinker(30.0, 20.0);
        let rates = model.at_power(1.0);
        let run = || {
            let mut f = Fluorophore::new(Position::default(), 100.0, &model, 0).unwrap();
            let mut rng = StdRng::seed_from_u64(99);
            (0..50)
                .map(|_| f.advance(&rates, 0.03, &mut rng, false).photons)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
