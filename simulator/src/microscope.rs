//! Frame assembly: photophysics, optics and camera for one acquisition.
//!
//! Each call to [`Microscope::next_frame`] reads the laser power and stage
//! position once, advances every emitter through one exposure, renders the
//! emitting ones, adds background and fixed sources, and digitizes the
//! result. Frames are strictly sequential and every random draw comes from a
//! stream derived from the run seed, so a seed reproduces a whole run.

use log::{debug, info, warn};
use ndarray::Array2;
use rand::{thread_rng, RngCore};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use shared::algo::{derive_seed, map_items_seeded, seeded_rng};

use crate::config::SimulationConfig;
use crate::error::{ConfigError, GenerationError, ShapeError};
use crate::events::{CallbackId, EventBus, SimulationEvent};
use crate::hardware::{CameraConfig, CameraNoiseModel, Laser, LaserHandle, StageHandle};
use crate::logging::StateLogger;
use crate::photophysics::{FrameAdvance, Fluorophore, RateModel};
use crate::psf::{PointSpreadFunction, Psf, SpotPatch};
use crate::scene::background::background_from_array;
use crate::scene::Fiducial;
use crate::snapshot::{EmitterSnapshot, SimulationSnapshot};

// Stream tags for derive_seed
const FRAME_STREAM: u64 = 1;
const EMITTER_STREAM: u64 = 2;
const NOISE_STREAM: u64 = 3;
const PLACEMENT_STREAM: u64 = 4;
const FIDUCIAL_STREAM: u64 = 5;
const BACKGROUND_STREAM: u64 = 6;

/// Noise-free facts about a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    /// Emitters that produced photons during the exposure
    pub emitting_count: usize,
    /// Emitters in an emitting state at the end of the exposure
    pub on_count: usize,
    /// Emitters in the terminal state at the end of the exposure
    pub bleached_count: usize,
    /// Photons emitted by all emitters, before PSF truncation
    pub total_photons: f64,
    /// Laser power used for the frame
    pub power: f64,
    /// Stage position used for the frame
    pub stage_z: f64,
}

/// One simulated camera frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based frame number
    pub index: u64,
    /// Digitized image in ADU
    pub image: Array2<u16>,
    /// Expected photons per pixel before the camera chain
    pub photons: Array2<f64>,
    pub ground_truth: GroundTruth,
}

/// Simulated localization microscope
#[derive(Debug)]
pub struct Microscope {
    camera: CameraNoiseModel,
    psf: Psf,
    model: RateModel,
    fluorophores: Vec<Fluorophore>,
    background: Array2<f64>,
    fiducials: Vec<Fiducial>,
    laser: LaserHandle,
    stage: StageHandle,
    events: EventBus,
    logger: Option<StateLogger>,
    seed: u64,
    frame_index: u64,
}

impl Microscope {
    /// Assemble a microscope from validated parts, with no background.
    pub fn new(
        camera: CameraConfig,
        psf: Psf,
        model: RateModel,
        fluorophores: Vec<Fluorophore>,
        laser: Laser,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        let camera = CameraNoiseModel::new(camera)?;
        psf.validate()?;
        if let Some(f) = fluorophores.iter().find(|f| f.state() >= model.n_states()) {
            return Err(ConfigError::StateOutOfRange {
                index: f.state(),
                states: model.n_states(),
            });
        }
        model.check_finite_up_to(laser.max_power())?;
        let background = Array2::zeros(camera.config().shape().array_dim());

        Ok(Self {
            camera,
            psf,
            model,
            fluorophores,
            background,
            fiducials: Vec::new(),
            laser: LaserHandle::new(laser),
            stage: StageHandle::default(),
            events: EventBus::new(),
            logger: None,
            seed,
            frame_index: 0,
        })
    }

    /// Build everything described by a configuration
    pub fn from_config(config: &SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(|| thread_rng().next_u64());
        let shape = config.camera.shape();
        let model = config.dynamics.build()?;
        let initial_state = config.dynamics.initial_state();

        let mut placement_rng = seeded_rng(seed, PLACEMENT_STREAM, 0);
        let fluorophores = config
            .fluorophores
            .placement
            .positions(shape, &mut placement_rng)?
            .into_iter()
            .map(|position| {
                Fluorophore::new(position, config.fluorophores.signal, &model, initial_state)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let background = config
            .background
            .generate(shape, derive_seed(seed, BACKGROUND_STREAM, 0))?;

        let mut fiducial_rng = seeded_rng(seed, FIDUCIAL_STREAM, 0);
        let mut fiducials = Vec::new();
        for obstructor in &config.obstructors {
            fiducials.extend(obstructor.build(shape, &mut fiducial_rng)?);
        }

        info!(
            "Microscope {}x{} with {} emitters, {} fiducials, seed {}",
            shape.width,
            shape.height,
            fluorophores.len(),
            fiducials.len(),
            seed
        );

        let laser = Laser::from_config(&config.laser)?;
        Ok(
            Self::new(config.camera.clone(), config.psf, model, fluorophores, laser, seed)?
                .with_background(background)?
                .with_fiducials(fiducials)
                .with_stage(StageHandle::new(config.stage_z)),
        )
    }

    /// Replace the background; larger images are cropped to the top-left.
    pub fn with_background(mut self, background: Array2<f64>) -> Result<Self, ConfigError> {
        self.background = background_from_array(background, self.camera.config().shape())?;
        Ok(self)
    }

    pub fn with_fiducials(mut self, fiducials: Vec<Fiducial>) -> Self {
        self.fiducials = fiducials;
        self
    }

    /// Share a stage with other controllers
    pub fn with_stage(mut self, stage: StageHandle) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_logger(mut self, logger: StateLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Detach the state logger so it can be closed
    pub fn take_logger(&mut self) -> Option<StateLogger> {
        self.logger.take()
    }

    pub fn camera(&self) -> &CameraConfig {
        self.camera.config()
    }

    pub fn psf(&self) -> &Psf {
        &self.psf
    }

    pub fn rate_model(&self) -> &RateModel {
        &self.model
    }

    pub fn fluorophores(&self) -> &[Fluorophore] {
        &self.fluorophores
    }

    pub fn background(&self) -> &Array2<f64> {
        &self.background
    }

    pub fn fiducials(&self) -> &[Fiducial] {
        &self.fiducials
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Index the next frame will carry
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Handle for external power controllers
    pub fn laser(&self) -> LaserHandle {
        self.laser.clone()
    }

    /// Handle for external focus controllers
    pub fn stage(&self) -> StageHandle {
        self.stage.clone()
    }

    pub fn power(&self) -> f64 {
        self.laser.power()
    }

    /// Set the laser power for following frames; returns the clamped value
    pub fn set_power(&self, power: f64) -> f64 {
        self.laser.set_power(power)
    }

    pub fn stage_z(&self) -> f64 {
        self.stage.z()
    }

    pub fn set_stage_z(&self, z: f64) -> f64 {
        self.stage.set_z(z)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn register_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&SimulationEvent) + Send + Sync + 'static,
    {
        self.events.register_callback(callback)
    }

    pub fn deregister_callback(&self, callback_id: CallbackId) -> bool {
        self.events.deregister_callback(callback_id)
    }

    pub fn subscribe_channel(&self) -> crossbeam_channel::Receiver<SimulationEvent> {
        self.events.subscribe_channel()
    }

    /// Run an externally supplied photon image through the camera chain
    pub fn digitize(&self, photons: &Array2<f64>) -> Result<Array2<u16>, ShapeError> {
        self.camera.digitize(photons)
    }

    /// Advance every emitter one exposure and produce the next frame
    pub fn next_frame(&mut self) -> Result<Frame, GenerationError> {
        let index = self.frame_index;
        let power = self.laser.power();
        let stage_z = self.stage.z();
        let exposure = self.camera.config().exposure_secs();
        let record = self.events.has_subscribers();

        let rates = self.model.at_power(power);
        let frame_seed = derive_seed(self.seed, FRAME_STREAM, index);
        let advances: Vec<FrameAdvance> =
            map_items_seeded(&mut self.fluorophores, frame_seed, EMITTER_STREAM, |f, rng| {
                f.advance(&rates, exposure, rng, record)
            });

        let psf = &self.psf;
        let patches: Vec<SpotPatch> = self
            .fluorophores
            .par_iter()
            .zip(advances.par_iter())
            .filter(|(_, advance)| advance.photons > 0.0)
            .map(|(f, advance)| psf.render_patch(f.position(), stage_z, advance.photons))
            .collect();

        // Patches are summed in emitter order so the result is independent
        // of thread scheduling
        let mut photons = Array2::zeros(self.camera.config().shape().array_dim());
        for patch in &patches {
            patch.add_to(&mut photons);
        }
        photons += &self.background;
        for fiducial in &self.fiducials {
            fiducial.render_into(&mut photons, psf, stage_z);
        }

        let image = self
            .camera
            .digitize_with_seed(&photons, derive_seed(self.seed, NOISE_STREAM, index))?;

        let ground_truth = GroundTruth {
            emitting_count: patches.len(),
            on_count: self.fluorophores.iter().filter(|f| f.is_emitting()).count(),
            bleached_count: self.fluorophores.iter().filter(|f| f.is_bleached()).count(),
            total_photons: advances.iter().map(|a| a.photons).sum(),
            power,
            stage_z,
        };
        debug!(
            "Frame {}: {} emitting, {} bleached, {:.1} photons at power {}",
            index,
            ground_truth.emitting_count,
            ground_truth.bleached_count,
            ground_truth.total_photons,
            power
        );

        self.frame_index += 1;
        self.broadcast(index, &advances, ground_truth);

        if let Some(logger) = self.logger.as_mut() {
            if let Err(err) = logger.log_frame(index, &self.fluorophores) {
                warn!("Failed to log frame {index}: {err}");
            }
        }

        Ok(Frame {
            index,
            image,
            photons,
            ground_truth,
        })
    }

    fn broadcast(&self, frame: u64, advances: &[FrameAdvance], ground_truth: GroundTruth) {
        for (f, advance) in self.fluorophores.iter().zip(advances) {
            for transition in &advance.transitions {
                self.events.emit(&SimulationEvent::StateTransition {
                    frame,
                    transition: *transition,
                });
            }
            if advance.bleached_now {
                self.events.emit(&SimulationEvent::Bleached {
                    frame,
                    fluorophore_id: f.id(),
                });
            }
        }
        self.events.emit(&SimulationEvent::FrameCompleted {
            frame,
            ground_truth,
        });
    }

    /// Capture the state needed to resume the run
    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            frame_index: self.frame_index,
            power: self.laser.power(),
            stage_z: self.stage.z(),
            emitters: self.fluorophores.iter().map(EmitterSnapshot::from).collect(),
        }
    }

    /// Resume from a snapshot of a microscope built from the same configuration.
    ///
    /// Emitters are matched by position in the collection; nothing changes if
    /// any emitter disagrees.
    pub fn restore(&mut self, snapshot: &SimulationSnapshot) -> Result<(), GenerationError> {
        if snapshot.emitters.len() != self.fluorophores.len() {
            return Err(GenerationError::SnapshotMismatch(format!(
                "snapshot has {} emitters, microscope has {}",
                snapshot.emitters.len(),
                self.fluorophores.len()
            )));
        }
        for (slot, (f, saved)) in self.fluorophores.iter().zip(&snapshot.emitters).enumerate() {
            let p = f.position();
            if p.x != saved.x || p.y != saved.y || p.z != saved.z || f.signal() != saved.signal {
                return Err(GenerationError::SnapshotMismatch(format!(
                    "emitter {slot} differs from the snapshot"
                )));
            }
            if saved.state >= self.model.n_states() {
                return Err(GenerationError::SnapshotMismatch(format!(
                    "emitter {slot} has state {} outside {} states",
                    saved.state,
                    self.model.n_states()
                )));
            }
        }

        for (f, saved) in self.fluorophores.iter_mut().zip(&snapshot.emitters) {
            f.restore_state(&self.model, saved.state, saved.on_time, saved.off_time);
        }
        self.laser.set_power(snapshot.power);
        self.stage.set_z(snapshot.stage_z);
        self.frame_index = snapshot.frame_index;
        info!("Restored {} emitters at frame {}", self.fluorophores.len(), self.frame_index);
        Ok(())
    }
}
