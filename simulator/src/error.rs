use shared::image_proc::RasterError;
use shared::FrameWriteError;
use thiserror::Error;

/// Invalid configuration, detected when an object is constructed.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A rate coefficient is negative or not finite.
    #[error("invalid rate coefficient {value} for transition {from} -> {to}")]
    InvalidRate {
        /// Source state
        from: usize,
        /// Target state
        to: usize,
        /// Offending coefficient
        value: f64,
    },

    /// A transition references a state outside the table.
    #[error("state index {index} out of range for {states} states")]
    StateOutOfRange {
        /// Offending index
        index: usize,
        /// Number of states in the model
        states: usize,
    },

    /// A state was given a transition to itself.
    #[error("self transition on state {0} is not allowed")]
    SelfTransition(usize),

    /// Instantaneous transitions form a loop that would never advance time.
    #[error("instantaneous transitions form a cycle through state {0}")]
    InstantaneousCycle(usize),

    /// A lifetime or required rate is zero, negative or not finite.
    #[error("{name} must be positive and finite, got {value}")]
    NonPositive {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// A magnitude (signal, background level, ...) is negative.
    #[error("{name} must not be negative, got {value}")]
    Negative {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// A parameter is outside its allowed interval.
    #[error("{name} = {value} outside [{min}, {max}]")]
    OutOfRange {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: f64,
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },

    /// A background image does not cover the frame.
    #[error("background image {actual_width}x{actual_height} smaller than frame {width}x{height}")]
    BackgroundTooSmall {
        /// Frame width
        width: usize,
        /// Frame height
        height: usize,
        /// Image width
        actual_width: usize,
        /// Image height
        actual_height: usize,
    },

    /// A raster input could not be read.
    #[error(transparent)]
    Raster(#[from] RasterError),

    /// A configuration or placement file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// Free-form validation failure.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Image dimensions disagree with the camera.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("image shape {actual_width}x{actual_height} does not match camera {width}x{height}")]
pub struct ShapeError {
    /// Camera width
    pub width: usize,
    /// Camera height
    pub height: usize,
    /// Supplied image width
    pub actual_width: usize,
    /// Supplied image height
    pub actual_height: usize,
}

/// A frame could not be produced or handed to the transport.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Image dimensions did not match the camera.
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// Serializing the frame failed.
    #[error("frame serialization failed: {0}")]
    Serialize(#[from] FrameWriteError),

    /// A snapshot does not describe the current emitter collection.
    #[error("snapshot mismatch: {0}")]
    SnapshotMismatch(String),
}

/// Top-level error for simulation setup and execution.
#[derive(Error, Debug)]
pub enum SimulationError {
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Frame generation failure
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl From<ShapeError> for SimulationError {
    fn from(err: ShapeError) -> Self {
        SimulationError::Generation(GenerationError::Shape(err))
    }
}

/// Check that `value` is finite and strictly positive.
pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

/// Check that `value` is finite and not negative.
pub(crate) fn require_non_negative(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::Negative { name, value })
    }
}
