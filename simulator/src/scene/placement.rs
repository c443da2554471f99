//! Emitter placement generators.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::PixelShape;

use crate::error::{require_positive, ConfigError};
use crate::photophysics::Position;

/// Where emitters go, tagged by `kind` in JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlacementConfig {
    /// Uniform over the frame in the focal plane
    Random { count: usize },
    /// Uniform over the frame, `z` uniform in `[z_min, z_max]` µm
    #[serde(rename = "random_3d")]
    Random3D { count: usize, z_min: f64, z_max: f64 },
    /// Regular lattice with `spacing` pixels between emitters
    Grid { spacing: f64 },
    /// CSV file with `x,y` or `x,y,z` rows
    File { path: PathBuf },
}

impl Default for PlacementConfig {
    fn default() -> Self {
        PlacementConfig::Random { count: 100 }
    }
}

impl PlacementConfig {
    /// Generate positions for a frame of the given shape
    pub fn positions<R: Rng + ?Sized>(
        &self,
        shape: PixelShape,
        rng: &mut R,
    ) -> Result<Vec<Position>, ConfigError> {
        match self {
            PlacementConfig::Random { count } => Ok(random_positions(*count, shape, 0.0, 0.0, rng)),
            PlacementConfig::Random3D { count, z_min, z_max } => {
                if !z_min.is_finite() || !z_max.is_finite() || z_min > z_max {
                    return Err(ConfigError::Invalid(format!(
                        "invalid axial range [{z_min}, {z_max}]"
                    )));
                }
                Ok(random_positions(*count, shape, *z_min, *z_max, rng))
            }
            PlacementConfig::Grid { spacing } => grid_positions(shape, *spacing),
            PlacementConfig::File { path } => read_positions_csv(path),
        }
    }
}

/// Uniform positions over the full pixel area of the frame
pub fn random_positions<R: Rng + ?Sized>(
    count: usize,
    shape: PixelShape,
    z_min: f64,
    z_max: f64,
    rng: &mut R,
) -> Vec<Position> {
    let width = shape.width as f64;
    let height = shape.height as f64;
    (0..count)
        .map(|_| {
            let x = rng.gen::<f64>() * width - 0.5;
            let y = rng.gen::<f64>() * height - 0.5;
            let z = if z_max > z_min {
                rng.gen_range(z_min..z_max)
            } else {
                z_min
            };
            Position::with_z(x, y, z)
        })
        .collect()
}

/// Lattice with the first emitter half a spacing in from the frame corner
pub fn grid_positions(shape: PixelShape, spacing: f64) -> Result<Vec<Position>, ConfigError> {
    require_positive("spacing", spacing)?;
    let axis = |extent: usize| -> Vec<f64> {
        (0..)
            .map(|k| -0.5 + spacing * (k as f64 + 0.5))
            .take_while(|&v| v < extent as f64 - 0.5)
            .collect()
    };
    let xs = axis(shape.width);
    let ys = axis(shape.height);
    Ok(ys
        .iter()
        .flat_map(|&y| xs.iter().map(move |&x| Position::new(x, y)))
        .collect())
}

/// One row of a positions file; `z` defaults to the focal plane
#[derive(Debug, Deserialize)]
struct PositionRow {
    x: f64,
    y: f64,
    #[serde(default)]
    z: f64,
}

/// Read positions from a CSV file
pub fn read_positions_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Position>, ConfigError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let positions = parse_positions_csv(file, &path.display().to_string())?;
    debug!("Loaded {} positions from {}", positions.len(), path.display());
    Ok(positions)
}

/// Parse `x,y[,z]` rows. Blank lines and `#` comments are skipped, as is a
/// non-numeric header before the first row.
pub fn parse_positions_csv<R: Read>(reader: R, source: &str) -> Result<Vec<Position>, ConfigError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut positions = Vec::new();
    let mut header_allowed = true;
    for record in reader.records() {
        let record = record.map_err(|err| ConfigError::Invalid(format!("{source}: {err}")))?;
        let line = record.position().map_or(0, |p| p.line());
        if !(2..=3).contains(&record.len()) {
            return Err(ConfigError::Invalid(format!(
                "{source}:{line}: expected 2 or 3 columns, found {}",
                record.len()
            )));
        }

        let row: PositionRow = match record.deserialize(None) {
            Ok(row) => row,
            Err(_) if header_allowed => {
                header_allowed = false;
                continue;
            }
            Err(err) => return Err(ConfigError::Invalid(format!("{source}:{line}: {err}"))),
        };
        header_allowed = false;

        if !row.x.is_finite() || !row.y.is_finite() || !row.z.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "{source}:{line}: non-finite coordinate"
            )));
        }
        positions.push(Position::with_z(row.x, row.y, row.z));
    }
    Ok(positions)
}
