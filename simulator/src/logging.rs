//! Ground-truth CSV logging of emitter states.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::photophysics::Fluorophore;

/// Column names written as the first line of every log
pub const HEADER: &str = "frame,id,x,y,z,state,emitting,photons,on_time";

const COLUMNS: [&str; 9] = [
    "frame", "id", "x", "y", "z", "state", "emitting", "photons", "on_time",
];

/// Writes one row per emitter per frame
pub struct StateLogger {
    writer: Option<csv::Writer<Box<dyn Write + Send>>>,
    path: Option<PathBuf>,
    rows: usize,
}

impl std::fmt::Debug for StateLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateLogger")
            .field("path", &self.path)
            .field("rows", &self.rows)
            .finish()
    }
}

impl StateLogger {
    /// Create (or truncate) a CSV file and write the header
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        let mut logger = Self::from_writer(file)?;
        logger.path = Some(path.to_path_buf());
        info!("Logging emitter states to {}", path.display());
        Ok(logger)
    }

    /// Log into any writer
    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> io::Result<Self> {
        let boxed: Box<dyn Write + Send> = Box::new(writer);
        let mut writer = csv::Writer::from_writer(boxed);
        writer.write_record(COLUMNS)?;
        Ok(Self {
            writer: Some(writer),
            path: None,
            rows: 0,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Data rows written so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Append the state of every emitter after `frame`
    pub fn log_frame(&mut self, frame: u64, fluorophores: &[Fluorophore]) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "state logger is closed"))?;
        for f in fluorophores {
            let p = f.position();
            writer.write_record(&[
                frame.to_string(),
                f.id().to_string(),
                format!("{:.4}", p.x),
                format!("{:.4}", p.y),
                format!("{:.4}", p.z),
                f.state().to_string(),
                u8::from(f.is_emitting()).to_string(),
                format!("{:.3}", f.last_photons()),
                format!("{:.6}", f.total_emitting_time()),
            ])?;
        }
        self.rows += fluorophores.len();
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    /// Flush and release the underlying writer. Returns the number of rows.
    pub fn close(mut self) -> io::Result<usize> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(self.rows)
    }
}

impl Drop for StateLogger {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.flush() {
                warn!("Failed to flush state log on drop: {err}");
            }
        }
    }
}
