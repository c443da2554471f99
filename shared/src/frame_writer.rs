//! Multi-page TIFF stack writer running on a background worker thread.
//!
//! Digitized frames are handed over through a bounded channel; the
//! producer only waits when the queue is full. The worker owns the encoder and
//! appends one 16-bit grey page per frame; the first failure is kept and
//! reported when the stack is finished. Failures are never retried here.

use crossbeam_channel::{bounded, Sender, TrySendError};
use log::{debug, info, warn};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use thiserror::Error;
use tiff::encoder::{colortype, TiffEncoder};

/// Errors raised while serializing frames
#[derive(Error, Debug)]
pub enum FrameWriteError {
    /// Creating or flushing the output file failed
    #[error("I/O error writing {path}: {source}")]
    Io {
        /// Output path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The TIFF encoder rejected a page
    #[error("TIFF encoding failed for page {page}: {source}")]
    Encode {
        /// Zero-based page index
        page: usize,
        /// Underlying error
        #[source]
        source: tiff::TiffError,
    },

    /// The frame has a different shape than the first page of the stack
    #[error("frame shape {actual:?} does not match stack shape {expected:?}")]
    ShapeMismatch {
        /// (height, width) of the stack
        expected: (usize, usize),
        /// (height, width) of the rejected frame
        actual: (usize, usize),
    },

    /// The bounded queue is full
    #[error("frame writer queue full")]
    QueueFull,

    /// The worker has stopped accepting frames
    #[error("frame writer worker has shut down")]
    Disconnected,

    /// The worker thread panicked
    #[error("frame writer worker panicked")]
    WorkerPanicked,
}

/// Handle to a background multi-page TIFF writer
pub struct TiffStackWriter {
    sender: Option<Sender<Array2<u16>>>,
    worker: Option<JoinHandle<Result<usize, FrameWriteError>>>,
    shape: Option<(usize, usize)>,
    path: PathBuf,
}

impl TiffStackWriter {
    /// Create the output file and start the worker.
    ///
    /// # Arguments
    /// * `path` - Output `.tif` file, parent directories are created
    /// * `buffer_size` - Number of frames that may be queued before `write_frame` blocks
    pub fn create<P: AsRef<Path>>(path: P, buffer_size: usize) -> Result<Self, FrameWriteError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| FrameWriteError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = File::create(&path).map_err(|source| FrameWriteError::Io {
            path: path.clone(),
            source,
        })?;

        let (sender, receiver) = bounded::<Array2<u16>>(buffer_size.max(1));
        let worker_path = path.clone();

        let worker = std::thread::spawn(move || {
            info!("TIFF stack writer started for {}", worker_path.display());
            let mut writer = BufWriter::new(file);
            let mut pages = 0usize;
            {
                let mut encoder =
                    TiffEncoder::new(&mut writer).map_err(|source| FrameWriteError::Encode {
                        page: 0,
                        source,
                    })?;
                while let Ok(frame) = receiver.recv() {
                    let (height, width) = frame.dim();
                    let data: Vec<u16> = frame.iter().copied().collect();
                    encoder
                        .write_image::<colortype::Gray16>(width as u32, height as u32, &data)
                        .map_err(|source| FrameWriteError::Encode {
                            page: pages,
                            source,
                        })?;
                    pages += 1;
                    debug!("Wrote page {} to {}", pages, worker_path.display());
                }
            }
            writer.flush().map_err(|source| FrameWriteError::Io {
                path: worker_path.clone(),
                source,
            })?;
            info!(
                "TIFF stack writer finished {} ({} pages)",
                worker_path.display(),
                pages
            );
            Ok(pages)
        });

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            shape: None,
            path,
        })
    }

    /// Output path of the stack
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a frame as the next page of the stack.
    ///
    /// Blocks while the queue is full. All pages must share the shape of
    /// the first one.
    pub fn write_frame(&mut self, frame: &Array2<u16>) -> Result<(), FrameWriteError> {
        self.check_shape(frame)?;
        let sender = self.sender.as_ref().ok_or(FrameWriteError::Disconnected)?;
        sender
            .send(frame.clone())
            .map_err(|_| FrameWriteError::Disconnected)?;
        self.shape = Some(frame.dim());
        Ok(())
    }

    /// Queue a frame without waiting; fails with `QueueFull` if the worker
    /// is behind. The frame is not written in that case.
    pub fn try_write_frame(&mut self, frame: &Array2<u16>) -> Result<(), FrameWriteError> {
        self.check_shape(frame)?;
        let sender = self.sender.as_ref().ok_or(FrameWriteError::Disconnected)?;
        match sender.try_send(frame.clone()) {
            Ok(()) => {
                self.shape = Some(frame.dim());
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(FrameWriteError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(FrameWriteError::Disconnected),
        }
    }

    fn check_shape(&self, frame: &Array2<u16>) -> Result<(), FrameWriteError> {
        match self.shape {
            Some(expected) if expected != frame.dim() => Err(FrameWriteError::ShapeMismatch {
                expected,
                actual: frame.dim(),
            }),
            _ => Ok(()),
        }
    }

    /// Close the queue, wait for the worker and return the number of pages written.
    pub fn finish(mut self) -> Result<usize, FrameWriteError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<usize, FrameWriteError> {
        drop(self.sender.take());
        match self.worker.take() {
            Some(handle) => handle.join().map_err(|_| FrameWriteError::WorkerPanicked)?,
            None => Ok(0),
        }
    }
}

impl Drop for TiffStackWriter {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.shutdown() {
                warn!("TIFF stack {} closed with error: {e}", self.path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;
    use tempfile::TempDir;
    use tiff::decoder::{Decoder, DecodingResult};

    #[test]
    fn test_multi_page_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack").join("frames.tif");

        let frames: Vec<Array2<u16>> = (0..3)
            .map(|i| Array2::from_shape_fn((4, 6), |(y, x)| (i * 100 + y * 6 + x) as u16))
            .collect();

        let mut writer = TiffStackWriter::create(&path, 8).unwrap();
        for frame in &frames {
            writer.write_frame(frame).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), 3);

        let mut decoder = Decoder::new(BufReader::new(File::open(&path).unwrap())).unwrap();
        for (page, expected) in frames.iter().enumerate() {
            assert_eq!(decoder.dimensions().unwrap(), (6, 4));
            match decoder.read_image().unwrap() {
                DecodingResult::U16(data) => {
                    let got: Vec<u16> = expected.iter().copied().collect();
                    assert_eq!(data, got, "page {page}");
                }
                other => panic!("unexpected pixel type {:?}", std::mem::discriminant(&other)),
            }
            if page + 1 < frames.len() {
                decoder.next_image().unwrap();
            }
        }
        assert!(!decoder.more_images());
    }

    #[test]
    fn test_fast_producer_keeps_every_frame() {
        let dir = TempDir::new().unwrap();
        let mut writer = TiffStackWriter::create(dir.path().join("burst.tif"), 1).unwrap();
        let frame = Array2::from_elem((256, 256), 7u16);
        for _ in 0..200 {
            writer.write_frame(&frame).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), 200);
    }

    #[test]
    fn test_try_write_reports_full_queue() {
        let dir = TempDir::new().unwrap();
        let mut writer = TiffStackWriter::create(dir.path().join("try.tif"), 1).unwrap();
        let frame = Array2::from_elem((512, 512), 3u16);
        let mut accepted = 0;
        for _ in 0..50 {
            match writer.try_write_frame(&frame) {
                Ok(()) => accepted += 1,
                Err(FrameWriteError::QueueFull) => {}
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert!(accepted >= 1);
        assert_eq!(writer.finish().unwrap(), accepted);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let mut writer = TiffStackWriter::create(dir.path().join("s.tif"), 4).unwrap();
        writer.write_frame(&Array2::zeros((2, 2))).unwrap();
        let err = writer.write_frame(&Array2::zeros((3, 2))).unwrap_err();
        assert!(matches!(err, FrameWriteError::ShapeMismatch { .. }));
        assert_eq!(writer.finish().unwrap(), 1);
    }
}
