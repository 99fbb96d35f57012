// src/export/mod.rs

pub mod readback;
pub mod sink;
pub mod worker;

pub use readback::FrameReadback;
pub use sink::{ffmpeg_args, FfmpegSink, FrameSink, ImageSequenceSink};
pub use worker::FrameExporter;

use std::fmt;

/// Failures while writing frames out
#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
    /// The encoder process could not be started
    Spawn {
        program: String,
        source: std::io::Error,
    },
    Image(image::ImageError),
    /// A frame buffer did not hold `width * height * 4` bytes
    FrameSize { expected: usize, actual: usize },
    /// The encoder exited with a failure status
    Encoder(std::process::ExitStatus),
    /// The writer thread is gone
    WorkerGone,
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "frame write failed: {}", e),
            ExportError::Spawn { program, source } => {
                write!(f, "could not start '{}': {}", program, source)
            }
            ExportError::Image(e) => write!(f, "could not write image: {}", e),
            ExportError::FrameSize { expected, actual } => {
                write!(f, "frame has {} bytes, expected {}", actual, expected)
            }
            ExportError::Encoder(status) => write!(f, "encoder exited with {}", status),
            ExportError::WorkerGone => write!(f, "export worker stopped unexpectedly"),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io(e) => Some(e),
            ExportError::Spawn { source, .. } => Some(source),
            ExportError::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(value: std::io::Error) -> Self {
        ExportError::Io(value)
    }
}

impl From<image::ImageError> for ExportError {
    fn from(value: image::ImageError) -> Self {
        ExportError::Image(value)
    }
}
