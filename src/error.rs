//! Crate-wide error type

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("camera {0} not found")]
    DeviceNotFound(usize),

    #[error("permission denied opening camera {0}")]
    PermissionDenied(usize),

    #[error("{0} does not support video capture")]
    NotCaptureDevice(String),

    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("camera is already started")]
    AlreadyStarted,

    #[error("no frame received within {0:?}")]
    FrameTimeout(Duration),

    #[error("frame is {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("failed to decode frame: {0}")]
    Decode(String),

    #[cfg(feature = "image")]
    #[error("failed to save image: {0}")]
    Image(#[from] image::ImageError),

    #[error("refusing to overwrite {0}")]
    OutputCollision(PathBuf),

    #[error("capture thread panicked")]
    ThreadPanicked,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Classify an I/O failure from opening a camera node.
    pub(crate) fn from_open(index: usize, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::DeviceNotFound(index),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(index),
            _ => Error::Io(err),
        }
    }
}
