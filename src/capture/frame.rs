use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Frame data with zero-copy semantics
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

impl Frame {
    /// Wrap a packed RGBA buffer
    pub fn rgba(data: Bytes, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data,
            meta: Arc::new(FrameMetadata {
                sequence,
                width,
                height,
                stride: width * 4,
                format: PixelFormat::Rgba,
                device_timestamp: None,
            }),
            timestamp: Instant::now(),
        }
    }

    /// Expected byte length of a packed RGBA frame
    pub fn rgba_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgba,
    Rgb24,
    Bgr24,
    Yuyv4,
    Mjpeg,
    Nv12,
    I420,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 7] = [
        PixelFormat::Rgba,
        PixelFormat::Rgb24,
        PixelFormat::Bgr24,
        PixelFormat::Yuyv4,
        PixelFormat::Mjpeg,
        PixelFormat::Nv12,
        PixelFormat::I420,
    ];

    /// V4L2 four-character code
    pub fn fourcc(self) -> [u8; 4] {
        match self {
            PixelFormat::Rgba => *b"AB24",
            PixelFormat::Rgb24 => *b"RGB3",
            PixelFormat::Bgr24 => *b"BGR3",
            PixelFormat::Yuyv4 => *b"YUYV",
            PixelFormat::Mjpeg => *b"MJPG",
            PixelFormat::Nv12 => *b"NV12",
            PixelFormat::I420 => *b"YU12",
        }
    }

    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        Self::ALL.into_iter().find(|f| &f.fourcc() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Rgba => "rgba",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Yuyv4 => "yuyv4",
            PixelFormat::Mjpeg => "mjpeg",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::I420 => "i420",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.name() == lower)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|f| f.name()).collect();
                format!("unknown pixel format '{}' (expected one of {})", s, names.join(", "))
            })
    }
}
