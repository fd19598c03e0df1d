//! Optional image writer

use std::path::Path;

use tracing::debug;

use crate::capture::Frame;
use crate::error::{Error, Result};

/// Persists an RGBA frame to a file
pub trait FrameSaver {
    fn save_rgba(&self, data: &[u8], width: u32, height: u32, path: &Path) -> Result<()>;
}

/// Reject buffers that are not exactly `width * height * 4` bytes
pub fn check_rgba_len(data: &[u8], width: u32, height: u32) -> Result<()> {
    let expected = Frame::rgba_len(width, height);
    if data.len() != expected {
        return Err(Error::FrameSize {
            width,
            height,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Saves through the `image` crate; the file format follows the path extension.
#[cfg(feature = "image")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageSaver;

#[cfg(feature = "image")]
impl FrameSaver for ImageSaver {
    fn save_rgba(&self, data: &[u8], width: u32, height: u32, path: &Path) -> Result<()> {
        check_rgba_len(data, width, height)?;
        let image = image::RgbaImage::from_raw(width, height, data.to_vec()).ok_or(
            Error::FrameSize {
                width,
                height,
                expected: Frame::rgba_len(width, height),
                actual: data.len(),
            },
        )?;

        let image = image::DynamicImage::ImageRgba8(image);
        let format = image::ImageFormat::from_path(path)?;
        // JPEG has no alpha channel
        let image = if format == image::ImageFormat::Jpeg {
            image::DynamicImage::ImageRgb8(image.to_rgb8())
        } else {
            image
        };
        image.save_with_format(path, format)?;
        debug!("Wrote {}x{} {:?} to {}", width, height, format, path.display());
        Ok(())
    }
}

/// Resolve the saver once at startup. `None` when saving is disabled or the
/// `image` feature is off.
pub fn default_saver(enabled: bool) -> Option<Box<dyn FrameSaver>> {
    if !enabled {
        return None;
    }

    #[cfg(feature = "image")]
    {
        Some(Box::new(ImageSaver))
    }
    #[cfg(not(feature = "image"))]
    {
        tracing::warn!("Built without the image feature; frames will not be saved");
        None
    }
}
