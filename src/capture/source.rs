//! Camera handle abstraction and scoped start/stop

use bytes::Bytes;
use tracing::{debug, warn};

use super::poll::{wait_for_frame, PollPolicy};
use crate::error::Result;

/// A camera that delivers RGBA frames once started.
pub trait FrameSource {
    /// Begin frame acquisition
    fn start(&mut self) -> Result<()>;

    /// End frame acquisition
    fn stop(&mut self) -> Result<()>;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Most recent RGBA frame, or `None` until the first frame arrives.
    /// An empty buffer is treated the same as `None`.
    fn rgba_bytes(&self) -> Option<Bytes>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn width(&self) -> u32 {
        (**self).width()
    }

    fn height(&self) -> u32 {
        (**self).height()
    }

    fn rgba_bytes(&self) -> Option<Bytes> {
        (**self).rgba_bytes()
    }
}

/// Started camera. Stops it exactly once, either through [`finish`] or on drop.
///
/// [`finish`]: Acquisition::finish
pub struct Acquisition<'a, C: FrameSource + ?Sized> {
    camera: &'a mut C,
    stopped: bool,
}

impl<'a, C: FrameSource + ?Sized> Acquisition<'a, C> {
    pub fn start(camera: &'a mut C) -> Result<Self> {
        camera.start()?;
        debug!("acquisition started");
        Ok(Self {
            camera,
            stopped: false,
        })
    }

    pub fn camera(&self) -> &C {
        self.camera
    }

    /// Block until the camera has a frame, per `policy`
    pub fn wait_for_frame(&self, policy: &PollPolicy) -> Result<Bytes> {
        wait_for_frame(&*self.camera, policy)
    }

    /// Stop the camera and report the result
    pub fn finish(mut self) -> Result<()> {
        self.stopped = true;
        self.camera.stop()?;
        debug!("acquisition stopped");
        Ok(())
    }
}

impl<C: FrameSource + ?Sized> Drop for Acquisition<'_, C> {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Err(e) = self.camera.stop() {
            warn!("Failed to stop camera: {}", e);
        } else {
            debug!("acquisition stopped on early exit");
        }
    }
}
