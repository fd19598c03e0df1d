//! V4L2 camera with a background acquisition thread

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use tracing::{debug, error, info, instrument, warn};
use v4l::buffer::{Flags as BufFlags, Type};
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::frame::{Frame, PixelFormat};
use crate::capture::stream::{run_stream, RawFrame, RawStream, StreamLayout};
use crate::capture::source::FrameSource;
use crate::error::{Error, Result};

const BUFFER_COUNT: u32 = 4;
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// Formats tried, in order, when none is requested
const PREFERRED_FORMATS: [PixelFormat; 3] =
    [PixelFormat::Yuyv4, PixelFormat::Mjpeg, PixelFormat::Rgb24];

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Device>,
}

/// V4L2 camera handle
pub struct V4l2Camera {
    index: usize,
    device: Option<Device>,
    negotiated: StreamLayout,
    latest: Arc<ArcSwapOption<Frame>>,
    worker: Option<Worker>,
}

impl V4l2Camera {
    /// Open `/dev/video{index}` and negotiate the closest format to `width`x`height`.
    #[instrument]
    pub fn open(
        index: usize,
        width: u32,
        height: u32,
        format: Option<PixelFormat>,
    ) -> Result<Self> {
        let device = Device::new(index).map_err(|e| Error::from_open(index, e))?;

        // Query capabilities
        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(Error::NotCaptureDevice(format!("/dev/video{}", index)));
        }

        let negotiated = negotiate(&device, width, height, format)?;
        if (negotiated.width, negotiated.height) != (width, height) {
            warn!(
                "Requested {}x{}, driver chose {}x{}",
                width, height, negotiated.width, negotiated.height
            );
        }
        info!(
            "StreamLayout {}x{} {}",
            negotiated.width, negotiated.height, negotiated.format
        );

        Ok(Self {
            index,
            device: Some(device),
            negotiated,
            latest: Arc::new(ArcSwapOption::empty()),
            worker: None,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Pixel format the device delivers before RGBA conversion
    pub fn source_format(&self) -> PixelFormat {
        self.negotiated.format
    }

    /// Most recent frame with metadata
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.latest.load_full()
    }

    pub fn is_started(&self) -> bool {
        self.worker.is_some()
    }
}

impl FrameSource for V4l2Camera {
    /// Spawn the acquisition thread with memory-mapped buffers
    #[instrument(skip(self), fields(index = self.index))]
    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::AlreadyStarted);
        }
        // Only missing if an earlier acquisition thread panicked
        let device = self.device.take().ok_or(Error::ThreadPanicked)?;

        self.latest.store(None);
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = flume::bounded::<Result<()>>(1);

        let latest = Arc::clone(&self.latest);
        let thread_stop = Arc::clone(&stop);
        let negotiated = self.negotiated;
        let handle = thread::Builder::new()
            .name(format!("alcam-capture-{}", self.index))
            .spawn(move || capture_loop(device, negotiated, latest, thread_stop, ready_tx))?;

        // Startup errors come back over the channel; a disconnect means the thread died
        let status = ready_rx.recv().unwrap_or(Err(Error::ThreadPanicked));
        if let Err(e) = status {
            // Recover the device so the handle can be started again
            if let Ok(device) = handle.join() {
                self.device = Some(device);
            }
            return Err(e);
        }

        self.worker = Some(Worker { stop, handle });
        info!("Capture stream started with {} buffers", BUFFER_COUNT);
        Ok(())
    }

    #[instrument(skip(self), fields(index = self.index))]
    fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        worker.stop.store(true, Ordering::Release);
        let device = worker.handle.join().map_err(|_| Error::ThreadPanicked)?;
        self.device = Some(device);
        info!("Capture stream stopped");
        Ok(())
    }

    fn width(&self) -> u32 {
        self.negotiated.width
    }

    fn height(&self) -> u32 {
        self.negotiated.height
    }

    fn rgba_bytes(&self) -> Option<Bytes> {
        self.latest.load_full().map(|frame| frame.data.clone())
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop camera {}: {}", self.index, e);
        }
    }
}

fn negotiate(
    device: &Device,
    width: u32,
    height: u32,
    requested: Option<PixelFormat>,
) -> Result<StreamLayout> {
    let candidates: Vec<PixelFormat> = match requested {
        Some(format) => vec![format],
        None => PREFERRED_FORMATS.to_vec(),
    };

    for format in candidates {
        let fourcc = FourCC::new(&format.fourcc());

        // Set format
        let mut fmt = device.format()?;
        fmt.width = width;
        fmt.height = height;
        fmt.fourcc = fourcc;
        let actual = device.set_format(&fmt)?;

        if actual.fourcc == fourcc {
            return Ok(StreamLayout {
                width: actual.width,
                height: actual.height,
                stride: actual.stride,
                format,
            });
        }
        debug!("Driver rejected {} (offered {})", format, actual.fourcc);
    }

    Err(Error::UnsupportedFormat(match requested {
        Some(format) => format.to_string(),
        None => "device offers none of yuyv4, mjpeg, rgb24".into(),
    }))
}

/// Mmap stream that returns only the bytes the driver filled
struct V4l2Stream(MmapStream<'static>);

impl RawStream for V4l2Stream {
    fn next_raw(&mut self) -> io::Result<RawFrame<'_>> {
        let (buf, meta) = self.0.next()?;
        let used = (meta.bytesused as usize).min(buf.len());
        Ok(RawFrame {
            data: &buf[..used],
            sequence: meta.sequence,
            device_timestamp: Some(
                Duration::from_secs(meta.timestamp.sec as u64)
                    + Duration::from_micros(meta.timestamp.usec as u64),
            ),
            corrupted: meta.flags.contains(BufFlags::ERROR),
        })
    }
}

fn capture_loop(
    device: Device,
    layout: StreamLayout,
    latest: Arc<ArcSwapOption<Frame>>,
    stop: Arc<AtomicBool>,
    ready: flume::Sender<Result<()>>,
) -> Device {
    // Request buffers
    let mut stream = match MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return device;
        }
    };
    // Bounded dequeue so a silent device cannot block stop()
    stream.set_timeout(DEQUEUE_TIMEOUT);
    let _ = ready.send(Ok(()));

    let mut stream = V4l2Stream(stream);
    run_stream(&mut stream, layout, &stop, |frame| {
        latest.store(Some(Arc::new(frame)));
    });

    drop(stream);
    device
}
