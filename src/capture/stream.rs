//! Dequeue, convert and publish loop shared by streaming backends

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{error, trace, warn};

use super::decoder;
use super::frame::{Frame, FrameMetadata, PixelFormat};

const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Negotiated capture layout
#[derive(Debug, Clone, Copy)]
pub struct StreamLayout {
    pub width: u32,
    pub height: u32,
    /// Bytes per line of the source buffer; 0 when tightly packed
    pub stride: u32,
    pub format: PixelFormat,
}

/// One dequeued driver buffer
pub struct RawFrame<'a> {
    /// Only the bytes the driver filled
    pub data: &'a [u8],
    pub sequence: u32,
    pub device_timestamp: Option<Duration>,
    /// Driver flagged the buffer as corrupted or incomplete
    pub corrupted: bool,
}

/// Source of raw buffers. `next_raw` must return within a bounded time,
/// with `io::ErrorKind::TimedOut` when no buffer arrived.
pub trait RawStream {
    fn next_raw(&mut self) -> io::Result<RawFrame<'_>>;
}

/// Pull buffers until `stop` is set, publishing each one that converts cleanly.
pub fn run_stream<S, F>(stream: &mut S, layout: StreamLayout, stop: &AtomicBool, mut publish: F)
where
    S: RawStream + ?Sized,
    F: FnMut(Frame),
{
    let mut sequence: u64 = 0;
    while !stop.load(Ordering::Acquire) {
        let raw = match stream.next_raw() {
            Ok(raw) => raw,
            // No buffer yet; recheck the stop flag
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                trace!("No buffer within dequeue timeout");
                continue;
            }
            Err(e) => {
                error!("Capture error: {}", e);
                thread::sleep(RETRY_DELAY);
                continue;
            }
        };

        if raw.corrupted {
            warn!("Dropping frame {}: driver flagged an error", raw.sequence);
            metrics::counter!("dropped_frames").increment(1);
            continue;
        }

        let rgba = match decoder::to_rgba(
            raw.data,
            layout.format,
            layout.width,
            layout.height,
            layout.stride as usize,
        ) {
            Ok(rgba) => rgba,
            Err(e) => {
                // Skip this frame and try the next one
                warn!("Dropping frame {}: {}", raw.sequence, e);
                metrics::counter!("dropped_frames").increment(1);
                continue;
            }
        };

        sequence += 1;
        publish(Frame {
            data: Bytes::from(rgba),
            meta: Arc::new(FrameMetadata {
                sequence,
                width: layout.width,
                height: layout.height,
                stride: layout.width * 4,
                format: PixelFormat::Rgba,
                device_timestamp: raw.device_timestamp,
            }),
            timestamp: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::mpsc;

    enum Step {
        Frame { data: Vec<u8>, corrupted: bool },
        TimedOut,
        Failed,
    }

    /// Replays `steps`, then stalls with timeouts like an idle device
    struct Scripted {
        steps: VecDeque<Step>,
        current: Vec<u8>,
        calls: u32,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
                current: Vec::new(),
                calls: 0,
            }
        }
    }

    impl RawStream for Scripted {
        fn next_raw(&mut self) -> io::Result<RawFrame<'_>> {
            self.calls += 1;
            match self.steps.pop_front() {
                Some(Step::Frame { data, corrupted }) => {
                    self.current = data;
                    Ok(RawFrame {
                        data: &self.current,
                        sequence: self.calls,
                        device_timestamp: Some(Duration::from_millis(self.calls as u64)),
                        corrupted,
                    })
                }
                Some(Step::Failed) => Err(io::Error::other("device error")),
                Some(Step::TimedOut) | None => {
                    thread::sleep(Duration::from_millis(2));
                    Err(io::Error::from(io::ErrorKind::TimedOut))
                }
            }
        }
    }

    const LAYOUT: StreamLayout = StreamLayout {
        width: 2,
        height: 1,
        stride: 0,
        format: PixelFormat::Rgb24,
    };

    #[test]
    fn stops_while_stalled() {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();

        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let mut stream = Scripted::new(vec![]);
            run_stream(&mut stream, LAYOUT, &thread_stop, |_| {});
            let _ = done_tx.send(());
            stream.calls
        });

        thread::sleep(Duration::from_millis(30));
        assert!(done_rx.try_recv().is_err(), "loop exited before stop");
        stop.store(true, Ordering::Release);
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("loop did not observe stop while stalled");
        assert!(handle.join().unwrap() > 1);
    }

    #[test]
    fn drops_short_and_flagged_buffers() {
        let good = vec![1, 2, 3, 4, 5, 6];
        let mut stream = Scripted::new(vec![
            Step::Frame {
                data: vec![1, 2, 3],
                corrupted: false,
            },
            Step::Frame {
                data: good.clone(),
                corrupted: true,
            },
            Step::Failed,
            Step::TimedOut,
            Step::Frame {
                data: good,
                corrupted: false,
            },
        ]);

        let stop = AtomicBool::new(false);
        let mut frames = Vec::new();
        run_stream(&mut stream, LAYOUT, &stop, |frame| {
            frames.push(frame);
            stop.store(true, Ordering::Release);
        });

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(&frame.data[..], &[1, 2, 3, 255, 4, 5, 6, 255]);
        assert_eq!(frame.meta.sequence, 1);
        assert_eq!(frame.meta.device_timestamp, Some(Duration::from_millis(5)));
        assert_eq!(stream.calls, 5);
    }
}
