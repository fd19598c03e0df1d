//! Frame-ready poll loop

use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::source::FrameSource;
use crate::error::{Error, Result};

/// How long and how often to poll for the first frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between attempts. Zero spins.
    pub interval: Duration,
    /// Give up after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    /// Spin until a frame arrives, however long it takes
    pub const UNBOUNDED_SPIN: PollPolicy = PollPolicy {
        interval: Duration::ZERO,
        timeout: None,
    };
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollConfig::default().policy()
    }
}

/// Serialized form of [`PollPolicy`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub interval_ms: u64,
    /// 0 waits forever
    pub timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5,
            timeout_ms: 10_000,
        }
    }
}

impl PollConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            timeout: (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms)),
        }
    }
}

/// Read `camera.rgba_bytes()` until it returns a non-empty buffer.
///
/// Always makes at least one attempt. Fails with [`Error::FrameTimeout`] only
/// when the policy has a timeout and it has elapsed.
#[instrument(skip(camera))]
pub fn wait_for_frame<C: FrameSource + ?Sized>(camera: &C, policy: &PollPolicy) -> Result<Bytes> {
    let started = Instant::now();
    let mut attempts: u64 = 0;

    loop {
        attempts += 1;
        if let Some(data) = camera.rgba_bytes().filter(|d| !d.is_empty()) {
            let waited = started.elapsed();
            metrics::counter!("frame_poll_attempts").increment(attempts);
            metrics::histogram!("frame_wait_ms").record(waited.as_secs_f64() * 1000.0);
            debug!(attempts, ?waited, bytes = data.len(), "first frame ready");
            return Ok(data);
        }

        if let Some(timeout) = policy.timeout {
            if started.elapsed() >= timeout {
                metrics::counter!("frame_poll_attempts").increment(attempts);
                debug!(attempts, "gave up waiting for a frame");
                return Err(Error::FrameTimeout(timeout));
            }
        }

        if policy.interval.is_zero() {
            std::hint::spin_loop();
        } else {
            thread::sleep(policy.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Returns `empties` empty reads, then a frame
    struct Delayed {
        empties: u32,
        reads: Cell<u32>,
        empty_vec: bool,
    }

    impl FrameSource for Delayed {
        fn start(&mut self) -> Result<()> {
            Ok(())
        }
        fn stop(&mut self) -> Result<()> {
            Ok(())
        }
        fn width(&self) -> u32 {
            1
        }
        fn height(&self) -> u32 {
            1
        }
        fn rgba_bytes(&self) -> Option<Bytes> {
            let n = self.reads.get();
            self.reads.set(n + 1);
            if n < self.empties {
                self.empty_vec.then(Bytes::new)
            } else {
                Some(Bytes::from_static(&[9, 9, 9, 9]))
            }
        }
    }

    #[test]
    fn never_gives_up_early() {
        for empties in [0, 1, 250] {
            let cam = Delayed {
                empties,
                reads: Cell::new(0),
                empty_vec: empties % 2 == 0,
            };
            let data = wait_for_frame(&cam, &PollPolicy::UNBOUNDED_SPIN).unwrap();
            assert_eq!(&data[..], &[9, 9, 9, 9]);
            assert_eq!(cam.reads.get(), empties + 1);
        }
    }

    #[test]
    fn times_out_when_no_frame() {
        let cam = Delayed {
            empties: u32::MAX,
            reads: Cell::new(0),
            empty_vec: false,
        };
        let policy = PollPolicy {
            interval: Duration::from_millis(1),
            timeout: Some(Duration::from_millis(20)),
        };
        let err = wait_for_frame(&cam, &policy).unwrap_err();
        assert!(matches!(err, Error::FrameTimeout(t) if t == Duration::from_millis(20)));
        assert!(cam.reads.get() >= 1);
    }

    #[test]
    fn zero_timeout_still_polls_once() {
        let cam = Delayed {
            empties: 0,
            reads: Cell::new(0),
            empty_vec: false,
        };
        let policy = PollPolicy {
            interval: Duration::ZERO,
            timeout: Some(Duration::ZERO),
        };
        assert!(wait_for_frame(&cam, &policy).is_ok());
        assert_eq!(cam.reads.get(), 1);
    }

    #[test]
    fn config_zero_timeout_means_forever() {
        let config = PollConfig {
            interval_ms: 2,
            timeout_ms: 0,
        };
        let policy = config.policy();
        assert_eq!(policy.interval, Duration::from_millis(2));
        assert_eq!(policy.timeout, None);
        assert_eq!(
            PollPolicy::default().timeout,
            Some(Duration::from_secs(10))
        );
    }
}
