pub mod decoder;
pub mod frame;
pub mod poll;
pub mod source;
pub mod stream;
#[cfg(target_os = "linux")]
pub mod v4l2;

pub use frame::Frame;
pub use frame::PixelFormat;
pub use poll::{wait_for_frame, PollPolicy};
pub use source::{Acquisition, FrameSource};
#[cfg(target_os = "linux")]
pub use v4l2::V4l2Camera;
