use std::fmt;
use std::path::Path;

use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device};

use crate::capture::frame::PixelFormat;

/// Highest `/dev/videoN` index scanned
pub const MAX_DEVICES: usize = 64;

// Detected capture device info
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub path: String,
    pub card: String,
    pub driver: String,
    /// Formats the device offers that we can convert to RGBA
    pub formats: Vec<PixelFormat>,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formats: Vec<_> = self.formats.iter().map(|p| p.name()).collect();
        write!(
            f,
            "[{}] {} ({}, {}) formats: {}",
            self.index,
            self.card,
            self.driver,
            self.path,
            if formats.is_empty() {
                "none supported".to_string()
            } else {
                formats.join(", ")
            }
        )
    }
}

/// List capture devices
pub fn list_devices() -> Vec<DeviceInfo> {
    info!("Scanning capture devices...");

    let mut found = Vec::new();
    for index in 0..MAX_DEVICES {
        let path = format!("/dev/video{}", index);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::new(index) else {
            debug!("Cannot open {}", path);
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        // Metadata nodes show up as extra /dev/video entries
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }

        let formats = dev
            .enum_formats()
            .map(|descs| {
                descs
                    .iter()
                    .filter_map(|d| PixelFormat::from_fourcc(&d.fourcc.repr))
                    .collect()
            })
            .unwrap_or_default();

        info!("Found device: {} - {}", path, caps.card);
        found.push(DeviceInfo {
            index,
            path,
            card: caps.card,
            driver: caps.driver,
            formats,
        });
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_formats() {
        let info = DeviceInfo {
            index: 2,
            path: "/dev/video2".into(),
            card: "Integrated Camera".into(),
            driver: "uvcvideo".into(),
            formats: vec![PixelFormat::Mjpeg, PixelFormat::Yuyv4],
        };
        assert_eq!(
            info.to_string(),
            "[2] Integrated Camera (uvcvideo, /dev/video2) formats: mjpeg, yuyv4"
        );

        let bare = DeviceInfo {
            formats: vec![],
            ..info
        };
        assert!(bare.to_string().ends_with("none supported"));
    }
}
