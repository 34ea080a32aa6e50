use crate::capture::frame::PixelFormat;
use crate::{CameraError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use v4l::{capability::Flags, video::Capture, Device, FourCC};

// Detected capture device info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundDevice {
    pub path: String,
    pub format: PixelFormat,
}

impl FoundDevice {
    pub fn new(path: String, format: PixelFormat) -> Self {
        Self { path, format }
    }
}

/// Auto-detect best capture device
pub fn auto_detect_device() -> Result<FoundDevice> {
    use std::path::Path;

    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }

        // Prefer MJPEG; full-HD YUYV is bandwidth-limited on most webcams
        if let Ok(formats) = dev.enum_formats() {
            if formats.iter().any(|f| f.fourcc == FourCC::new(b"MJPG")) {
                info!("Found MJPEG device: {} - {}", path, caps.card);
                return Ok(FoundDevice::new(path, PixelFormat::Mjpeg));
            }
            if formats.iter().any(|f| f.fourcc == FourCC::new(b"YUYV")) {
                info!("Found YUYV device: {} - {}", path, caps.card);
                return Ok(FoundDevice::new(path, PixelFormat::Yuyv4));
            }
        }
    }

    Err(CameraError::DeviceUnavailable)
}
