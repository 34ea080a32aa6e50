pub mod decoder;
pub mod device;
pub mod frame;
pub mod mindvision;
pub mod v4l2;

use std::sync::Arc;

use tracing::{info, warn};

pub use device::{CameraDevice, DeviceKind};
pub use frame::{Frame, FrameMetadata, PixelFormat};
pub use mindvision::MindVisionCamera;
pub use v4l2::WebcamCamera;

use crate::CameraConfig;

/// Open the best available camera: industrial first, webcam second.
///
/// Returns `None` when nothing opens; the server then runs in `no_camera` state.
pub fn open_best_device(config: &CameraConfig) -> Option<Arc<dyn CameraDevice>> {
    let mut candidates: Vec<Arc<dyn CameraDevice>> = Vec::with_capacity(2);
    if config.prefer_industrial {
        candidates.push(Arc::new(MindVisionCamera::new(config.clone())));
    }
    candidates.push(Arc::new(WebcamCamera::new(config.clone())));

    select_device(candidates, config.initial_mode)
}

/// First candidate that opens wins and gets the initial mode applied
pub fn select_device(
    candidates: Vec<Arc<dyn CameraDevice>>,
    initial_mode: crate::Mode,
) -> Option<Arc<dyn CameraDevice>> {
    for device in candidates {
        if device.open() {
            device.set_mode(initial_mode);
            info!(kind = %device.kind(), "Camera ready");
            return Some(device);
        }
        warn!(kind = %device.kind(), "Camera failed to open, trying next");
    }

    warn!("No camera available!");
    None
}
