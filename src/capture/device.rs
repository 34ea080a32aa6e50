//! Capability surface shared by the industrial and webcam adapters

use serde::Serialize;
use std::fmt;

use super::frame::Frame;
use crate::pipeline::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    MindVision,
    Webcam,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::MindVision => "mindvision",
            DeviceKind::Webcam => "webcam",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform device contract.
///
/// Adapters never surface driver errors: failures become `false` or `None`
/// at this boundary. Every method takes `&self`; adapters guard their driver
/// state internally so one instance can be shared as `Arc<dyn CameraDevice>`
/// between the streaming worker and request handlers.
pub trait CameraDevice: Send + Sync {
    fn kind(&self) -> DeviceKind;

    /// Idempotent; true when already open
    fn open(&self) -> bool;

    /// Idempotent; safe on a device that never opened
    fn close(&self);

    fn is_open(&self) -> bool;

    /// No-op when closed
    fn set_mode(&self, mode: Mode);

    /// Bounded by the adapter's grab timeout. `None` on timeout or transient failure.
    fn grab(&self) -> Option<Frame>;
}
