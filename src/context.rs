//! The single owned context shared by every handler and worker.
//!
//! Locking discipline:
//! - `slot`: its own mutex, held only to move a frame handle in or out.
//! - capture mutex (inside `coordinator`): held across one whole capture.
//! - pause/busy flags: atomics, see [`crate::pipeline::pause`].
//! - `mode`: lock-free swap, last write wins.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use crate::capture::{CameraDevice, DeviceKind, Frame};
use crate::pipeline::mjpeg::MjpegReader;
use crate::pipeline::{
    CaptureCoordinator, CaptureResult, FrameSlot, Mode, ModeSettings, ModeState, PauseFlag,
    StreamingLoop,
};
use crate::{CameraError, Config, Result, SERVER_NAME};

/// Body of `GET /api/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: &'static str,
    pub camera_type: Option<DeviceKind>,
    pub current_mode: Mode,
    pub streaming: bool,
    pub server: &'static str,
}

pub struct CameraContext {
    config: Config,
    device: Option<Arc<dyn CameraDevice>>,
    slot: Arc<FrameSlot>,
    mode: Arc<ModeState>,
    /// Present only when a device was opened
    streaming: Option<Arc<StreamingLoop>>,
    coordinator: CaptureCoordinator,
}

impl CameraContext {
    pub fn new(config: Config, device: Option<Arc<dyn CameraDevice>>) -> Self {
        let slot = Arc::new(FrameSlot::new());
        let mode = Arc::new(ModeState::new(config.camera.initial_mode));
        let pause = Arc::new(PauseFlag::new());

        let streaming = device.as_ref().map(|device| {
            Arc::new(StreamingLoop::new(
                device.clone(),
                slot.clone(),
                pause.clone(),
                &config.timing,
            ))
        });
        let coordinator = CaptureCoordinator::new(
            device.clone(),
            slot.clone(),
            mode.clone(),
            pause,
            &config.timing,
        );

        Self {
            config,
            device,
            slot,
            mode,
            streaming,
            coordinator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The device, only while it is open
    fn open_device(&self) -> Option<&Arc<dyn CameraDevice>> {
        self.device.as_ref().filter(|d| d.is_open())
    }

    pub fn device_kind(&self) -> Option<DeviceKind> {
        self.device.as_ref().map(|d| d.kind())
    }

    pub fn is_ready(&self) -> bool {
        self.open_device().is_some()
    }

    pub fn current_mode(&self) -> Mode {
        self.mode.current()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.as_ref().is_some_and(|s| s.is_running())
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            status: if self.is_ready() { "ready" } else { "no_camera" },
            camera_type: self.device_kind(),
            current_mode: self.current_mode(),
            streaming: self.is_streaming(),
            server: SERVER_NAME,
        }
    }

    /// Validate and switch mode; works without a device (pre-staging)
    pub fn set_mode(&self, raw: &str) -> Result<(Mode, ModeSettings)> {
        let settings = self.mode.set(raw, &self.slot, self.open_device())?;
        Ok((self.mode.current(), settings))
    }

    pub fn start_streaming(&self) -> Result<()> {
        if !self.is_ready() {
            return Err(CameraError::DeviceUnavailable);
        }
        match &self.streaming {
            Some(streaming) => streaming.start().map(|_| ()),
            None => Err(CameraError::DeviceUnavailable),
        }
    }

    pub fn stop_streaming(&self) {
        if let Some(streaming) = &self.streaming {
            streaming.stop();
        }
    }

    /// Exclusive fresh capture. Blocks; call via `spawn_blocking`.
    pub fn capture(&self, mode: Option<Mode>) -> Result<CaptureResult> {
        self.coordinator.capture(mode)
    }

    /// Latest slot frame, else a direct (non-exclusive) grab
    pub fn preview_frame(&self) -> Option<Frame> {
        self.slot
            .latest()
            .or_else(|| self.open_device().and_then(|d| d.grab()))
    }

    /// Start a reader thread feeding MJPEG parts into `tx` for as long as
    /// the client listens and streaming stays on.
    pub fn spawn_mjpeg_feed(&self, tx: flume::Sender<Bytes>) -> Result<()> {
        let streaming = self
            .streaming
            .clone()
            .ok_or(CameraError::DeviceUnavailable)?;
        MjpegReader::new(self.slot.clone(), &self.config.jpeg).spawn_feed(
            tx,
            self.config.timing.stream_poll(),
            move || streaming.is_running(),
        )?;
        Ok(())
    }

    /// Stop streaming, then release the device
    pub fn shutdown(&self) {
        self.stop_streaming();
        if let Some(device) = &self.device {
            device.close();
        }
        info!("Camera closed. Server shutting down.");
    }
}
