//! Exclusive still capture on top of a live stream.
//!
//! One capture at a time: serialize on the capture mutex, apply the requested
//! mode, wait out the settle time, pause the streaming worker, drain one
//! stale frame, grab the real one, lift the pause, release the mutex.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use super::mode::{Mode, ModeState};
use super::pause::PauseFlag;
use super::slot::FrameSlot;
use crate::capture::{CameraDevice, DeviceKind, Frame};
use crate::{CameraError, Result, TimingConfig};

/// A fresh full-resolution frame and what it was taken with
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub frame: Frame,
    pub mode: Mode,
    pub kind: DeviceKind,
    pub captured_at: DateTime<Local>,
}

impl CaptureResult {
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    /// `YYYYmmdd_HHMMSS`, the form the dashboard stores with each image
    pub fn timestamp_label(&self) -> String {
        self.captured_at.format("%Y%m%d_%H%M%S").to_string()
    }
}

pub struct CaptureCoordinator {
    device: Option<Arc<dyn CameraDevice>>,
    slot: Arc<FrameSlot>,
    mode: Arc<ModeState>,
    pause: Arc<PauseFlag>,
    /// Held across mode apply, settle, pause and both grabs.
    /// Separate from the frame-slot lock.
    capture_lock: Mutex<()>,
    settle: Duration,
    pause_settle: Duration,
}

impl CaptureCoordinator {
    pub fn new(
        device: Option<Arc<dyn CameraDevice>>,
        slot: Arc<FrameSlot>,
        mode: Arc<ModeState>,
        pause: Arc<PauseFlag>,
        timing: &TimingConfig,
    ) -> Self {
        Self {
            device,
            slot,
            mode,
            pause,
            capture_lock: Mutex::new(()),
            settle: timing.settle(),
            pause_settle: timing.pause_settle(),
        }
    }

    /// Blocking. Run from a worker thread, never on the async executor.
    pub fn capture(&self, requested: Option<Mode>) -> Result<CaptureResult> {
        // Checked before any lock or flag is touched
        let device = self
            .device
            .as_ref()
            .filter(|d| d.is_open())
            .ok_or(CameraError::DeviceUnavailable)?;

        let started = Instant::now();
        let serial = self.capture_lock.lock().unwrap_or_else(|e| e.into_inner());
        let waited_for_lock = started.elapsed();

        if let Some(mode) = requested.filter(|&m| m != self.mode.current()) {
            self.mode.apply(mode, &self.slot, Some(device));
        }
        let mode = self.mode.current();

        let remaining = self.mode.settle_remaining(self.settle);
        if !remaining.is_zero() {
            debug!(%mode, wait_ms = remaining.as_millis() as u64, "Waiting for gain/exposure to settle");
            thread::sleep(remaining);
        }

        let frame = {
            let pause = self.pause.pause();
            if !pause.wait_idle(self.pause_settle) {
                warn!(
                    bound_ms = self.pause_settle.as_millis() as u64,
                    "Streaming worker still in a grab; capturing anyway"
                );
            }

            // First grab may carry pre-switch settings out of the driver queue
            let _flush = device.grab();
            device.grab()
        };
        drop(serial);

        metrics::counter!("qccam_captures_total").increment(1);
        metrics::histogram!("qccam_capture_seconds").record(started.elapsed().as_secs_f64());

        let Some(frame) = frame else {
            metrics::counter!("qccam_capture_failures_total").increment(1);
            warn!(%mode, "Capture failed: no frame from device");
            return Err(CameraError::CaptureFailed);
        };

        info!(
            %mode,
            width = frame.width(),
            height = frame.height(),
            lock_wait_ms = waited_for_lock.as_millis() as u64,
            total_ms = started.elapsed().as_millis() as u64,
            "Frame captured"
        );

        Ok(CaptureResult {
            frame,
            mode,
            kind: device.kind(),
            captured_at: Local::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::ScriptedCamera;
    use std::sync::atomic::Ordering;

    fn coordinator(camera: Option<Arc<ScriptedCamera>>) -> (CaptureCoordinator, Arc<ModeState>, Arc<PauseFlag>) {
        let mode = Arc::new(ModeState::new(Mode::Other));
        let pause = Arc::new(PauseFlag::new());
        let device = camera.map(|c| c as Arc<dyn CameraDevice>);
        let coordinator = CaptureCoordinator::new(
            device,
            Arc::new(FrameSlot::new()),
            mode.clone(),
            pause.clone(),
            &TimingConfig::default(),
        );
        (coordinator, mode, pause)
    }

    #[test]
    fn flushes_one_frame_and_returns_the_next() {
        let camera = ScriptedCamera::open_arc();
        let (coordinator, _, pause) = coordinator(Some(camera.clone()));

        let result = coordinator.capture(None).unwrap();

        assert_eq!(camera.grab_calls(), 2);
        assert_eq!(result.frame.meta.sequence, 2);
        assert_eq!(result.mode, Mode::Other);
        assert!(!pause.is_paused());
    }

    #[test]
    fn no_device_fails_without_side_effects() {
        let (coordinator, mode, pause) = coordinator(None);
        let result = coordinator.capture(Some(Mode::Black));

        assert!(matches!(result, Err(CameraError::DeviceUnavailable)));
        assert_eq!(mode.current(), Mode::Other);
        assert!(!pause.is_paused());
    }

    #[test]
    fn closed_device_is_unavailable() {
        let camera = ScriptedCamera::open_arc();
        camera.close();
        let (coordinator, _, _) = coordinator(Some(camera.clone()));

        assert!(matches!(coordinator.capture(None), Err(CameraError::DeviceUnavailable)));
        assert_eq!(camera.grab_calls(), 0);
    }

    #[test]
    fn requested_mode_is_applied_then_settled() {
        let camera = ScriptedCamera::open_arc();
        let (coordinator, mode, _) = coordinator(Some(camera.clone()));

        let start = Instant::now();
        let result = coordinator.capture(Some(Mode::Black)).unwrap();

        assert_eq!(result.mode, Mode::Black);
        assert_eq!(mode.current(), Mode::Black);
        assert_eq!(camera.last_mode(), Some(Mode::Black));
        assert!(start.elapsed() >= Duration::from_millis(450));
    }

    #[test]
    fn same_mode_request_does_not_reapply() {
        let camera = ScriptedCamera::open_arc();
        let (coordinator, _, _) = coordinator(Some(camera.clone()));

        let start = Instant::now();
        coordinator.capture(Some(Mode::Other)).unwrap();

        assert_eq!(camera.mode_calls.load(Ordering::SeqCst), 0);
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn empty_grab_reports_failure_and_lifts_pause() {
        let camera = ScriptedCamera::open_arc();
        camera.fail_grabs(true);
        let (coordinator, _, pause) = coordinator(Some(camera.clone()));

        assert!(matches!(coordinator.capture(None), Err(CameraError::CaptureFailed)));
        assert!(!pause.is_paused());
        assert_eq!(camera.grab_calls(), 2);
    }

    #[test]
    fn timestamp_label_format() {
        let camera = ScriptedCamera::open_arc();
        let (coordinator, _, _) = coordinator(Some(camera));
        let label = coordinator.capture(None).unwrap().timestamp_label();

        assert_eq!(label.len(), 15);
        assert_eq!(&label[8..9], "_");
        assert!(label.chars().filter(|c| *c != '_').all(|c| c.is_ascii_digit()));
    }
}
