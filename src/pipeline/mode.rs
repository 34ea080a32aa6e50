//! Imaging mode presets and the process-wide current mode

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::info;

use super::slot::FrameSlot;
use crate::capture::CameraDevice;
use crate::CameraError;

/// Garment colour preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Black,
    White,
    Other,
}

/// Fixed gain / auto-exposure pair for a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeSettings {
    pub gain: u32,
    #[serde(serialize_with = "on_off")]
    pub auto_exposure: bool,
}

fn on_off<S: Serializer>(enabled: &bool, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(if *enabled { "ON" } else { "OFF" })
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Black, Mode::White, Mode::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Black => "black",
            Mode::White => "white",
            Mode::Other => "other",
        }
    }

    pub fn settings(self) -> ModeSettings {
        match self {
            // Dark fabric: push gain, lock exposure so AE doesn't chase the background
            Mode::Black => ModeSettings {
                gain: 150,
                auto_exposure: false,
            },
            Mode::White => ModeSettings {
                gain: 32,
                auto_exposure: true,
            },
            Mode::Other => ModeSettings {
                gain: 64,
                auto_exposure: true,
            },
        }
    }

    /// Brightness control value for V4L2 webcams
    pub fn webcam_brightness(self) -> i64 {
        match self {
            Mode::Black => 200,
            Mode::White => 100,
            Mode::Other => 128,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| CameraError::InvalidMode(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
struct ModeSnapshot {
    mode: Mode,
    /// `None` until the first transition after startup
    changed_at: Option<Instant>,
}

/// Current mode plus the instant it last changed.
///
/// Readers never block. Concurrent writers resolve last-write-wins.
pub struct ModeState {
    current: ArcSwap<ModeSnapshot>,
}

impl ModeState {
    pub fn new(initial: Mode) -> Self {
        Self {
            current: ArcSwap::from_pointee(ModeSnapshot {
                mode: initial,
                changed_at: None,
            }),
        }
    }

    pub fn current(&self) -> Mode {
        self.current.load().mode
    }

    pub fn changed_at(&self) -> Option<Instant> {
        self.current.load().changed_at
    }

    /// Remaining stabilisation time: `max(0, settle - elapsed)`
    pub fn settle_remaining(&self, settle: Duration) -> Duration {
        match self.changed_at() {
            Some(at) => settle.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Switch mode: record the transition, push the preset to the device
    /// when it is open, then invalidate the slot.
    ///
    /// The slot is invalidated only after the device call returns, so any
    /// streaming grab that started under the old preset is rejected on
    /// publish rather than served as latest.
    pub fn apply(&self, mode: Mode, slot: &FrameSlot, device: Option<&Arc<dyn CameraDevice>>) {
        self.current.store(Arc::new(ModeSnapshot {
            mode,
            changed_at: Some(Instant::now()),
        }));

        if let Some(device) = device.filter(|d| d.is_open()) {
            device.set_mode(mode);
        }
        slot.invalidate();
        info!(%mode, "Mode changed");
    }

    /// Parse then [`apply`](Self::apply). Rejected input touches nothing.
    pub fn set(
        &self,
        raw: &str,
        slot: &FrameSlot,
        device: Option<&Arc<dyn CameraDevice>>,
    ) -> crate::Result<ModeSettings> {
        let mode: Mode = raw.parse()?;
        self.apply(mode, slot, device);
        Ok(mode.settings())
    }
}
