pub mod capture;
pub mod context;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod server;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

pub use context::CameraContext;
pub use error::{CameraError, Result};
pub use pipeline::Mode;

/// Environment variable pointing at an alternate config file
pub const CONFIG_PATH_ENV: &str = "QCCAM_CONFIG";

/// Reported in `/api/status`
pub const SERVER_NAME: &str = concat!("QC Camera Server v", env!("CARGO_PKG_VERSION"));

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub timing: TimingConfig,
    pub jpeg: JpegConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub pid_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Probe the industrial SDK before falling back to V4L2
    pub prefer_industrial: bool,
    /// Explicit vendor library path; searched next to the executable otherwise
    pub sdk_path: Option<String>,
    pub grab_timeout_ms: u64,
    /// Upper bound used to size the SDK output buffer
    pub industrial_max_width: u32,
    pub industrial_max_height: u32,
    /// `/dev/videoN`; autodetected when unset
    pub webcam_device: Option<String>,
    pub webcam_width: u32,
    pub webcam_height: u32,
    pub webcam_format: PixelFormat,
    pub buffer_count: u32,
    pub initial_mode: Mode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Gain/exposure stabilisation after a mode switch
    pub settle_ms: u64,
    /// Upper bound on waiting for the streaming worker to yield the device
    pub pause_settle_ms: u64,
    /// Back-off after a failed grab in the streaming worker
    pub retry_delay_ms: u64,
    /// Poll interval for MJPEG readers and the paused worker
    pub stream_poll_ms: u64,
    pub stop_join_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JpegConfig {
    pub stream_quality: u8,
    /// Stream frames wider than this are downscaled before encoding
    pub stream_max_width: u32,
    pub capture_quality: u8,
    pub preview_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5555,
            pid_file: "qccam.pid".into(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            prefer_industrial: true,
            sdk_path: None,
            grab_timeout_ms: 200,
            industrial_max_width: 5472,
            industrial_max_height: 3648,
            webcam_device: None,
            webcam_width: 1920,
            webcam_height: 1080,
            webcam_format: PixelFormat::Mjpeg,
            buffer_count: 4,
            initial_mode: Mode::Other,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: 500,
            pause_settle_ms: 30,
            retry_delay_ms: 5,
            stream_poll_ms: 10,
            stop_join_ms: 2000,
        }
    }
}

impl Default for JpegConfig {
    fn default() -> Self {
        Self {
            stream_quality: 80,
            stream_max_width: 1280,
            capture_quality: 95,
            preview_quality: 90,
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `QCCAM__SECTION__KEY` overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "qccam.toml".into());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&file).required(path.is_some()))
            .add_source(
                config::Environment::with_prefix("QCCAM")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl TimingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn pause_settle(&self) -> Duration {
        Duration::from_millis(self.pause_settle_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn stream_poll(&self) -> Duration {
        Duration::from_millis(self.stream_poll_ms)
    }

    pub fn stop_join(&self) -> Duration {
        Duration::from_millis(self.stop_join_ms)
    }
}
