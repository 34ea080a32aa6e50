//! Commodity webcam adapter over V4L2 memory-mapped streaming

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, instrument, trace, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::control::{Control, Value};
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::decoder::decode_frame;
use super::device::{CameraDevice, DeviceKind};
use super::frame::{Frame, FrameMetadata, PixelFormat};
use crate::pipeline::Mode;
use crate::utils::{self, FoundDevice};
use crate::{CameraConfig, CameraError, Result};

// V4L2 user-class control ids (linux/v4l2-controls.h)
const V4L2_CID_BRIGHTNESS: u32 = 0x0098_0900;
const V4L2_CID_GAIN: u32 = 0x0098_0913;
const V4L2_CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const V4L2_EXPOSURE_MANUAL: i64 = 1;
const V4L2_EXPOSURE_APERTURE_PRIORITY: i64 = 3;

/// Open stream plus the negotiated format
struct Session {
    stream: MmapStream<'static>,
    device: Device,
    width: u32,
    height: u32,
    format: PixelFormat,
}

/// V4L2 webcam behind the [`CameraDevice`] contract
pub struct WebcamCamera {
    config: CameraConfig,
    session: Mutex<Option<Session>>,
    /// Mirrors `session.is_some()` so readiness checks never wait on a grab
    open: AtomicBool,
    sequence: AtomicU64,
}

impl WebcamCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            open: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
        }
    }

    fn start_session(&self) -> Result<Session> {
        let found = match &self.config.webcam_device {
            Some(path) => FoundDevice::new(path.clone(), self.config.webcam_format),
            None => utils::auto_detect_device()?,
        };
        info!("Opening V4L2 webcam: {:?}", found);

        let device = Device::with_path(&found.path)?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CameraError::Sdk(format!(
                "{} doesn't support video capture",
                found.path
            )));
        }

        let mut fmt = device.format()?;
        fmt.width = self.config.webcam_width;
        fmt.height = self.config.webcam_height;
        fmt.fourcc = match found.format {
            PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
            _ => FourCC::new(b"MJPG"),
        };

        // The driver may settle on something else; trust what it reports back
        let fmt = device.set_format(&fmt)?;
        let format = if fmt.fourcc == FourCC::new(b"MJPG") {
            PixelFormat::Mjpeg
        } else if fmt.fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv4
        } else {
            return Err(CameraError::Sdk(format!(
                "unsupported negotiated format {}",
                fmt.fourcc
            )));
        };

        let mut stream =
            MmapStream::with_buffers(&device, Type::VideoCapture, self.config.buffer_count)?;
        stream.set_timeout(Duration::from_millis(self.config.grab_timeout_ms));

        info!(
            width = fmt.width,
            height = fmt.height,
            ?format,
            "Webcam opened with {} buffers",
            self.config.buffer_count
        );

        Ok(Session {
            stream,
            device,
            width: fmt.width,
            height: fmt.height,
            format,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_frame(&self, session: &mut Session) -> io::Result<Option<Frame>> {
        let (buf, meta) = session.stream.next()?;

        let used = (meta.bytesused as usize).min(buf.len());
        let decoded = match decode_frame(&buf[..used], session.format, session.width, session.height)
        {
            Ok(decoded) => decoded,
            Err(e) => {
                // Partial MJPEG frames show up right after (re)starting the stream
                debug!("Dropping undecodable webcam frame: {}", e);
                return Ok(None);
            }
        };

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let bpp = decoded.format.bytes_per_pixel().unwrap_or(1);
        let meta = FrameMetadata {
            sequence,
            width: decoded.width,
            height: decoded.height,
            stride: decoded.width * bpp,
            format: decoded.format,
            device_timestamp: Some(
                Duration::from_secs(meta.timestamp.sec as u64)
                    + Duration::from_micros(meta.timestamp.usec as u64),
            ),
        };

        Ok(Some(Frame::new(Bytes::from(decoded.pixels), meta)))
    }
}

impl CameraDevice for WebcamCamera {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Webcam
    }

    fn open(&self) -> bool {
        let mut session = self.lock();
        if session.is_some() {
            return true;
        }

        match self.start_session() {
            Ok(opened) => {
                *session = Some(opened);
                self.open.store(true, Ordering::SeqCst);
                true
            }
            Err(e) => {
                warn!("Could not open webcam: {}", e);
                false
            }
        }
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        if self.lock().take().is_some() {
            info!("Webcam closed");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn set_mode(&self, mode: Mode) {
        let session = self.lock();
        let Some(session) = session.as_ref() else {
            return;
        };

        let settings = mode.settings();
        let exposure = if settings.auto_exposure {
            V4L2_EXPOSURE_APERTURE_PRIORITY
        } else {
            V4L2_EXPOSURE_MANUAL
        };
        let controls = [
            (V4L2_CID_BRIGHTNESS, "brightness", mode.webcam_brightness()),
            (V4L2_CID_GAIN, "gain", settings.gain as i64),
            (V4L2_CID_EXPOSURE_AUTO, "exposure_auto", exposure),
        ];

        // Not every webcam exposes every control
        for (id, name, value) in controls {
            if let Err(e) = session.device.set_control(Control {
                id,
                value: Value::Integer(value),
            }) {
                debug!("Webcam control {} not applied: {}", name, e);
            }
        }
        info!(%mode, gain = settings.gain, "Webcam mode applied");
    }

    #[instrument(level = "trace", skip(self))]
    fn grab(&self) -> Option<Frame> {
        let mut session = self.lock();
        let session = session.as_mut()?;

        match self.read_frame(session) {
            Ok(frame) => frame,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                trace!("Webcam grab timed out");
                None
            }
            Err(e) => {
                warn!("Webcam grab failed: {}", e);
                None
            }
        }
    }
}

impl Drop for WebcamCamera {
    fn drop(&mut self) {
        self.close();
    }
}
