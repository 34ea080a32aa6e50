//! MindVision industrial camera adapter.
//!
//! The vendor SDK is loaded at runtime with libloading, so the binary builds
//! and runs on machines without it; the adapter simply fails to open there.
//! Output is forced to MONO8 to keep 5456x2812 frames cheap to move around.

use std::ffi::{c_char, c_int, c_uint, CStr};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use libloading::Library;
use tracing::{info, trace, warn};

use super::device::{CameraDevice, DeviceKind};
use super::frame::{Frame, FrameMetadata, PixelFormat};
use crate::pipeline::Mode;
use crate::{CameraConfig, CameraError, Result};

type CameraHandle = c_int;

const CAMERA_STATUS_SUCCESS: c_int = 0;
/// The one grab failure that is part of normal polling
const CAMERA_STATUS_TIME_OUT: c_int = -12;
const CAMERA_MEDIA_TYPE_MONO8: c_uint = 0x0108_0001;
const MAX_DEVICES: usize = 16;

const SDK_LIBRARY: &str = "libMVSDK.so";

/// tSdkCameraDevInfo
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct DevInfo {
    product_series: [c_char; 32],
    product_name: [c_char; 32],
    friendly_name: [c_char; 32],
    link_name: [c_char; 32],
    driver_version: [c_char; 32],
    sensor_type: [c_char; 32],
    port_type: [c_char; 32],
    sn: [c_char; 32],
    instance: c_uint,
}

impl DevInfo {
    fn friendly_name(&self) -> String {
        // Guaranteed NUL-terminated inside the fixed array by the SDK
        let bytes: Vec<u8> = self
            .friendly_name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// tSdkFrameHead
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct FrameHead {
    media_type: c_uint,
    bytes: c_uint,
    width: c_int,
    height: c_int,
    width_zoom_sw: c_int,
    height_zoom_sw: c_int,
    is_trigger: c_int,
    timestamp: c_uint,
    exp_time: c_uint,
    analog_gain: f32,
    gamma: c_int,
    contrast: c_int,
    saturation: c_int,
    r_gain: f32,
    g_gain: f32,
    b_gain: f32,
}

/// Function table resolved from the vendor library
struct MvSdk {
    _lib: Library,
    sdk_init: unsafe extern "C" fn(c_int) -> c_int,
    enumerate_device: unsafe extern "C" fn(*mut DevInfo, *mut c_int) -> c_int,
    init: unsafe extern "C" fn(*mut DevInfo, c_int, c_int, *mut CameraHandle) -> c_int,
    uninit: unsafe extern "C" fn(CameraHandle) -> c_int,
    set_isp_out_format: unsafe extern "C" fn(CameraHandle, c_uint) -> c_int,
    set_trigger_mode: unsafe extern "C" fn(CameraHandle, c_int) -> c_int,
    play: unsafe extern "C" fn(CameraHandle) -> c_int,
    get_image_buffer:
        unsafe extern "C" fn(CameraHandle, *mut FrameHead, *mut *mut u8, c_uint) -> c_int,
    image_process: unsafe extern "C" fn(CameraHandle, *mut u8, *mut u8, *mut FrameHead) -> c_int,
    release_image_buffer: unsafe extern "C" fn(CameraHandle, *mut u8) -> c_int,
    set_analog_gain: unsafe extern "C" fn(CameraHandle, c_int) -> c_int,
    set_ae_state: unsafe extern "C" fn(CameraHandle, c_int) -> c_int,
    get_error_string: unsafe extern "C" fn(c_int) -> *const c_char,
}

/// Resolve one symbol to a bare fn pointer
///
/// # Safety
/// `T` must match the C signature exported under `name`.
unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Result<T> {
    lib.get::<T>(name).map(|s| *s).map_err(|e| {
        CameraError::Sdk(format!(
            "missing symbol {}: {}",
            String::from_utf8_lossy(&name[..name.len().saturating_sub(1)]),
            e
        ))
    })
}

impl MvSdk {
    fn load(path: &Path) -> Result<Self> {
        unsafe {
            let lib = Library::new(path)
                .map_err(|e| CameraError::Sdk(format!("{}: {}", path.display(), e)))?;

            Ok(Self {
                sdk_init: symbol(&lib, b"CameraSdkInit\0")?,
                enumerate_device: symbol(&lib, b"CameraEnumerateDevice\0")?,
                init: symbol(&lib, b"CameraInit\0")?,
                uninit: symbol(&lib, b"CameraUnInit\0")?,
                set_isp_out_format: symbol(&lib, b"CameraSetIspOutFormat\0")?,
                set_trigger_mode: symbol(&lib, b"CameraSetTriggerMode\0")?,
                play: symbol(&lib, b"CameraPlay\0")?,
                get_image_buffer: symbol(&lib, b"CameraGetImageBuffer\0")?,
                image_process: symbol(&lib, b"CameraImageProcess\0")?,
                release_image_buffer: symbol(&lib, b"CameraReleaseImageBuffer\0")?,
                set_analog_gain: symbol(&lib, b"CameraSetAnalogGain\0")?,
                set_ae_state: symbol(&lib, b"CameraSetAeState\0")?,
                get_error_string: symbol(&lib, b"CameraGetErrorString\0")?,
                _lib: lib,
            })
        }
    }

    fn describe(&self, status: c_int) -> String {
        let text = unsafe { (self.get_error_string)(status) };
        if text.is_null() {
            return format!("status {}", status);
        }
        let text = unsafe { CStr::from_ptr(text) }.to_string_lossy();
        format!("{} ({})", text, status)
    }

    fn check(&self, status: c_int, call: &str) -> Result<()> {
        if status == CAMERA_STATUS_SUCCESS {
            Ok(())
        } else {
            Err(CameraError::Sdk(format!("{} failed: {}", call, self.describe(status))))
        }
    }
}

/// An initialised camera handle and its processing buffer
struct Session {
    sdk: MvSdk,
    handle: CameraHandle,
    buffer: Vec<u8>,
}

impl Session {
    fn start(sdk: MvSdk, config: &CameraConfig) -> Result<Self> {
        unsafe {
            sdk.check((sdk.sdk_init)(1), "CameraSdkInit")?;

            let mut devices = [DevInfo::default(); MAX_DEVICES];
            let mut count = MAX_DEVICES as c_int;
            sdk.check(
                (sdk.enumerate_device)(devices.as_mut_ptr(), &mut count),
                "CameraEnumerateDevice",
            )?;
            if count <= 0 {
                return Err(CameraError::Sdk("No MindVision camera found".into()));
            }

            let mut dev = devices[0];
            info!("Found camera: {}", dev.friendly_name());

            let mut handle: CameraHandle = 0;
            sdk.check((sdk.init)(&mut dev, -1, -1, &mut handle), "CameraInit")?;

            let configured = sdk
                .check(
                    (sdk.set_isp_out_format)(handle, CAMERA_MEDIA_TYPE_MONO8),
                    "CameraSetIspOutFormat",
                )
                .and_then(|_| sdk.check((sdk.set_trigger_mode)(handle, 0), "CameraSetTriggerMode"))
                .and_then(|_| sdk.check((sdk.play)(handle), "CameraPlay"));
            if let Err(e) = configured {
                (sdk.uninit)(handle);
                return Err(e);
            }

            let buffer_size =
                config.industrial_max_width as usize * config.industrial_max_height as usize;

            Ok(Self {
                sdk,
                handle,
                buffer: vec![0u8; buffer_size],
            })
        }
    }

    /// `Ok(None)` on the well-known timeout
    fn grab(&mut self, timeout_ms: c_uint) -> Result<Option<(FrameHead, Bytes)>> {
        let mut head = FrameHead::default();
        let mut raw: *mut u8 = ptr::null_mut();

        unsafe {
            let status = (self.sdk.get_image_buffer)(self.handle, &mut head, &mut raw, timeout_ms);
            if status == CAMERA_STATUS_TIME_OUT {
                return Ok(None);
            }
            self.sdk.check(status, "CameraGetImageBuffer")?;

            let needed = head.bytes as usize;
            if needed > self.buffer.len() {
                (self.sdk.release_image_buffer)(self.handle, raw);
                return Err(CameraError::FrameLayout {
                    width: head.width as u32,
                    height: head.height as u32,
                });
            }

            let status =
                (self.sdk.image_process)(self.handle, raw, self.buffer.as_mut_ptr(), &mut head);
            (self.sdk.release_image_buffer)(self.handle, raw);
            self.sdk.check(status, "CameraImageProcess")?;
        }

        // MONO8 output is one byte per pixel regardless of the raw size
        let len = (head.width.max(0) as usize * head.height.max(0) as usize).min(self.buffer.len());
        Ok(Some((head, Bytes::copy_from_slice(&self.buffer[..len]))))
    }

    fn apply(&self, gain: u32, auto_exposure: bool) -> Result<()> {
        unsafe {
            self.sdk.check(
                (self.sdk.set_analog_gain)(self.handle, gain as c_int),
                "CameraSetAnalogGain",
            )?;
            self.sdk.check(
                (self.sdk.set_ae_state)(self.handle, auto_exposure as c_int),
                "CameraSetAeState",
            )
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        unsafe {
            (self.sdk.uninit)(self.handle);
        }
    }
}

/// MindVision camera behind the [`CameraDevice`] contract
pub struct MindVisionCamera {
    config: CameraConfig,
    session: Mutex<Option<Session>>,
    /// Mirrors `session.is_some()` so readiness checks never wait on a grab
    open: AtomicBool,
    sequence: AtomicU64,
}

impl MindVisionCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            open: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
        }
    }

    /// Configured path first, then next to the executable, then the loader path
    fn library_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(path) = &self.config.sdk_path {
            candidates.push(PathBuf::from(path));
        }
        if let Some(dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
            candidates.push(dir.join(SDK_LIBRARY));
        }
        candidates.push(PathBuf::from(SDK_LIBRARY));
        candidates
    }

    fn load_sdk(&self) -> Result<MvSdk> {
        let mut last_error = CameraError::Sdk("no SDK library candidates".into());
        for path in self.library_candidates() {
            match MvSdk::load(&path) {
                Ok(sdk) => {
                    info!("Loaded MindVision SDK from {}", path.display());
                    return Ok(sdk);
                }
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CameraDevice for MindVisionCamera {
    fn kind(&self) -> DeviceKind {
        DeviceKind::MindVision
    }

    fn open(&self) -> bool {
        let mut session = self.lock();
        if session.is_some() {
            return true;
        }

        match self.load_sdk().and_then(|sdk| Session::start(sdk, &self.config)) {
            Ok(started) => {
                *session = Some(started);
                self.open.store(true, Ordering::SeqCst);
                info!("MindVision camera opened (MONO8 mode)");
                true
            }
            Err(e) => {
                warn!("MindVision camera unavailable: {}", e);
                false
            }
        }
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        if self.lock().take().is_some() {
            info!("MindVision camera closed");
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
        match session.apply(settings.gain, settings.auto_exposure) {
            Ok(()) => info!(
                %mode,
                gain = settings.gain,
                auto_exposure = settings.auto_exposure,
                "MindVision mode applied"
            ),
            Err(e) => warn!(%mode, "Failed to apply mode: {}", e),
        }
    }

    fn grab(&self) -> Option<Frame> {
        let mut session = self.lock();
        let session = session.as_mut()?;

        match session.grab(self.config.grab_timeout_ms as c_uint) {
            Ok(Some((head, data))) => {
                let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
                let width = head.width as u32;
                Some(Frame::new(
                    data,
                    FrameMetadata {
                        sequence,
                        width,
                        height: head.height as u32,
                        stride: width,
                        format: PixelFormat::Mono8,
                        device_timestamp: None,
                    },
                ))
            }
            Ok(None) => {
                trace!("MindVision grab timed out");
                None
            }
            Err(e) => {
                warn!("Grab failed: {}", e);
                None
            }
        }
    }
}

impl Drop for MindVisionCamera {
    fn drop(&mut self) {
        self.close();
    }
}
