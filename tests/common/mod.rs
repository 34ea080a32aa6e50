//! Instrumented fake camera shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use qccam::capture::{CameraDevice, DeviceKind, Frame, FrameMetadata, PixelFormat};
use qccam::{Config, Mode};

pub const WIDTH: u32 = 32;
pub const HEIGHT: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    SetMode(Mode),
    Grab,
}

/// Driver state behind the adapter lock
#[derive(Default)]
struct Session {
    mode: Option<Mode>,
}

/// Shaped like the real adapters: one session mutex held across every
/// `grab` and `set_mode`, with a lock-free open flag. Counts concurrent
/// grabs and records every device call with its time. Each frame's first
/// byte carries the mode the device had when it was grabbed.
pub struct FakeCamera {
    open: AtomicBool,
    session: Mutex<Session>,
    sequence: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    grab_delay: Duration,
    set_mode_delay: Duration,
    fail: AtomicBool,
    panic_next: AtomicBool,
    calls: Mutex<Vec<(Call, Instant)>>,
}

impl FakeCamera {
    pub fn new(grab_delay: Duration) -> Arc<Self> {
        Self::with_delays(grab_delay, Duration::ZERO)
    }

    pub fn with_delays(grab_delay: Duration, set_mode_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            open: AtomicBool::new(false),
            session: Mutex::new(Session::default()),
            sequence: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            grab_delay,
            set_mode_delay,
            fail: AtomicBool::new(false),
            panic_next: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn opened(grab_delay: Duration) -> Arc<Self> {
        let camera = Self::new(grab_delay);
        camera.open();
        camera
    }

    pub fn opened_with_delays(grab_delay: Duration, set_mode_delay: Duration) -> Arc<Self> {
        let camera = Self::with_delays(grab_delay, set_mode_delay);
        camera.open();
        camera
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn as_device(self: &Arc<Self>) -> Arc<dyn CameraDevice> {
        self.clone()
    }

    pub fn fail_grabs(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn panic_on_next_grab(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(Call, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn grab_count(&self) -> usize {
        self.calls().iter().filter(|(c, _)| *c == Call::Grab).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CameraDevice for FakeCamera {
    fn kind(&self) -> DeviceKind {
        DeviceKind::MindVision
    }

    fn open(&self) -> bool {
        self.open.store(true, Ordering::SeqCst);
        true
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn set_mode(&self, mode: Mode) {
        if !self.is_open() {
            return;
        }
        let mut session = self.lock();
        self.record(Call::SetMode(mode));
        thread::sleep(self.set_mode_delay);
        session.mode = Some(mode);
    }

    fn grab(&self) -> Option<Frame> {
        self.record(Call::Grab);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let session = self.lock();
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("scripted grab panic");
        }
        thread::sleep(self.grab_delay);

        if !self.is_open() || self.fail.load(Ordering::SeqCst) {
            return None;
        }
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let mut data: Vec<u8> = (0..WIDTH * HEIGHT).map(|i| (i * 7 % 256) as u8).collect();
        data[0] = mode_tag(session.mode);
        Some(Frame::new(
            Bytes::from(data),
            FrameMetadata {
                sequence,
                width: WIDTH,
                height: HEIGHT,
                stride: WIDTH,
                format: PixelFormat::Mono8,
                device_timestamp: None,
            },
        ))
    }
}

fn mode_tag(mode: Option<Mode>) -> u8 {
    match mode {
        None => 0,
        Some(Mode::Black) => 1,
        Some(Mode::White) => 2,
        Some(Mode::Other) => 3,
    }
}

/// Mode the device held when `frame` was grabbed
pub fn grabbed_under(frame: &Frame) -> Option<Mode> {
    match frame.data.first() {
        Some(1) => Some(Mode::Black),
        Some(2) => Some(Mode::White),
        Some(3) => Some(Mode::Other),
        _ => None,
    }
}

/// Defaults with short poll intervals so tests stay fast
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.timing.retry_delay_ms = 1;
    config.timing.stream_poll_ms = 2;
    config
}
