//! Capture coordination against a live streaming worker.

mod common;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{grabbed_under, test_config, Call, FakeCamera};
use qccam::capture::CameraDevice;
use qccam::pipeline::{CaptureCoordinator, FrameSlot, ModeState, PauseFlag};
use qccam::{CameraContext, CameraError, Mode};

fn context(camera: &Arc<FakeCamera>) -> Arc<CameraContext> {
    let mut config = test_config();
    // Generous so a loaded test machine never hits the bound
    config.timing.pause_settle_ms = 1_000;
    Arc::new(CameraContext::new(config, Some(camera.as_device())))
}

#[test]
fn captures_never_overlap_device_grabs() {
    let camera = FakeCamera::opened(Duration::from_millis(3));
    let ctx = context(&camera);
    ctx.start_streaming().unwrap();

    let workers: Vec<_> = (0..6)
        .map(|_| {
            let ctx = ctx.clone();
            thread::spawn(move || ctx.capture(None))
        })
        .collect();
    for worker in workers {
        let result = worker.join().unwrap().unwrap();
        assert_eq!(result.width(), common::WIDTH);
    }

    ctx.stop_streaming();
    assert_eq!(camera.max_in_flight(), 1);
}

#[test]
fn concurrent_captures_serialize() {
    let camera = FakeCamera::opened(Duration::from_millis(20));
    let ctx = context(&camera);

    let first = {
        let ctx = ctx.clone();
        thread::spawn(move || ctx.capture(None))
    };
    let second = {
        let ctx = ctx.clone();
        thread::spawn(move || ctx.capture(None))
    };
    let mut sequences = vec![
        first.join().unwrap().unwrap().frame.meta.sequence,
        second.join().unwrap().unwrap().frame.meta.sequence,
    ];
    sequences.sort_unstable();

    // Flush then real grab per capture, never interleaved
    assert_eq!(sequences, vec![2, 4]);
    assert_eq!(camera.grab_count(), 4);
}

#[test]
fn capture_waits_for_settle_after_mode_change() {
    let camera = FakeCamera::opened(Duration::from_millis(1));
    let ctx = context(&camera);

    // No transition since start: no settle wait
    let started = Instant::now();
    ctx.capture(None).unwrap();
    assert!(started.elapsed() < Duration::from_millis(400));

    ctx.set_mode("black").unwrap();
    let result = ctx.capture(None).unwrap();
    assert_eq!(result.mode, Mode::Black);

    let calls = camera.calls();
    let changed = calls
        .iter()
        .position(|(c, _)| *c == Call::SetMode(Mode::Black))
        .unwrap();
    let (_, set_at) = calls[changed];
    let (call, grab_at) = calls[changed + 1];
    assert_eq!(call, Call::Grab);
    assert!(grab_at.duration_since(set_at) >= Duration::from_millis(480));
}

#[test]
fn capture_mode_override_is_applied_first() {
    let camera = FakeCamera::opened(Duration::from_millis(1));
    let ctx = context(&camera);

    let result = ctx.capture(Some(Mode::White)).unwrap();
    assert_eq!(result.mode, Mode::White);
    assert_eq!(ctx.current_mode(), Mode::White);

    let calls: Vec<Call> = camera.calls().into_iter().map(|(c, _)| c).collect();
    assert_eq!(calls, vec![Call::SetMode(Mode::White), Call::Grab, Call::Grab]);
}

#[test]
fn closed_device_is_never_touched() {
    let camera = FakeCamera::new(Duration::ZERO);
    let ctx = context(&camera);

    assert!(matches!(ctx.capture(Some(Mode::Black)), Err(CameraError::DeviceUnavailable)));
    assert!(matches!(ctx.start_streaming(), Err(CameraError::DeviceUnavailable)));
    assert_eq!(camera.call_count(), 0);
}

#[test]
fn failed_grab_reports_capture_failure() {
    let camera = FakeCamera::opened(Duration::ZERO);
    camera.fail_grabs(true);
    let ctx = context(&camera);

    assert!(matches!(ctx.capture(None), Err(CameraError::CaptureFailed)));
    assert_eq!(camera.grab_count(), 2);
}

#[test]
fn pause_is_lifted_when_a_grab_panics() {
    let camera = FakeCamera::opened(Duration::ZERO);
    let pause = Arc::new(PauseFlag::new());
    let coordinator = CaptureCoordinator::new(
        Some(camera.as_device()),
        Arc::new(FrameSlot::new()),
        Arc::new(ModeState::new(Mode::Other)),
        pause.clone(),
        &test_config().timing,
    );

    camera.panic_on_next_grab();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| coordinator.capture(None)));
    assert!(outcome.is_err());
    assert!(!pause.is_paused());

    // The poisoned capture lock is recovered on the next call
    assert!(coordinator.capture(None).is_ok());
}

#[test]
fn streaming_resumes_after_capture() {
    let camera = FakeCamera::opened(Duration::from_millis(2));
    let ctx = context(&camera);
    ctx.start_streaming().unwrap();

    let captured = ctx.capture(None).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let latest = ctx.preview_frame().unwrap();
        if latest.meta.sequence > captured.frame.meta.sequence {
            break;
        }
        assert!(Instant::now() < deadline, "streaming worker never resumed");
        thread::sleep(Duration::from_millis(5));
    }

    ctx.stop_streaming();
    assert!(!ctx.is_streaming());
}

#[test]
fn stop_is_bounded_by_join_timeout() {
    let camera = FakeCamera::opened(Duration::from_millis(300));
    let mut config = test_config();
    config.timing.stop_join_ms = 50;
    let ctx = CameraContext::new(config, Some(camera.as_device()));
    ctx.start_streaming().unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    ctx.stop_streaming();
    assert!(started.elapsed() < Duration::from_millis(250));
    assert!(!ctx.is_streaming());
}

fn wait_for_frame(ctx: &CameraContext) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while ctx.preview_frame().is_none() {
        assert!(Instant::now() < deadline, "no frame published");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn set_mode_never_leaves_a_pre_change_frame_as_latest() {
    // Device controls take longer than a grab, as on the real adapters
    let camera = FakeCamera::opened_with_delays(Duration::from_millis(5), Duration::from_millis(20));
    let ctx = context(&camera);
    ctx.start_streaming().unwrap();
    wait_for_frame(&ctx);

    for mode in [Mode::Black, Mode::White, Mode::Other].into_iter().cycle().take(12) {
        ctx.set_mode(mode.as_str()).unwrap();
        let latest = ctx.preview_frame().unwrap();
        assert_eq!(grabbed_under(&latest), Some(mode));
        thread::sleep(Duration::from_millis(15));
        assert_eq!(grabbed_under(&ctx.preview_frame().unwrap()), Some(mode));
    }

    ctx.stop_streaming();
}

#[test]
fn status_does_not_wait_for_an_in_flight_grab() {
    let camera = FakeCamera::opened(Duration::from_millis(100));
    let ctx = context(&camera);
    ctx.start_streaming().unwrap();
    thread::sleep(Duration::from_millis(20));

    let mut worst = Duration::ZERO;
    for _ in 0..20 {
        let started = Instant::now();
        let status = ctx.status();
        worst = worst.max(started.elapsed());
        assert_eq!(status.status, "ready");
        thread::sleep(Duration::from_millis(3));
    }
    assert!(worst < Duration::from_millis(50), "status blocked for {:?}", worst);

    ctx.stop_streaming();
}

#[test]
fn closed_device_fails_fast_during_a_streaming_grab() {
    let camera = FakeCamera::opened(Duration::from_millis(200));
    let ctx = context(&camera);
    ctx.start_streaming().unwrap();
    thread::sleep(Duration::from_millis(20));

    camera.close();
    let started = Instant::now();
    assert!(matches!(ctx.capture(None), Err(CameraError::DeviceUnavailable)));
    assert!(started.elapsed() < Duration::from_millis(50));

    ctx.stop_streaming();
}
