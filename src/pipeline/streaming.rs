//! Background live-preview worker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use super::pause::PauseFlag;
use super::slot::FrameSlot;
use crate::capture::CameraDevice;
use crate::{Result, TimingConfig};

/// Handle to the running worker. `active` belongs to this generation only,
/// so a stop followed by a quick start never revives the old thread.
struct Worker {
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn is_alive(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.handle.is_finished()
    }
}

/// Stopped -> Running -> Stopped.
///
/// At most one worker exists. It grabs continuously into the [`FrameSlot`]
/// and yields the device whenever the shared [`PauseFlag`] is raised.
pub struct StreamingLoop {
    device: Arc<dyn CameraDevice>,
    slot: Arc<FrameSlot>,
    pause: Arc<PauseFlag>,
    retry_delay: Duration,
    join_timeout: Duration,
    worker: Mutex<Option<Worker>>,
}

impl StreamingLoop {
    pub fn new(
        device: Arc<dyn CameraDevice>,
        slot: Arc<FrameSlot>,
        pause: Arc<PauseFlag>,
        timing: &TimingConfig,
    ) -> Self {
        Self {
            device,
            slot,
            pause,
            retry_delay: timing.retry_delay(),
            join_timeout: timing.stop_join(),
            worker: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(Worker::is_alive)
    }

    /// Spawn the worker unless one is already running. Returns whether a new one started.
    pub fn start(&self) -> Result<bool> {
        let mut worker = self.lock();
        if worker.as_ref().is_some_and(Worker::is_alive) {
            return Ok(false);
        }
        // A previous worker that exited on its own (device closed) is reaped here
        if let Some(old) = worker.take() {
            let _ = old.handle.join();
        }

        let active = Arc::new(AtomicBool::new(true));
        let grab = GrabLoop {
            device: self.device.clone(),
            slot: self.slot.clone(),
            pause: self.pause.clone(),
            active: active.clone(),
            retry_delay: self.retry_delay,
        };
        let handle = thread::Builder::new()
            .name("qccam-stream".into())
            .spawn(move || grab.run())?;

        *worker = Some(Worker { active, handle });
        info!("Streaming started");
        Ok(true)
    }

    /// Signal the worker and wait up to the join timeout. Never interrupts a
    /// device call; a worker that overruns is detached and exits on its own.
    pub fn stop(&self) {
        let Some(worker) = self.lock().take() else {
            return;
        };
        worker.active.store(false, Ordering::SeqCst);

        let deadline = Instant::now() + self.join_timeout;
        while !worker.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        if worker.handle.is_finished() {
            if worker.handle.join().is_err() {
                error!("Streaming worker panicked");
            }
        } else {
            warn!(
                timeout_ms = self.join_timeout.as_millis() as u64,
                "Streaming worker did not exit in time; detaching"
            );
        }
        info!("Streaming stopped");
    }
}

impl Drop for StreamingLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

struct GrabLoop {
    device: Arc<dyn CameraDevice>,
    slot: Arc<FrameSlot>,
    pause: Arc<PauseFlag>,
    active: Arc<AtomicBool>,
    retry_delay: Duration,
}

impl GrabLoop {
    fn run(self) {
        debug!(kind = %self.device.kind(), "Streaming worker running");

        while self.active.load(Ordering::SeqCst) {
            // Yield point for captures: no device access of any kind while paused
            let Some(busy) = self.pause.enter() else {
                thread::sleep(self.retry_delay);
                continue;
            };

            if !self.device.is_open() {
                info!("Device closed; streaming worker exiting");
                break;
            }

            let generation = self.slot.generation();
            match self.device.grab() {
                Some(frame) => {
                    drop(busy);
                    if self.slot.publish_from(generation, frame) {
                        metrics::counter!("qccam_stream_frames_total").increment(1);
                    } else {
                        trace!("Dropping frame grabbed across a mode change");
                    }
                }
                None => {
                    drop(busy);
                    thread::sleep(self.retry_delay);
                }
            }
        }

        debug!("Streaming worker finished");
    }
}
