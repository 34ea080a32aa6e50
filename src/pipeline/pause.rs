//! Pause handshake between the streaming worker and the capture coordinator.
//!
//! The worker raises `busy` *before* reading `paused`; the coordinator raises
//! `paused` *before* reading `busy`. With sequentially consistent ordering at
//! least one side observes the other, so once the coordinator sees `busy ==
//! false` the worker is either idle or about to back off without touching the
//! device. The wait is bounded: a grab stuck past the bound lets the capture
//! proceed anyway, and the adapter's internal lock serializes the two calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const IDLE_POLL: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
pub struct PauseFlag {
    paused: AtomicBool,
    busy: AtomicBool,
}

impl PauseFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Worker is inside a device call
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Raise the pause flag until the guard drops, including on unwind
    pub fn pause(&self) -> PauseGuard<'_> {
        self.paused.store(true, Ordering::SeqCst);
        PauseGuard { flag: self }
    }

    /// Worker side: claim the device unless a capture holds the pause
    pub fn enter(&self) -> Option<BusyGuard<'_>> {
        self.busy.store(true, Ordering::SeqCst);
        if self.paused.load(Ordering::SeqCst) {
            self.busy.store(false, Ordering::SeqCst);
            return None;
        }
        Some(BusyGuard { flag: self })
    }
}

/// Clears the pause flag on drop
#[must_use = "the pause lifts as soon as the guard is dropped"]
pub struct PauseGuard<'a> {
    flag: &'a PauseFlag,
}

impl PauseGuard<'_> {
    /// Wait for the worker to leave its device call. False if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.flag.is_busy() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL);
        }
        true
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.flag.paused.store(false, Ordering::SeqCst);
    }
}

/// Held by the worker for the duration of one grab
pub struct BusyGuard<'a> {
    flag: &'a PauseFlag,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.busy.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn worker_backs_off_while_paused() {
        let flag = PauseFlag::new();
        {
            let _pause = flag.pause();
            assert!(flag.enter().is_none());
            assert!(!flag.is_busy());
        }
        assert!(!flag.is_paused());
        assert!(flag.enter().is_some());
    }

    #[test]
    fn pause_lifts_on_panic() {
        let flag = Arc::new(PauseFlag::new());
        let inner = flag.clone();
        let result = std::thread::spawn(move || {
            let _pause = inner.pause();
            panic!("grab exploded");
        })
        .join();

        assert!(result.is_err());
        assert!(!flag.is_paused());
    }

    #[test]
    fn wait_idle_returns_when_worker_leaves() {
        let flag = Arc::new(PauseFlag::new());
        let worker = flag.clone();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();

        let handle = std::thread::spawn(move || {
            let _busy = worker.enter().unwrap();
            entered_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(20));
        });
        entered_rx.recv().unwrap();

        let pause = flag.pause();
        assert!(pause.wait_idle(Duration::from_secs(1)));
        assert!(!flag.is_busy());
        handle.join().unwrap();
    }

    #[test]
    fn wait_idle_is_bounded() {
        let flag = PauseFlag::new();
        let _busy = flag.enter().unwrap();
        let pause = flag.pause();

        let start = Instant::now();
        assert!(!pause.wait_idle(Duration::from_millis(20)));
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
