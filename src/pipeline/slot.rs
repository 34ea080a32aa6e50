use std::sync::{Mutex, MutexGuard};

use crate::capture::Frame;

#[derive(Default)]
struct SlotState {
    latest: Option<Frame>,
    /// Bumped by `invalidate`; a grab started under an older value is stale
    generation: u64,
}

/// Single-entry latest-frame cache.
///
/// Critical sections only move a `Frame` handle in or out; encoding and any
/// other work happens on the clone after the lock is released. A returned
/// frame may already have been superseded by the time the caller looks at it.
#[derive(Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read before starting a grab and hand back to [`publish_from`](Self::publish_from)
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Overwrite with a newer frame
    pub fn publish(&self, frame: Frame) {
        self.lock().latest = Some(frame);
    }

    /// Publish unless the slot was invalidated after `generation` was read.
    /// Returns whether the frame was kept.
    pub fn publish_from(&self, generation: u64, frame: Frame) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.latest = Some(frame);
        true
    }

    pub fn latest(&self) -> Option<Frame> {
        self.lock().latest.clone()
    }

    /// Drop the current frame and reject every grab already in flight
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.latest = None;
        state.generation = state.generation.wrapping_add(1);
    }
}
