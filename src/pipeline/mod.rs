//! Frame slot, streaming worker and capture coordination

pub mod coordinator;
pub mod encode;
pub mod mjpeg;
pub mod mode;
pub mod pause;
pub mod slot;
pub mod streaming;

pub use coordinator::{CaptureCoordinator, CaptureResult};
pub use mode::{Mode, ModeSettings, ModeState};
pub use pause::PauseFlag;
pub use slot::FrameSlot;
pub use streaming::StreamingLoop;
