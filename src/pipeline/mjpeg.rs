//! Per-client MJPEG feed from the frame slot.
//!
//! A reader remembers the last frame it sent and only re-encodes when the slot
//! holds a different capture, so an idle camera costs no encoding and a slow
//! client always gets the newest frame rather than a backlog.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use super::encode::encode_scaled;
use super::slot::FrameSlot;
use crate::capture::Frame;
use crate::{JpegConfig, Result};

pub const BOUNDARY: &str = "frame";

pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

/// Wrap one JPEG as a multipart part
pub fn part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    let mut buf = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    buf.put_slice(header.as_bytes());
    buf.put_slice(jpeg);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

pub struct MjpegReader {
    slot: Arc<FrameSlot>,
    quality: u8,
    max_width: u32,
    last_sent: Option<Frame>,
}

impl MjpegReader {
    pub fn new(slot: Arc<FrameSlot>, jpeg: &JpegConfig) -> Self {
        Self {
            slot,
            quality: jpeg.stream_quality,
            max_width: jpeg.stream_max_width,
            last_sent: None,
        }
    }

    /// Encoded part for a capture not sent yet, or `None` when nothing changed
    pub fn poll_part(&mut self) -> Result<Option<Bytes>> {
        let Some(frame) = self.slot.latest() else {
            return Ok(None);
        };
        if self
            .last_sent
            .as_ref()
            .is_some_and(|last| last.same_capture(&frame))
        {
            return Ok(None);
        }

        // Recorded before encoding so a bad frame isn't retried every poll
        self.last_sent = Some(frame.clone());
        let jpeg = encode_scaled(&frame, self.quality, Some(self.max_width))?;
        Ok(Some(part(&jpeg)))
    }

    /// Feed parts into `tx` from a dedicated thread until the client goes
    /// away or `keep_going` turns false.
    pub fn spawn_feed<F>(
        mut self,
        tx: flume::Sender<Bytes>,
        poll: Duration,
        keep_going: F,
    ) -> std::io::Result<thread::JoinHandle<()>>
    where
        F: Fn() -> bool + Send + 'static,
    {
        thread::Builder::new()
            .name("qccam-mjpeg".into())
            .spawn(move || {
                while keep_going() {
                    match self.poll_part() {
                        Ok(Some(part)) => {
                            if tx.send(part).is_err() {
                                debug!("MJPEG client disconnected");
                                return;
                            }
                        }
                        Ok(None) => thread::sleep(poll),
                        Err(e) => {
                            warn!("Skipping stream frame: {}", e);
                            thread::sleep(poll);
                        }
                    }
                }
                debug!("MJPEG feed ended: streaming stopped");
            })
    }
}
