//! Single-instance guard and PID record

use std::fs;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::{CameraError, Result};

const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Refuse to start when something already answers on `port` locally
pub fn ensure_single_instance(port: u16) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    match TcpStream::connect_timeout(&addr, PROBE_TIMEOUT) {
        Ok(_) => Err(CameraError::AlreadyRunning { port }),
        Err(e) => {
            debug!(port, "Port probe: {}", e);
            Ok(())
        }
    }
}

/// `kill(pid, 0)`: EPERM still means the process exists
fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn read_pid(path: &Path) -> Option<i32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// PID file removed on drop
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(pid) = read_pid(&path) {
            if process_alive(pid) {
                // The port probe already passed, so the holder isn't serving
                warn!(pid, path = %path.display(), "PID file names a live process; overwriting");
            } else {
                info!(pid, path = %path.display(), "Removing stale PID file");
            }
        }

        fs::write(&path, format!("{}\n", std::process::id()))?;
        debug!(path = %path.display(), "PID file written");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "PID file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove PID file: {}", e),
        }
    }
}
